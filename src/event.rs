//! Event emission and propagation (component G, §4.7): notifies observers
//! for add/remove/set/unset, synthesizes override/unset/re-exposure events
//! from the reachable-ids cache (component B), and propagates down acyclic
//! edges.
//!
//! Component values themselves stay opaque to this crate (§1): where the
//! spec says "copy the component value from the base", this only resolves
//! *which* entity the value should be copied from and reports it via
//! `Notification::source` — the host's observer callback does the actual
//! byte copy against its own component storage.

use alloc::vec::Vec;

use crate::bitflags_like;
use crate::error::{ConstraintViolation, RelTravError};
use crate::id::{Entity, Id, IdKind};
use crate::observer::{Event, Notification, ObserverContext};
use crate::table::{RecordStore, TableHandle};
use crate::world::World;

bitflags_like! {
    /// `desc.flags` (§4.7, §6 `world_emit`).
    pub struct EmitFlags: u8 {
        /// The event carries no component data; skip the storage-column lookup.
        const TABLE_ONLY = 1 << 0;
        /// Suppress downward propagation — used internally for synthesized
        /// events that already target their final destination.
        const NO_PROPAGATE = 1 << 1;
    }
}

/// `world_emit` descriptor (§6).
pub struct EmitDesc {
    /// The event kind to emit.
    pub event: Event,
    /// The ids to emit the event for, each processed independently.
    pub ids: Vec<Id>,
    /// The table the affected rows live in.
    pub table: TableHandle,
    /// Offset of the first affected row within `table`.
    pub offset: usize,
    /// Number of affected rows starting at `offset`.
    pub count: usize,
    /// On a `set`/`add` triggered by a table move, the row's previous table —
    /// used to detect whether it already had an is-a path (step 8).
    pub other_table: Option<TableHandle>,
    /// Behavior flags (§4.7).
    pub flags: EmitFlags,
    /// Opaque context forwarded to every resulting [`crate::observer::Notification`].
    pub ctx: ObserverContext,
}

impl World {
    /// `world_emit` (§6): runs [`World::emit_event`] for every id in
    /// `desc.ids`. Stops and reports the first constraint violation (§7);
    /// ids processed before it still fired their notifications, since by
    /// the time `emit` runs the host has already committed the table
    /// transition it describes — this only refuses the *further* propagation
    /// (the instantiate hook, the reachable-ids cascade) that violation
    /// would otherwise trigger.
    pub fn emit(&mut self, desc: EmitDesc) -> Result<(), RelTravError> {
        #[cfg(feature = "tracing")]
        tracing::trace!(event = ?desc.event, n_ids = desc.ids.len(), "emit");

        let ids = desc.ids.clone();
        for id in ids {
            self.emit_event(&desc, id, desc.event, None)?;
        }
        Ok(())
    }

    /// Core per-id algorithm (§4.7 steps 1-10). `forced_source`, when set,
    /// overrides step-3 override detection — used by synthesized re-exposure
    /// and reachable-id cascades that already know their source entity.
    fn emit_event(
        &mut self,
        desc: &EmitDesc,
        id: Id,
        event: Event,
        forced_source: Option<Entity>,
    ) -> Result<(), RelTravError> {
        let table = desc.table;
        let is_a_table = self.store.type_of(table).iter().any(|&t| {
            matches!(t.kind(), IdKind::Pair(r, _) if r == crate::id::IS_A)
        });

        // Step 3: override detection on add.
        let mut source = forced_source;
        if source.is_none() && event == Event::Add && is_a_table && !desc.flags.contains(EmitFlags::TABLE_ONLY) {
            let reach = self.reachable(crate::id::IS_A, table);
            source = reach.get(id);
        }

        self.notify_chain(id, event, table, desc.offset, desc.count, source, &desc.ctx);

        // Step 4 / 9: on remove, either synthesize `unset` (base doesn't
        // expose `id` either) or re-expose the base's value via `set`. Not
        // gated on `is_a_table`: with no is-a edge at all `reachable` comes
        // back empty and falls straight to the `unset` arm, which is exactly
        // the "no is-a" case's correct outcome.
        if event == Event::Remove && !desc.flags.contains(EmitFlags::TABLE_ONLY) {
            let reach = self.reachable(crate::id::IS_A, table);
            match reach.get(id) {
                Some(base_source) => {
                    self.notify_chain(id, Event::Set, table, desc.offset, desc.count, Some(base_source), &desc.ctx);
                }
                None => {
                    self.notify_chain(id, Event::Unset, table, desc.offset, desc.count, None, &desc.ctx);
                }
            }
        }

        // Step 8: an override that just became visible also needs a `set`,
        // unless the base itself already had an is-a path in `other_table`
        // (in which case the instance inherited the set already).
        if event == Event::Add && source.is_some() {
            let base_already_had_path = desc
                .other_table
                .map(|ot| {
                    self.store.type_of(ot).iter().any(|&t| {
                        matches!(t.kind(), IdKind::Pair(r, _) if r == crate::id::IS_A)
                    })
                })
                .unwrap_or(false);
            if !base_already_had_path {
                self.notify_chain(id, Event::Set, table, desc.offset, desc.count, source, &desc.ctx);
            }
        }

        // Step 7: downward propagation.
        if !desc.flags.contains(EmitFlags::NO_PROPAGATE) {
            let rows: Vec<Entity> = self.store.rows(table)[desc.offset..(desc.offset + desc.count).min(self.store.rows(table).len())].to_vec();
            for row_entity in rows {
                if self.idx.is_observed_as_acyclic_target(row_entity) {
                    self.propagate(row_entity, id, event, None, &desc.ctx);
                }
            }
        }

        // Step 10: instantiation hook.
        if event == Event::Add {
            if let IdKind::Pair(relation, base) = id.kind() {
                if relation == crate::id::IS_A {
                    if self.idx.is_final(base) {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(?base, "cannot instantiate from a final entity");
                        return Err(ConstraintViolation::Final.into());
                    } else if let Some(hook) = self.on_instantiate.as_mut() {
                        let rows: Vec<Entity> = self.store.rows(table)[desc.offset..(desc.offset + desc.count).min(self.store.rows(table).len())].to_vec();
                        for instance in rows {
                            hook(instance, base);
                        }
                    }
                }
            }
        }

        // `emit_reachable_ids` (§4.7): a concrete acyclic pair add/remove
        // cascades the newly (dis)connected ancestor's reachable ids.
        if matches!(event, Event::Add | Event::Remove) {
            if let IdKind::Pair(relation, target) = id.kind() {
                if !target.is_wildcard()
                    && self
                        .idx
                        .get(id)
                        .map(|h| self.idx.record(h).flags.contains(crate::index::IdFlags::ACYCLIC))
                        .unwrap_or(false)
                {
                    self.emit_reachable_ids(desc, relation, table, event);
                }
            }
        }

        Ok(())
    }

    /// Notifies the id-wildcard chain derived from `id` (§4.7 step 5), for
    /// both `event` and the universal `Wildcard` key (§4.7 preamble).
    fn notify_chain(
        &mut self,
        id: Id,
        event: Event,
        table: TableHandle,
        offset: usize,
        count: usize,
        source: Option<Entity>,
        ctx: &ObserverContext,
    ) {
        let keys: Vec<(Id, Option<Entity>, Option<Entity>)> = match id.kind() {
            IdKind::Pair(r, t) => alloc::vec![
                (id, Some(r), Some(t)),
                (Id::first_wildcard(r), Some(r), None),
                (Id::second_wildcard(t), None, Some(t)),
                (Id::component(crate::id::ANY), None, None),
            ],
            IdKind::Component(_) => alloc::vec![(id, None, None), (Id::component(crate::id::ANY), None, None)],
        };

        for (key, relation, subject) in keys {
            let n = Notification { event, id, table, offset, count, source, ctx };
            self.observers.notify(event, key, relation, subject, &n);
            if event != Event::Wildcard {
                let n2 = Notification { event, id, table, offset, count, source, ctx };
                self.observers.notify(Event::Wildcard, key, relation, subject, &n2);
            }
        }
    }

    /// `propagate(root, id, relation)` (§4.7): notifies `root`'s tables that
    /// carry `id` through inheritance, then recurses through rows that are
    /// themselves acyclic targets. `relation = None` means "all acyclic
    /// relations of `root`"; crossing `is-a` resets back to `None` so
    /// propagation continues along every relation, not just `is-a`.
    fn propagate(&mut self, root: Entity, id: Id, event: Event, relation: Option<Entity>, ctx: &ObserverContext) {
        let heads: Vec<Entity> = match relation {
            Some(r) => alloc::vec![r],
            None => self
                .idx
                .iter_acyclic_chain(root)
                .into_iter()
                .filter_map(|h| match self.idx.record(h).id.kind() {
                    IdKind::Pair(r, _) => Some(r),
                    IdKind::Component(_) => None,
                })
                .collect(),
        };

        for r in heads {
            let Some(h) = self.idx.get(Id::pair(r, root)) else { continue };
            let tables: Vec<TableHandle> = self.idx.record(h).all_tables().map(|tr| tr.table).collect();
            for table in tables {
                if self.store.type_of(table).contains(&id) {
                    // Table owns `id` locally: it's an override, propagation
                    // stops here (the owning row already has its own value).
                    continue;
                }
                let n = Notification { event, id, table, offset: 0, count: self.store.table(table).row_count(), source: Some(root), ctx };
                self.observers.notify(event, id, Some(r), None, &n);

                let next_relation = if r == crate::id::IS_A { None } else { Some(r) };
                let rows: Vec<Entity> = self.store.rows(table).to_vec();
                for row_entity in rows {
                    if self.idx.is_observed_as_acyclic_target(row_entity) {
                        self.propagate(row_entity, id, event, next_relation, ctx);
                    }
                }
            }
        }
    }

    /// `emit_reachable_ids` (§4.7): cascades the reachable set of `(relation,
    /// table)` as synthesized `set`/`unset` events, restricted to ids `table`
    /// locally owns. A purely-inherited id (scenario: `Velocity` in §8's
    /// override-copy scenario) never had its own storage row to begin with,
    /// so connecting or breaking the ancestor link doesn't change anything an
    /// observer needs telling about; only ids the row already owns locally —
    /// the overrides — gain or lose a resolvable ancestor value.
    fn emit_reachable_ids(&mut self, desc: &EmitDesc, relation: Entity, table: TableHandle, event: Event) {
        let reach = self.reachable(relation, table);
        let owned = self.store.type_of(table);
        for entry in reach.entries.clone() {
            let locally_owned = owned.contains(&entry.id);
            if event == Event::Remove {
                if !locally_owned {
                    self.notify_chain(entry.id, Event::Unset, table, desc.offset, desc.count, None, &desc.ctx);
                }
            } else if locally_owned {
                self.notify_chain(entry.id, Event::Set, table, desc.offset, desc.count, Some(entry.source), &desc.ctx);
            }
        }
    }
}
