//! The top-level `World`: wires the id index, observer index and a
//! self-contained [`TableStore`] together behind §6's external interface.
//!
//! A host ECS with its own archetype storage is expected to drive the
//! lower-level `IdIndex`/`ObserverIndex`/`index::trav`/`index::reachable`
//! APIs directly against its own [`RecordStore`] impl; `World` exists so this
//! crate is runnable and testable standalone (§1, §C).

use alloc::vec::Vec;

use crate::config::WorldConfig;
use crate::error::{ConstraintViolation, RelTravError};
use crate::id::{Entity, Id, IdKind};
use crate::index::id_record::IdRecordHandle;
use crate::index::reachable::ReachableSet;
use crate::index::trav::TravElem;
use crate::index::IdIndex;
use crate::observer::{Event, ObserverDesc, ObserverId, TriggerTransition};
use crate::table::{RecordStore, TableHandle, TableStore};

/// Re-exported so callers can name the observer index's type without an
/// extra `use` against [`crate::observer`].
pub use crate::observer::ObserverIndex;

/// The process-wide world (§6).
pub struct World {
    pub(crate) idx: IdIndex,
    pub(crate) observers: ObserverIndex,
    pub(crate) store: TableStore,
    /// Called on the `(is-a, base)` add instantiation hook (§4.7 step 10).
    /// `None` means instantiation is a no-op, which is sufficient unless the
    /// host wants base-owned children copied into the new instance.
    pub(crate) on_instantiate: Option<alloc::boxed::Box<dyn FnMut(Entity, Entity)>>,
    config: WorldConfig,
}

impl Default for World {
    fn default() -> Self {
        World::with_config(WorldConfig::default())
    }
}

impl World {
    /// A world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        World::default()
    }

    /// A world using the given configuration.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        World {
            idx: IdIndex::new(),
            observers: ObserverIndex::new(),
            store: TableStore::new(),
            on_instantiate: None,
            config,
        }
    }

    /// The configuration this world was built with.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The backing table store.
    #[must_use]
    pub fn store(&self) -> &TableStore {
        &self.store
    }

    /// The backing table store, mutably.
    pub fn store_mut(&mut self) -> &mut TableStore {
        &mut self.store
    }

    /// Looks up or creates the canonical table for `ty`, syncing its cached
    /// flags/acyclic projection against the current id index (§3).
    pub fn table_for_type(&mut self, ty: &[Id]) -> TableHandle {
        let table = self.store.table_for_type(ty);
        self.sync_table(table);
        table
    }

    /// Inserts `entity` as a new row of `table`, then resyncs its cached
    /// `observed_count` (§3).
    pub fn push_row(&mut self, table: TableHandle, entity: Entity) -> usize {
        let row = self.store.push_row(table, entity);
        self.sync_table(table);
        row
    }

    /// Recomputes `table`'s `flags`/`acyclic_projection`/`observed_count`
    /// against the current id index (§3). Hosts driving their own
    /// `RecordStore` call this after changing a table's type or row
    /// membership; [`World::table_for_type`]/[`World::push_row`] already do
    /// it for the built-in store.
    pub fn sync_table(&mut self, table: TableHandle) {
        let World { idx, store, .. } = self;
        let t = store.table_mut(table);
        t.sync_flags(|r| {
            idx.get(Id::first_wildcard(r))
                .map(|h| idx.record(h).flags.contains(crate::index::IdFlags::ACYCLIC))
                .unwrap_or(false)
        });
        t.sync_observed_count(|e| idx.is_observed_as_acyclic_target(e));
    }

    /// Registers the instantiation hook invoked by `add (is-a, base)` (§4.7
    /// step 10), copying base's owned children into the new instance.
    pub fn set_instantiate_hook(&mut self, hook: impl FnMut(Entity, Entity) + 'static) {
        self.on_instantiate = Some(alloc::boxed::Box::new(hook));
    }

    /// `world_ensure_id(id) -> record` (§6).
    pub fn ensure_id(&mut self, id: Id) -> Result<IdRecordHandle, RelTravError> {
        let store = &self.store;
        self.idx.ensure(id, |target, scope| {
            store
                .record_of(target)
                .map(|(t, _)| store.type_of(t).contains(&Id::pair(crate::id::CHILD_OF, scope)))
                .unwrap_or(false)
        })
    }

    /// Validates an exclusive-relation add before the host commits the table
    /// transition (§8): if `relation`'s `(R, *)` record is flagged
    /// [`crate::index::IdFlags::EXCLUSIVE`] and `entity` already carries a
    /// different concrete instance of it, fails with constraint-violated
    /// rather than letting two instances coexist. A no-op (and no mutation
    /// either way) when the check passes.
    pub fn check_exclusive_add(&self, relation: Entity, entity: Entity, target: Entity) -> Result<(), RelTravError> {
        let is_exclusive = self
            .idx
            .get(Id::first_wildcard(relation))
            .map(|h| self.idx.record(h).flags.contains(crate::index::IdFlags::EXCLUSIVE))
            .unwrap_or(false);
        if !is_exclusive {
            return Ok(());
        }
        let Some((table, _)) = self.store.record_of(entity) else {
            return Ok(());
        };
        let conflicts = self
            .store
            .type_of(table)
            .iter()
            .any(|&id| matches!(id.kind(), IdKind::Pair(r, t) if r == relation && t != target));
        if conflicts {
            #[cfg(feature = "tracing")]
            tracing::warn!(?relation, ?entity, ?target, "exclusive relation already has a different instance");
            return Err(ConstraintViolation::Exclusive.into());
        }
        Ok(())
    }

    /// Validates that linking `entity --relation--> target` wouldn't close a
    /// cycle along an acyclic relation (§3, §8): walks `target`'s own
    /// `relation` chain looking for `entity`. Must be called before the host
    /// commits the table transition that would add the edge.
    pub fn check_acyclic_add(&self, relation: Entity, entity: Entity, target: Entity) -> Result<(), RelTravError> {
        let mut cur = target;
        let mut depth = 0usize;
        loop {
            if cur == entity {
                #[cfg(feature = "tracing")]
                tracing::warn!(?relation, ?entity, ?target, "acyclic relation would form a cycle");
                return Err(ConstraintViolation::Cycle.into());
            }
            depth += 1;
            if depth > self.store.table_count() + 1 {
                // A well-formed acyclic chain can't walk more hops than there
                // are tables; this means a cycle already slipped past an
                // earlier check and `ensure` is loose somewhere upstream.
                return Err(crate::error::fatal("acyclic chain exceeded table count during cycle check"));
            }
            let Some((table, _)) = self.store.record_of(cur) else {
                return Ok(());
            };
            let next = self
                .store
                .type_of(table)
                .iter()
                .find_map(|&id| match id.kind() {
                    IdKind::Pair(r, t) if r == relation => Some(t),
                    _ => None,
                });
            match next {
                Some(n) => cur = n,
                None => return Ok(()),
            }
        }
    }

    /// `world_get_id(id) -> record?` (§6).
    #[must_use]
    pub fn get_id(&self, id: Id) -> Option<IdRecordHandle> {
        self.idx.get(id)
    }

    /// The id index.
    #[must_use]
    pub fn idx(&self) -> &IdIndex {
        &self.idx
    }

    /// The id index, mutably.
    pub fn idx_mut(&mut self) -> &mut IdIndex {
        &mut self.idx
    }

    /// `relation_traverse_down(trav, entity, with)` (§6).
    pub fn traverse_down(&mut self, trav: Entity, entity: Entity, with: Id) -> Vec<TravElem> {
        crate::index::trav::trav_entity_down(&mut self.idx, &self.store, trav, entity, with)
    }

    /// `relation_traverse_up(trav, table, with)` (§6).
    pub fn traverse_up(&mut self, trav: Entity, table: TableHandle, with: Id) -> Option<(Entity, Id, i32)> {
        crate::index::trav::trav_up(&mut self.idx, &self.store, trav, table, with)
    }

    /// `relation_reachable(relation, table)` (§6).
    pub fn reachable(&mut self, relation: Entity, table: TableHandle) -> ReachableSet {
        let counter = self.idx.reachable_counter;
        crate::index::reachable::reachable(&mut self.idx, &mut self.store, relation, table, counter)
    }

    /// `on_entity_modified(entity)` (§6).
    pub fn on_entity_modified(&mut self, entity: Entity) {
        crate::index::invalidate::on_entity_modified(&mut self.idx, entity);
    }

    /// Drains the pending-reachable list built up by [`World::on_entity_modified`].
    pub fn revalidate_all(&mut self) {
        crate::index::invalidate::revalidate_all(&mut self.idx, &mut self.store);
    }

    /// Down/up traversal cache hit/miss counters, for diagnostics (§B).
    #[must_use]
    pub fn trav_cache_stats(&self) -> crate::index::trav::TravCacheStats {
        self.idx.trav.stats
    }

    /// `observer_register` (§6). Handles `yield_existing` replay (§B) when set.
    pub fn observer_register(&mut self, desc: ObserverDesc) -> ObserverId {
        let yield_existing = desc.yield_existing;
        let term_id = desc.term.id;
        let events = desc.events.clone();
        let callback = alloc::rc::Rc::clone(&desc.callback);
        let (observer_id, transitions) = self.observers.register(desc);
        self.broadcast_transitions(&transitions);

        if yield_existing {
            self.replay_existing(term_id, &events, callback);
        }
        observer_id
    }

    /// `observer_unregister` (§6).
    pub fn observer_unregister(&mut self, observer_id: ObserverId) {
        let transitions = self.observers.unregister(observer_id);
        self.broadcast_transitions(&transitions);
    }

    fn broadcast_transitions(&self, transitions: &[((Event, Id), TriggerTransition)]) {
        #[cfg(feature = "tracing")]
        for &((event, id), transition) in transitions {
            tracing::trace!(?event, ?id, ?transition, "observer trigger count transition");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = transitions;
    }

    /// Replays historical `add` state for every table currently holding
    /// `term_id` against only the newly registered observer's callback
    /// directly (§B `yield_existing`), since routing through the observer
    /// index's `notify` would also reach every other observer already
    /// watching this id.
    fn replay_existing(&mut self, term_id: Id, events: &[Event], callback: crate::observer::Callback) {
        if !events.contains(&Event::Add) && !events.contains(&Event::Wildcard) {
            return;
        }
        let mut tables = Vec::new();
        self.idx.iter_non_empty(term_id, &mut tables);
        let ctx = crate::observer::ObserverContext::default();
        for tr in tables {
            let count = self.store.table(tr.table).row_count();
            let n = crate::observer::Notification {
                event: Event::Add,
                id: term_id,
                table: tr.table,
                offset: 0,
                count,
                source: None,
                ctx: &ctx,
            };
            (&mut *callback.borrow_mut())(&n);
        }
    }
}
