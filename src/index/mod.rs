//! The id index (component A): the process-wide map from an id to its
//! id record, plus the wildcard-chain bookkeeping that makes `(R, *)` and
//! `(*, T)` lookups O(1) to walk.

pub mod id_record;
pub mod invalidate;
pub mod reachable;
pub mod trav;

use alloc::vec::Vec;
use hashbrown::HashMap;
use slab::Slab;

use crate::error::{fatal, ConstraintViolation, RelTravError};
use crate::id::{Entity, Id, IdKind};
use crate::table::{RecordStore, TableHandle, TableRecord};

pub use id_record::{ComponentInfo, IdFlags, IdRecord, IdRecordHandle};

/// The process-wide id index (§4.1).
#[derive(Default)]
pub struct IdIndex {
    records: Slab<IdRecord>,
    /// `Id` is already a well-distributed packed `u64` (like a `TypeId`), so
    /// this reuses the teacher's no-op hasher rather than re-hashing it.
    by_id: HashMap<Id, IdRecordHandle, crate::hash::NoOpHasherBuilder>,

    /// Entities pending reachable-id recomputation (§4.5), deduplicated via
    /// `IdRecord::reachable_pending`.
    pub(crate) pending_reachable: Vec<IdRecordHandle>,
    pub(crate) reachable_counter: u32,

    /// The down/up traversal caches (component C/D).
    pub trav: trav::TravCache,
    /// The reachable-ids cache (component B).
    pub reachable: reachable::ReachableStore,

    /// `oneof(Relation) -> K` constraints registered on relations.
    oneof: HashMap<Entity, Entity>,
    /// Relations flagged `final`: cannot be the target of `is-a`.
    finals: hashbrown::HashSet<Entity>,
    /// Entities that have ever appeared as a relation in some pair.
    observed_as_id: hashbrown::HashSet<Entity>,
    /// Entities that have ever appeared as a target of some pair.
    observed_as_target: hashbrown::HashSet<Entity>,
    /// Entities that have appeared as a target of an *acyclic* pair.
    observed_as_acyclic_target: hashbrown::HashSet<Entity>,
}

impl IdIndex {
    /// An empty id index.
    #[must_use]
    pub fn new() -> Self {
        IdIndex::default()
    }

    /// The record behind `handle`.
    #[must_use]
    pub fn record(&self, handle: IdRecordHandle) -> &IdRecord {
        &self.records[handle.0 as usize]
    }

    /// The record behind `handle`, mutably.
    #[must_use]
    pub fn record_mut(&mut self, handle: IdRecordHandle) -> &mut IdRecord {
        &mut self.records[handle.0 as usize]
    }

    /// O(1) lookup (§4.1 `get`).
    #[must_use]
    pub fn get(&self, id: Id) -> Option<IdRecordHandle> {
        self.by_id.get(&id).copied()
    }

    /// `true` if `e` has ever appeared as the target of some pair.
    #[must_use]
    pub fn is_observed_as_target(&self, e: Entity) -> bool {
        self.observed_as_target.contains(&e)
    }

    /// `true` if `e` has ever appeared as the target of an acyclic pair —
    /// the condition under which downward propagation (§4.7) considers it.
    #[must_use]
    pub fn is_observed_as_acyclic_target(&self, e: Entity) -> bool {
        self.observed_as_acyclic_target.contains(&e)
    }

    /// Registers `oneof(relation) = scope`, enforced on `ensure` (§4.1 step 6).
    pub fn set_oneof(&mut self, relation: Entity, scope: Entity) {
        self.oneof.insert(relation, scope);
    }

    /// Flags `entity` as `final`: it cannot be the target of `is-a`.
    pub fn set_final(&mut self, entity: Entity) {
        self.finals.insert(entity);
    }

    /// `true` if `entity` was flagged `final` and cannot be the target of `is-a`.
    #[must_use]
    pub fn is_final(&self, entity: Entity) -> bool {
        self.finals.contains(&entity)
    }

    /// Returns existing record or creates one (§4.1 `ensure`).
    ///
    /// `target_has_child_of` lets the caller answer the exclusive/oneof
    /// constraint check (§4.1 step 6) without this module depending on a
    /// concrete record store implementation.
    pub fn ensure(
        &mut self,
        id: Id,
        target_has_child_of: impl FnOnce(Entity, Entity) -> bool,
    ) -> Result<IdRecordHandle, RelTravError> {
        if let Some(h) = self.by_id.get(&id) {
            return Ok(*h);
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(bits = id.bits(), "ensure_id: creating new record");

        match id.kind() {
            IdKind::Component(_) => {
                let handle = self.insert_bare(id);
                Ok(handle)
            }
            IdKind::Pair(relation, target) => {
                // Exclusive/oneof constraint (§4.1 step 6), checked before any
                // state for the new record is committed.
                if let Some(&scope) = self.oneof.get(&relation) {
                    if !target.is_wildcard() && !target_has_child_of(target, scope) {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(?relation, ?target, ?scope, "oneof constraint violated");
                        return Err(ConstraintViolation::OneOf.into());
                    }
                }

                let first_head = if !relation.is_wildcard() {
                    Some(self.ensure_wildcard_first(relation))
                } else {
                    None
                };

                let inherited_flags = first_head
                    .map(|h| self.record(h).flags)
                    .unwrap_or_default();

                let handle = self.insert_pair(id, relation, target, inherited_flags);

                if !relation.is_wildcard() {
                    self.link_first(first_head.unwrap(), handle);
                }
                if !target.is_wildcard() {
                    let second_head = self.ensure_wildcard_second(target);
                    self.link_second(second_head, handle);
                    if self.record(handle).flags.contains(IdFlags::ACYCLIC) {
                        let acyclic_head = self.ensure_acyclic_head(target);
                        self.link_acyclic(acyclic_head, handle);
                    }
                }

                self.observed_as_id.insert(relation);
                if !target.is_wildcard() {
                    self.observed_as_target.insert(target);
                    if self.record(handle).flags.contains(IdFlags::ACYCLIC) {
                        self.observed_as_acyclic_target.insert(target);
                    }
                }

                Ok(handle)
            }
        }
    }

    fn insert_bare(&mut self, id: Id) -> IdRecordHandle {
        let idx = self.records.insert(IdRecord::new(id));
        let handle = IdRecordHandle(idx as u32);
        self.by_id.insert(id, handle);
        handle
    }

    fn insert_pair(
        &mut self,
        id: Id,
        relation: Entity,
        target: Entity,
        inherited: IdFlags,
    ) -> IdRecordHandle {
        let idx = self.records.insert(IdRecord::new(id));
        let handle = IdRecordHandle(idx as u32);
        self.by_id.insert(id, handle);

        // `is-a` is implicitly acyclic; every other inherited flag comes
        // straight from the `(Relation, *)` record (§4.1 step 2).
        let mut flags = inherited;
        if relation == crate::id::IS_A {
            flags.insert(IdFlags::ACYCLIC);
        }
        self.record_mut(handle).flags = flags;

        // Step 3: unless already known to be a tag, inherit a component type
        // descriptor from the relation's own bare record, falling back to
        // the target's (`id_record.c`'s `flecs_get_type_info(world, rel)`,
        // else `obj`).
        if !flags.contains(IdFlags::TAG) {
            if let Some(info) = self.type_info_of(relation).or_else(|| self.type_info_of(target)) {
                self.record_mut(handle).type_info = Some(info);
            }
        }
        handle
    }

    /// The component type descriptor registered on `e`'s own bare id record,
    /// if any (§4.1 step 3).
    fn type_info_of(&self, e: Entity) -> Option<ComponentInfo> {
        self.by_id.get(&Id::component(e)).and_then(|h| self.record(*h).type_info)
    }

    fn ensure_wildcard_first(&mut self, relation: Entity) -> IdRecordHandle {
        let id = Id::first_wildcard(relation);
        if let Some(&h) = self.by_id.get(&id) {
            return h;
        }
        self.insert_bare_pair_head(id)
    }

    fn ensure_wildcard_second(&mut self, target: Entity) -> IdRecordHandle {
        let id = Id::second_wildcard(target);
        if let Some(&h) = self.by_id.get(&id) {
            return h;
        }
        self.insert_bare_pair_head(id)
    }

    fn ensure_acyclic_head(&mut self, target: Entity) -> IdRecordHandle {
        // The acyclic sub-chain shares its head with the `(*, target)` chain.
        self.ensure_wildcard_second(target)
    }

    fn insert_bare_pair_head(&mut self, id: Id) -> IdRecordHandle {
        let idx = self.records.insert(IdRecord::new(id));
        let handle = IdRecordHandle(idx as u32);
        self.by_id.insert(id, handle);
        handle
    }

    fn link_first(&mut self, head: IdRecordHandle, member: IdRecordHandle) {
        let old_first = self.record(head).first_head;
        self.record_mut(member).first.next = old_first;
        self.record_mut(member).first.prev = None;
        if let Some(old) = old_first {
            self.record_mut(old).first.prev = Some(member);
        }
        self.record_mut(head).first_head = Some(member);
    }

    fn link_second(&mut self, head: IdRecordHandle, member: IdRecordHandle) {
        let old = self.record(head).second_head;
        self.record_mut(member).second.next = old;
        self.record_mut(member).second.prev = None;
        if let Some(old) = old {
            self.record_mut(old).second.prev = Some(member);
        }
        self.record_mut(head).second_head = Some(member);
    }

    fn link_acyclic(&mut self, head: IdRecordHandle, member: IdRecordHandle) {
        let old = self.record(head).acyclic_head;
        self.record_mut(member).acyclic.next = old;
        self.record_mut(member).acyclic.prev = None;
        if let Some(old) = old {
            self.record_mut(old).acyclic.prev = Some(member);
        }
        self.record_mut(head).acyclic_head = Some(member);
    }

    fn unlink(&mut self, member: IdRecordHandle, chain: ChainKind) {
        let (prev, next) = match chain {
            ChainKind::First => (self.record(member).first.prev, self.record(member).first.next),
            ChainKind::Second => (
                self.record(member).second.prev,
                self.record(member).second.next,
            ),
            ChainKind::Acyclic => (
                self.record(member).acyclic.prev,
                self.record(member).acyclic.next,
            ),
        };
        match prev {
            Some(p) => self.set_chain_next(p, chain, next),
            None => {
                // `member` was the head of the chain; find the chain's root
                // record and repoint its head. Callers only unlink members
                // that are concrete pairs, whose relation/target we have.
                if let IdKind::Pair(relation, target) = self.record(member).id.kind() {
                    match chain {
                        ChainKind::First => {
                            if let Some(h) = self.by_id.get(&Id::first_wildcard(relation)) {
                                self.record_mut(*h).first_head = next;
                            }
                        }
                        ChainKind::Second => {
                            if let Some(h) = self.by_id.get(&Id::second_wildcard(target)) {
                                self.record_mut(*h).second_head = next;
                            }
                        }
                        ChainKind::Acyclic => {
                            if let Some(h) = self.by_id.get(&Id::second_wildcard(target)) {
                                self.record_mut(*h).acyclic_head = next;
                            }
                        }
                    }
                }
            }
        }
        if let Some(n) = next {
            self.set_chain_prev(n, chain, prev);
        }
    }

    fn set_chain_next(&mut self, h: IdRecordHandle, chain: ChainKind, next: Option<IdRecordHandle>) {
        match chain {
            ChainKind::First => self.record_mut(h).first.next = next,
            ChainKind::Second => self.record_mut(h).second.next = next,
            ChainKind::Acyclic => self.record_mut(h).acyclic.next = next,
        }
    }

    fn set_chain_prev(&mut self, h: IdRecordHandle, chain: ChainKind, prev: Option<IdRecordHandle>) {
        match chain {
            ChainKind::First => self.record_mut(h).first.prev = prev,
            ChainKind::Second => self.record_mut(h).second.prev = prev,
            ChainKind::Acyclic => self.record_mut(h).acyclic.prev = prev,
        }
    }

    /// Walks the `(R, *)` chain rooted at `relation`'s wildcard record,
    /// yielding every concrete `(R, T)` record (§4.1).
    pub fn iter_first_chain(&self, relation: Entity) -> Vec<IdRecordHandle> {
        let Some(&head) = self.by_id.get(&Id::first_wildcard(relation)) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cur = self.record(head).first_head;
        while let Some(h) = cur {
            out.push(h);
            cur = self.record(h).first.next;
        }
        out
    }

    /// Walks the `(*, T)` chain rooted at `target`'s wildcard record (§4.1).
    pub fn iter_second_chain(&self, target: Entity) -> Vec<IdRecordHandle> {
        let Some(&head) = self.by_id.get(&Id::second_wildcard(target)) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cur = self.record(head).second_head;
        while let Some(h) = cur {
            out.push(h);
            cur = self.record(h).second.next;
        }
        out
    }

    /// Walks only the acyclic sub-chain of `(*, T)` (§4.1, §4.5 primary input
    /// to invalidation and propagation).
    pub fn iter_acyclic_chain(&self, target: Entity) -> Vec<IdRecordHandle> {
        let Some(&head) = self.by_id.get(&Id::second_wildcard(target)) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cur = self.record(head).acyclic_head;
        while let Some(h) = cur {
            out.push(h);
            cur = self.record(h).acyclic.next;
        }
        out
    }

    /// Registers `table` for `id`, ensuring the record exists first.
    pub fn register_table(
        &mut self,
        id: Id,
        table: TableHandle,
        tr: TableRecord,
        row_count: usize,
        target_has_child_of: impl FnOnce(Entity, Entity) -> bool,
    ) -> Result<IdRecordHandle, RelTravError> {
        let handle = self.ensure(id, target_has_child_of)?;
        self.record_mut(handle).register_table(tr, row_count);
        Ok(handle)
    }

    /// Attempts to free `id`'s record (§4.1 `remove`). Returns `true` only
    /// if both lists became empty and no external table reference remains
    /// (modeled here as: both lists are empty after `release_empty` runs).
    pub fn remove(&mut self, id: Id) -> bool {
        let Some(&handle) = self.by_id.get(&id) else {
            return false;
        };
        if !self.record(handle).is_empty() {
            return false;
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(bits = id.bits(), "remove_id");
        self.destroy(handle);
        true
    }

    /// Force-deletes every table reference in `id`'s record, then removes it
    /// (§4.1 `clear`). Returns the set of tables that were cleared so the
    /// caller can actually despawn/relocate their rows.
    pub fn clear(&mut self, id: Id) -> Vec<TableHandle> {
        let Some(&handle) = self.by_id.get(&id) else {
            return Vec::new();
        };
        let tables: Vec<TableHandle> = self
            .record(handle)
            .all_tables()
            .map(|tr| tr.table)
            .collect();
        #[cfg(feature = "tracing")]
        tracing::trace!(bits = id.bits(), n_tables = tables.len(), "clear: force-clearing id record");
        for &t in &tables {
            self.record_mut(handle).unregister_table(t);
        }
        self.destroy(handle);
        tables
    }

    fn destroy(&mut self, handle: IdRecordHandle) {
        let id = self.record(handle).id;
        if let IdKind::Pair(relation, target) = id.kind() {
            if !relation.is_wildcard() {
                self.unlink(handle, ChainKind::First);
            }
            if !target.is_wildcard() {
                self.unlink(handle, ChainKind::Second);
                if self.record(handle).flags.contains(IdFlags::ACYCLIC) {
                    self.unlink(handle, ChainKind::Acyclic);
                }
            }
        }
        self.by_id.remove(&id);
        self.records.remove(handle.0 as usize);
    }

    /// Switches an id record between tag and component status (§4.1).
    pub fn set_type_info(&mut self, handle: IdRecordHandle, ti: Option<ComponentInfo>) {
        let r = self.record_mut(handle);
        match ti {
            Some(info) => {
                r.type_info = Some(info);
                r.flags.remove(IdFlags::TAG);
            }
            None => {
                r.type_info = None;
                r.flags.insert(IdFlags::TAG);
            }
        }
    }

    /// Drains the deferred-table-event pump. A no-op placeholder here since
    /// this crate has no deferred table-creation queue of its own (§9
    /// "Deferred work"); a host integrating its own deferred command queue
    /// calls through this before trusting `iter_non_empty`/`iter_empty`.
    pub fn process_pending_tables(&mut self) {}

    /// Iterates the non-empty tables of `id`, first draining the deferred
    /// pump so the result reflects coherent state (§4.1).
    pub fn iter_non_empty(&mut self, id: Id, out: &mut Vec<TableRecord>) {
        self.process_pending_tables();
        if let Some(&h) = self.by_id.get(&id) {
            out.extend(self.record(h).non_empty_tables().iter().copied());
        }
    }

    /// Iterates the empty tables of `id`, first draining the deferred pump.
    pub fn iter_empty(&mut self, id: Id, out: &mut Vec<TableRecord>) {
        self.process_pending_tables();
        if let Some(&h) = self.by_id.get(&id) {
            out.extend(self.record(h).empty_tables().iter().copied());
        }
    }

    pub(crate) fn internal_error(what: &'static str) -> RelTravError {
        fatal(what)
    }

    /// Creates `handle`'s name index if it doesn't already have one (§B,
    /// grounded on `flecs_ensure_id_name_index`).
    pub fn ensure_name_index(&mut self, handle: IdRecordHandle) -> &mut id_record::NameIndex {
        self.record_mut(handle).name_index.get_or_insert_with(HashMap::new)
    }

    /// `handle`'s name index, if one has been created (§B, grounded on
    /// `flecs_get_id_name_index`).
    #[must_use]
    pub fn get_name_index(&self, handle: IdRecordHandle) -> Option<&id_record::NameIndex> {
        self.record(handle).name_index.as_ref()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ChainKind {
    First,
    Second,
    Acyclic,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{CHILD_OF, IS_A};

    fn e(i: u32) -> Entity {
        Entity::new(i, 1)
    }

    #[test]
    fn ensure_creates_and_dedups() {
        let mut idx = IdIndex::new();
        let id = Id::component(e(42));
        let h1 = idx.ensure(id, |_, _| false).unwrap();
        let h2 = idx.ensure(id, |_, _| false).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn pair_inherits_acyclic_from_relation_wildcard() {
        let mut idx = IdIndex::new();
        let parent = e(1);
        let child_of = CHILD_OF;
        // Mark (ChildOf, *) acyclic by ensuring it then setting the flag.
        let rel_head = idx.ensure(Id::first_wildcard(child_of), |_, _| false).unwrap();
        idx.record_mut(rel_head).flags.insert(IdFlags::ACYCLIC);

        let pair = Id::pair(child_of, parent);
        let h = idx.ensure(pair, |_, _| false).unwrap();
        assert!(idx.record(h).flags.contains(IdFlags::ACYCLIC));
        assert!(idx.is_observed_as_acyclic_target(parent));
    }

    #[test]
    fn is_a_pairs_are_always_acyclic() {
        let mut idx = IdIndex::new();
        let base = e(7);
        let h = idx.ensure(Id::pair(IS_A, base), |_, _| false).unwrap();
        assert!(idx.record(h).flags.contains(IdFlags::ACYCLIC));
    }

    #[test]
    fn first_chain_walks_all_concrete_pairs() {
        let mut idx = IdIndex::new();
        let rel = e(5);
        for i in 0..3 {
            idx.ensure(Id::pair(rel, e(100 + i)), |_, _| false).unwrap();
        }
        let members = idx.iter_first_chain(rel);
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn second_chain_and_acyclic_subchain() {
        let mut idx = IdIndex::new();
        let target = e(9);
        let acyclic_rel = CHILD_OF;
        let rel_head = idx
            .ensure(Id::first_wildcard(acyclic_rel), |_, _| false)
            .unwrap();
        idx.record_mut(rel_head).flags.insert(IdFlags::ACYCLIC);

        idx.ensure(Id::pair(acyclic_rel, target), |_, _| false).unwrap();
        idx.ensure(Id::pair(e(50), target), |_, _| false).unwrap();

        assert_eq!(idx.iter_second_chain(target).len(), 2);
        assert_eq!(idx.iter_acyclic_chain(target).len(), 1);
    }

    #[test]
    fn remove_requires_empty_and_destroy_unlinks() {
        let mut idx = IdIndex::new();
        let rel = e(3);
        let target = e(4);
        let pair = Id::pair(rel, target);
        idx.ensure(pair, |_, _| false).unwrap();
        assert!(idx.remove(pair));
        assert!(idx.get(pair).is_none());
        assert!(idx.iter_first_chain(rel).is_empty());
    }

    #[test]
    fn oneof_constraint_rejects_bad_target() {
        let mut idx = IdIndex::new();
        let rel = e(11);
        let scope = e(12);
        idx.set_oneof(rel, scope);
        let err = idx.ensure(Id::pair(rel, e(13)), |_, _| false).unwrap_err();
        match err {
            RelTravError::ConstraintViolated(ConstraintViolation::OneOf) => {}
            _ => panic!("expected OneOf violation"),
        }
    }
}
