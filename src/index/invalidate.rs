//! Generation and invalidation (component E, §4.5): the hooks that keep the
//! down-traversal cache and the reachable-ids cache coherent with mutation.

use alloc::vec::Vec;

use crate::id::{Entity, Id, IdKind};
use crate::index::{IdIndex, IdRecordHandle};
use crate::table::{RecordStore, TableHandle};

/// `on_entity_modified(e)` (§4.5): walks `e`'s acyclic sub-chain and bumps
/// the down-cache generation of every concrete `(R, e)` record, queuing each
/// one's `(R, *)` parent for reachable-id recomputation.
pub fn on_entity_modified(idx: &mut IdIndex, e: Entity) {
    let members = idx.iter_acyclic_chain(e);
    for handle in members {
        idx.record_mut(handle).generation = idx.record(handle).generation.wrapping_add(1);
        queue_reachable_parent(idx, handle);
    }
}

fn queue_reachable_parent(idx: &mut IdIndex, handle: IdRecordHandle) {
    let relation = match idx.record(handle).id.kind() {
        IdKind::Pair(r, _) => r,
        IdKind::Component(_) => return,
    };
    let Some(parent) = idx.get(Id::first_wildcard(relation)) else {
        return;
    };
    if idx.record(parent).reachable_pending {
        return;
    }
    idx.record_mut(parent).reachable_pending = true;
    idx.pending_reachable.push(parent);
}

/// `revalidate_all` (§4.5): drains the pending-reachable list, rebuilding
/// each pending relation's reachable-id cache entries and recursing into
/// their acyclic-target rows.
///
/// The "skip a pending record if a dirty ancestor is also pending" optimization
/// from §4.5 step 2 is already subsumed here: `queue_reachable_parent` only
/// ever queues one entry per relation (`reachable_pending` dedups it), so the
/// pending list can never contain a redundant pair to prune.
pub fn revalidate_all(idx: &mut IdIndex, store: &mut impl RecordStore) {
    idx.reachable_counter = idx.reachable_counter.wrapping_add(1);
    let counter = idx.reachable_counter;

    let pending = core::mem::take(&mut idx.pending_reachable);
    #[cfg(feature = "tracing")]
    let _span = tracing::debug_span!("revalidate_all", n_pending = pending.len(), counter).entered();

    for handle in pending {
        idx.record_mut(handle).reachable_pending = false;
        let IdKind::Pair(relation, _) = idx.record(handle).id.kind() else {
            continue;
        };
        let tables: Vec<TableHandle> = idx.record(handle).all_tables().map(|tr| tr.table).collect();
        for table in tables {
            revalidate_table(idx, store, relation, table, counter);
        }
    }
}

/// Rebuilds the reachable cache for `(relation, table)`, then recurses into
/// `table`'s rows whose entity is itself an acyclic target — the same table
/// may appear again further down the chain with a fresher ancestor topology.
fn revalidate_table(
    idx: &mut IdIndex,
    store: &mut impl RecordStore,
    relation: Entity,
    table: TableHandle,
    counter: u32,
) {
    crate::index::reachable::reachable(idx, store, relation, table, counter);

    let rows: Vec<Entity> = store.rows(table).to_vec();
    for row_entity in rows {
        if idx.is_observed_as_acyclic_target(row_entity) {
            if let Some(h) = idx.get(Id::pair(relation, row_entity)) {
                let children: Vec<TableHandle> = idx.record(h).all_tables().map(|tr| tr.table).collect();
                for child in children {
                    revalidate_table(idx, store, relation, child, counter);
                }
            }
        }
    }
}

/// `invalidate_table_range` (§4.5): bumps the down-cache generation of every
/// `(R, entity)` record for each acyclic-target row in `[offset, offset+count)`.
/// Returns whether any observed row fell in the range, so the row-mutation
/// path can decide whether propagation events are worth emitting.
pub fn invalidate_table_range(
    idx: &mut IdIndex,
    store: &impl RecordStore,
    table: TableHandle,
    offset: usize,
    count: usize,
) -> bool {
    let rows = store.rows(table);
    let end = (offset + count).min(rows.len());
    let range: Vec<Entity> = rows.get(offset..end).map(<[Entity]>::to_vec).unwrap_or_default();

    let mut any_observed = false;
    for entity in range {
        if idx.is_observed_as_acyclic_target(entity) {
            any_observed = true;
            on_entity_modified(idx, entity);
        }
    }
    any_observed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::CHILD_OF;
    use crate::table::TableStore;

    fn e(i: u32) -> Entity {
        Entity::new(i, 1)
    }

    #[test]
    fn on_entity_modified_bumps_acyclic_members() {
        let mut idx = IdIndex::new();
        let parent = e(1);
        let child = e(2);
        idx.ensure(Id::first_wildcard(CHILD_OF), |_, _| false).unwrap();
        {
            let h = idx.get(Id::first_wildcard(CHILD_OF)).unwrap();
            idx.record_mut(h).flags.insert(crate::index::IdFlags::ACYCLIC);
        }
        let h = idx.ensure(Id::pair(CHILD_OF, parent), |_, _| false).unwrap();
        let before = idx.record(h).generation;

        on_entity_modified(&mut idx, parent);
        assert_eq!(idx.record(h).generation, before.wrapping_add(1));
        assert!(!idx.pending_reachable.is_empty());
        let _ = child;
    }

    #[test]
    fn invalidate_table_range_reports_observed_rows() {
        let mut idx = IdIndex::new();
        let mut store = TableStore::new();
        let parent = e(3);
        idx.ensure(Id::first_wildcard(CHILD_OF), |_, _| false).unwrap();
        {
            let h = idx.get(Id::first_wildcard(CHILD_OF)).unwrap();
            idx.record_mut(h).flags.insert(crate::index::IdFlags::ACYCLIC);
        }
        idx.ensure(Id::pair(CHILD_OF, parent), |_, _| false).unwrap();

        let ty = vec![Id::component(e(50))];
        let table = store.table_for_type(&ty);
        store.push_row(table, parent);

        assert!(invalidate_table_range(&mut idx, &store, table, 0, 1));
        assert!(!invalidate_table_range(&mut idx, &store, table, 1, 1));
    }

    #[test]
    fn revalidate_all_rebuilds_pending_reachable_caches() {
        let mut idx = IdIndex::new();
        let mut store = TableStore::new();

        let health = Id::component(e(10));
        let parent = e(1);
        let parent_ty = vec![health];
        let parent_table = store.table_for_type(&parent_ty);
        store.push_row(parent_table, parent);

        let child_ty = vec![Id::pair(CHILD_OF, parent)];
        let child_table = store.table_for_type(&child_ty);

        idx.ensure(Id::first_wildcard(CHILD_OF), |_, _| false).unwrap();
        {
            let h = idx.get(Id::first_wildcard(CHILD_OF)).unwrap();
            idx.record_mut(h).flags.insert(crate::index::IdFlags::ACYCLIC);
        }
        let h = idx.ensure(Id::pair(CHILD_OF, parent), |_, _| false).unwrap();
        idx.record_mut(h).register_table(
            crate::table::TableRecord {
                table: child_table,
                column: 0,
                count: 1,
            },
            1,
        );

        on_entity_modified(&mut idx, parent);
        revalidate_all(&mut idx, &mut store);

        let set = crate::index::reachable::reachable(&mut idx, &mut store, CHILD_OF, child_table, idx.reachable_counter);
        assert!(set.contains(health));
    }
}
