//! Reachable-ids cache (component B, §4.2): per-`(relation, table)` answer to
//! "which ids does this table inherit from its ancestors, and from which
//! entity?", keyed by the table's acyclic projection so that tables sharing
//! an ancestor shape share one cache entry.

use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::id::{Entity, Id, IdKind};
use crate::index::IdIndex;
use crate::table::{RecordStore, TableHandle};

/// One `(id, source)` pair of a reachable set — §9 notes the later flecs
/// variant collapses the earlier pointer-heavy graph into a sorted id vector
/// plus a parallel source vector; this is that same shape, zipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReachableEntry {
    /// The inherited id.
    pub id: Id,
    /// The ancestor entity `id` was inherited from.
    pub source: Entity,
}

/// The reachable-id set attached to an acyclic table (§3): a canonical table
/// description plus, for each id, the source entity it was inherited from.
#[derive(Clone, Debug, Default)]
pub struct ReachableSet {
    /// Sorted by [`ReachableEntry::id`] so lookups binary-search.
    pub entries: Vec<ReachableEntry>,
    /// The canonical table constructed from `entries`' sorted id set, used as
    /// a compact, dedup-friendly key (§4.2 step 3).
    pub canonical_table: Option<TableHandle>,
}

impl ReachableSet {
    /// The ancestor `id` was inherited from, if it's in this set.
    #[must_use]
    pub fn get(&self, id: Id) -> Option<Entity> {
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| self.entries[i].source)
    }

    /// `true` if `id` is inherited by this table.
    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        self.entries.binary_search_by_key(&id, |e| e.id).is_ok()
    }
}

struct CacheEntry {
    set: ReachableSet,
    /// The `reachable_counter` value this entry was last rebuilt at (§4.2).
    counter: u32,
}

/// World-scope store of reachable-id caches, one per `(relation, table)`.
#[derive(Default)]
pub struct ReachableStore {
    by_relation_table: HashMap<(Entity, TableHandle), CacheEntry>,
}

impl ReachableStore {
    /// Drops every cache entry keyed on `table`, for any relation. Used when
    /// `table` is structurally changed so stale `source`/`id` pairs can't
    /// leak into a later lookup before the next rebuild.
    pub fn invalidate_table(&mut self, table: TableHandle) {
        self.by_relation_table.retain(|k, _| k.1 != table);
    }
}

/// Builds (or returns the cached) reachable-id set for `(relation, table)`
/// (§4.2, component B). `table` must be acyclic under `relation`; the caller
/// is expected to have checked that before calling in.
pub fn reachable(
    idx: &mut IdIndex,
    store: &impl RecordStore,
    relation: Entity,
    table: TableHandle,
    world_counter: u32,
) -> ReachableSet {
    let key = (relation, table);
    if let Some(entry) = idx.reachable.by_relation_table.get(&key) {
        if entry.counter == world_counter {
            return entry.set.clone();
        }
    }

    let set = build(idx, store, relation, table);
    idx.reachable.by_relation_table.insert(
        key,
        CacheEntry {
            set: set.clone(),
            counter: world_counter,
        },
    );
    set
}

/// Step 1-3 of §4.2's build algorithm.
fn build(idx: &IdIndex, store: &impl RecordStore, relation: Entity, table: TableHandle) -> ReachableSet {
    let mut merged: HashMap<Id, Entity> = HashMap::new();

    let ty = store.type_of(table);
    let targets: Vec<Entity> = ty
        .iter()
        .filter_map(|&id| match id.kind() {
            IdKind::Pair(r, t) if r == relation && !t.is_wildcard() => Some(t),
            _ => None,
        })
        .collect();

    for t_i in targets {
        let Some((sub_table, _row)) = store.record_of(t_i) else {
            continue;
        };

        // Step 2: every id of T_i other than a pair rooted at `relation`
        // (bounds memory on deep trees — a descendant never needs to look
        // through its own ancestor-pair ids a second time).
        for &id in store.type_of(sub_table) {
            if matches!(id.kind(), IdKind::Pair(r, _) if r == relation) {
                continue;
            }
            merged.entry(id).or_insert(t_i);
        }

        // If T_i already has a reachable cache for `relation`, its entries
        // were themselves resolved to their original source entities, so
        // merging propagates inheritance transitively without recursing.
        if let Some(cached) = idx.reachable.by_relation_table.get(&(relation, sub_table)) {
            for entry in &cached.set.entries {
                merged.entry(entry.id).or_insert(entry.source);
            }
        }
    }

    let mut entries: Vec<ReachableEntry> = merged
        .into_iter()
        .map(|(id, source)| ReachableEntry { id, source })
        .collect();
    entries.sort_by_key(|e| e.id);

    ReachableSet {
        entries,
        canonical_table: None,
    }
}

/// Resolves (creating if needed) the canonical table for a reachable set's
/// sorted id list, via the external table-graph factory (§4.2 step 3). Kept
/// separate from `build` since it needs `&mut` access the merge pass doesn't.
pub fn canonicalize(store: &mut impl RecordStore, set: &mut ReachableSet) {
    if set.canonical_table.is_some() {
        return;
    }
    let ty: Vec<Id> = set.entries.iter().map(|e| e.id).collect();
    set.canonical_table = Some(store.table_for_type(&ty));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{CHILD_OF, Entity as E};
    use crate::table::TableStore;

    fn e(i: u32) -> E {
        E::new(i, 1)
    }

    #[test]
    fn reachable_inherits_parent_components() {
        let mut idx = IdIndex::new();
        let mut store = TableStore::new();

        let health = Id::component(e(10));
        let parent = e(1);
        let parent_ty = vec![health];
        let parent_table = store.table_for_type(&parent_ty);
        store.push_row(parent_table, parent);

        let child_ty = vec![Id::pair(CHILD_OF, parent)];
        let child_table = store.table_for_type(&child_ty);

        let set = reachable(&mut idx, &store, CHILD_OF, child_table, 1);
        assert_eq!(set.entries.len(), 1);
        assert_eq!(set.entries[0].id, health);
        assert_eq!(set.entries[0].source, parent);
    }

    #[test]
    fn reachable_is_cached_within_a_counter_bump() {
        let mut idx = IdIndex::new();
        let store = TableStore::new();
        let table = TableHandle(7);
        let rel = e(2);

        idx.reachable.by_relation_table.insert(
            (rel, table),
            CacheEntry {
                set: ReachableSet {
                    entries: vec![ReachableEntry {
                        id: Id::component(e(99)),
                        source: e(5),
                    }],
                    canonical_table: None,
                },
                counter: 3,
            },
        );
        // This direct insert exercises the cache-hit path without a rebuild.
        let set = reachable(&mut idx, &store, rel, table, 3);
        assert_eq!(set.entries[0].source, e(5));
    }
}
