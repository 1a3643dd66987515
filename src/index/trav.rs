//! Down-traversal cache (component C) and up-traversal cache (component D).
//!
//! Grounded on `trav_cache.c`/`trav_cache.h`: rather than embedding the down
//! and up caches inside each id record (as §3's prose suggests), the
//! original keeps them in a free-standing cache keyed by `(trav, entity)` /
//! `(trav, table)`, each holding a further map keyed by the `with` id. §9's
//! Open Questions call this the conservative reading when variants disagree
//! on the exact key, so that's what's implemented here.

use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::id::{Entity, Id, IdKind};
use crate::index::IdIndex;
use crate::table::{RecordStore, TableHandle};

/// One element of a down-traversal result (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TravElem {
    /// The table reached at this point of the traversal.
    pub table: TableHandle,
    /// `true` if `table` owns the with-id directly and descent stopped there.
    pub leaf: bool,
    /// Column of the traversed pair, set only when a preceding pair along
    /// the same relation already yields the component (tie-breaking among
    /// multiple instances of `R` in one table).
    pub trav_column: Option<i32>,
}

struct DownCache {
    elems: Vec<TravElem>,
    generation: u32,
}

struct UpCache {
    /// `0`/`None` source means "no ancestor reachable".
    source: Option<Entity>,
    id: Id,
    column: i32,
    generation: u32,
}

/// The down-traversal (component C) and up-traversal (component D) caches.
#[derive(Default)]
pub struct TravCache {
    entity_down: HashMap<(Entity, Entity, Id), DownCache>,
    up: HashMap<(Entity, TableHandle, Id), UpCache>,

    /// Cache hit/miss counters, exposed read-only for diagnostics (§B).
    pub stats: TravCacheStats,
}

/// Supplemented from `trav_cache.h`'s `ecs_trav_stats_t` (§B).
#[derive(Default, Clone, Copy, Debug)]
pub struct TravCacheStats {
    /// Down-traversal cache hits.
    pub down_hits: u64,
    /// Down-traversal cache misses (result was rebuilt).
    pub down_misses: u64,
    /// Up-traversal cache hits.
    pub up_hits: u64,
    /// Up-traversal cache misses (result was rebuilt).
    pub up_misses: u64,
}

impl TravCache {
    /// Drops the cached entry for `(trav, entity)`, if present — full clear,
    /// per §9's resolution of the partially-written `flecs_trav_down_cache_clear`.
    pub fn clear_entity_down(&mut self, trav: Entity, entity: Entity) {
        self.entity_down.retain(|k, _| !(k.0 == trav && k.1 == entity));
    }
}

/// Looks up the generation an id record `(relation, entity)` (or
/// `(relation, *)` for table-keyed entries) is currently at, for cache
/// validity comparison (§4.3 "`entry.current == record.generation`").
fn current_generation(idx: &IdIndex, relation: Entity, entity: Entity) -> u32 {
    idx.get(Id::pair(relation, entity))
        .map(|h| idx.record(h).generation)
        .unwrap_or(0)
}

/// Builds (or returns the cached) down-traversal result for `(relation,
/// entity, with)` (§4.3, component C).
pub fn trav_entity_down(
    idx: &mut IdIndex,
    store: &impl RecordStore,
    relation: Entity,
    entity: Entity,
    with: Id,
) -> Vec<TravElem> {
    let gen = current_generation(idx, relation, entity);
    let key = (relation, entity, with);
    if let Some(cache) = idx.trav.entity_down.get(&key) {
        if cache.generation == gen {
            idx.trav.stats.down_hits += 1;
            return cache.elems.clone();
        }
    }
    idx.trav.stats.down_misses += 1;
    #[cfg(feature = "tracing")]
    let before_gen = idx.trav.entity_down.get(&key).map(|c| c.generation);

    let mut elems = Vec::new();
    let mut visited = hashbrown::HashSet::new();
    build_down_bfs(idx, store, relation, entity, with, &mut elems, &mut visited);

    idx.trav.entity_down.insert(
        key,
        DownCache {
            elems: elems.clone(),
            generation: gen,
        },
    );
    #[cfg(feature = "tracing")]
    tracing::debug!(?relation, ?entity, before_gen, after_gen = gen, n = elems.len(), "down cache rebuilt");
    elems
}

fn build_down_bfs(
    idx: &IdIndex,
    store: &impl RecordStore,
    relation: Entity,
    root: Entity,
    with: Id,
    out: &mut Vec<TravElem>,
    visited: &mut hashbrown::HashSet<Entity>,
) {
    if !visited.insert(root) {
        // Acyclicity guarantees termination (§5); this guards against a
        // programmer error slipping a cycle past the `ensure`-time check.
        return;
    }

    // Step 1: seed from all tables containing (relation, root), including
    // the empty list so the result stays coherent with live state.
    let mut seeds: Vec<TableHandle> = Vec::new();
    if let Some(h) = idx.get(Id::pair(relation, root)) {
        seeds.extend(idx.record(h).all_tables().map(|tr| tr.table));
    }

    // Step 2: is-a transparency. If relation != is-a, also seed using every
    // entity `x` that is-a `root` (i.e. a row of a table registered under
    // `(IsA, root)`), so inheritance is transparent to any other relation.
    if relation != crate::id::IS_A {
        if let Some(h) = idx.get(Id::pair(crate::id::IS_A, root)) {
            let is_a_tables: Vec<TableHandle> =
                idx.record(h).all_tables().map(|tr| tr.table).collect();
            for t in is_a_tables {
                let rows: Vec<Entity> = store.rows(t).to_vec();
                for x in rows {
                    if let Some(rh) = idx.get(Id::pair(relation, x)) {
                        seeds.extend(idx.record(rh).all_tables().map(|tr| tr.table));
                    }
                }
            }
        }
    }

    for table in seeds {
        let leaf = store.type_of(table).iter().any(|&id| id == with);
        out.push(TravElem {
            table,
            leaf,
            trav_column: None,
        });
        if leaf {
            continue;
        }
        // Step 3: recurse through rows whose entity is itself an acyclic
        // target, appending to the same output list (BFS by construction:
        // we finish the current seed layer before descending).
        for &row_entity in store.rows(table) {
            if idx.is_observed_as_acyclic_target(row_entity) {
                build_down_bfs(idx, store, relation, row_entity, with, out, visited);
            }
        }
    }
}

/// Builds (or returns the cached) up-traversal result for `(relation,
/// table, with)` (§4.4, component D).
pub fn trav_up(
    idx: &mut IdIndex,
    store: &impl RecordStore,
    relation: Entity,
    table: TableHandle,
    mut with: Id,
) -> Option<(Entity, Id, i32)> {
    // Union ids rewrite to (Union, P) before lookup (§4.4).
    if let IdKind::Pair(p, _) = with.kind() {
        if idx
            .get(Id::first_wildcard(p))
            .map(|h| idx.record(h).flags.contains(crate::index::IdFlags::UNION))
            .unwrap_or(false)
        {
            with = Id::pair(crate::id::UNION, p);
        }
    }

    let gen = idx
        .get(Id::first_wildcard(relation))
        .map(|h| idx.record(h).generation)
        .unwrap_or(0);
    let key = (relation, table, with);
    if let Some(cache) = idx.trav.up.get(&key) {
        if cache.generation == gen {
            idx.trav.stats.up_hits += 1;
            return cache.source.map(|s| (s, cache.id, cache.column));
        }
    }
    idx.trav.stats.up_misses += 1;
    #[cfg(feature = "tracing")]
    let before_gen = idx.trav.up.get(&key).map(|c| c.generation);

    let result = build_up(idx, store, relation, table, with);

    idx.trav.up.insert(
        key,
        UpCache {
            source: result.map(|(s, _, _)| s),
            id: result.map(|(_, i, _)| i).unwrap_or(with),
            column: result.map(|(_, _, c)| c).unwrap_or(-1),
            generation: gen,
        },
    );
    #[cfg(feature = "tracing")]
    tracing::debug!(?relation, ?table, before_gen, after_gen = gen, found = result.is_some(), "up cache rebuilt");
    result
}

fn build_up(
    idx: &IdIndex,
    store: &impl RecordStore,
    relation: Entity,
    table: TableHandle,
    with: Id,
) -> Option<(Entity, Id, i32)> {
    let ty = store.type_of(table);
    // Step 1: table must carry (R, *) pairs.
    let pairs: Vec<Entity> = ty
        .iter()
        .filter_map(|&id| match id.kind() {
            IdKind::Pair(r, t) if r == relation => Some(t),
            _ => None,
        })
        .collect();
    if pairs.is_empty() {
        return None;
    }

    // An id record inherits Exclusive/DontInherit from its relation's
    // wildcard at `ensure` time (§4.1 step 2), so `with`'s own record (if
    // any) already carries the answer.
    let with_flags = idx
        .get(with)
        .map(|h| idx.record(h).flags)
        .unwrap_or_default();
    let with_is_exclusive = with_flags.contains(crate::index::IdFlags::EXCLUSIVE);
    let with_dont_inherit = with_flags.contains(crate::index::IdFlags::DONT_INHERIT);
    let with_relation = with.relation();

    for t_i in pairs {
        let Some((sub_table, _row)) = store.record_of(t_i) else {
            continue;
        };

        if let Some((col, _)) = crate::table::column_of(store.type_of(sub_table), with) {
            return Some((t_i, with, col));
        }

        let sub_ty = store.type_of(sub_table);
        let has_is_a = sub_ty
            .iter()
            .any(|&id| matches!(id.kind(), IdKind::Pair(r, _) if r == crate::id::IS_A));

        // §4.4: before descending into is-a, check `sub_table` doesn't
        // already hold another concrete instance of `with`'s own relation
        // (its exact pair was just ruled out above by the `column_of` miss)
        // — if it does, that instance shadows any ancestor value and is-a
        // cannot contribute.
        let exclusive_occupied = with_relation
            .map(|r| sub_ty.iter().any(|&cand| matches!(cand.kind(), IdKind::Pair(cr, _) if cr == r)))
            .unwrap_or(false);

        if relation != crate::id::IS_A
            && has_is_a
            && !with_dont_inherit
            && !(with_is_exclusive && exclusive_occupied)
        {
            if let Some(r) = build_up(idx, store, crate::id::IS_A, sub_table, with) {
                return Some(r);
            }
        } else if let Some(r) = build_up(idx, store, relation, sub_table, with) {
            return Some(r);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{CHILD_OF, IS_A};
    use crate::table::TableStore;

    fn e(i: u32) -> Entity {
        Entity::new(i, 1)
    }

    #[test]
    fn down_traversal_finds_direct_children() {
        let mut idx = IdIndex::new();
        let mut store = TableStore::new();

        let parent = e(1);
        let health = Id::component(e(10));

        idx.ensure(Id::first_wildcard(CHILD_OF), |_, _| false).unwrap();
        {
            let h = idx.get(Id::first_wildcard(CHILD_OF)).unwrap();
            idx.record_mut(h).flags.insert(crate::index::IdFlags::ACYCLIC);
        }

        let child_ty = vec![Id::pair(CHILD_OF, parent), health];
        let child_table = store.table_for_type(&child_ty);
        let child = e(2);
        store.push_row(child_table, child);

        idx.ensure(Id::pair(CHILD_OF, parent), |_, _| false).unwrap();
        let tr = crate::table::TableRecord {
            table: child_table,
            column: 0,
            count: 1,
        };
        let h = idx.get(Id::pair(CHILD_OF, parent)).unwrap();
        idx.record_mut(h).register_table(tr, 1);

        let result = trav_entity_down(&mut idx, &store, CHILD_OF, parent, health);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].table, child_table);
        assert!(result[0].leaf);
    }

    #[test]
    fn up_traversal_transitive_through_is_a() {
        let mut idx = IdIndex::new();
        let mut store = TableStore::new();

        let a = e(1);
        let tag = Id::component(e(99));

        let a_ty = vec![tag];
        let a_table = store.table_for_type(&a_ty);
        store.push_row(a_table, a);

        let b = e(2);
        let b_ty = vec![Id::pair(IS_A, a)];
        let b_table = store.table_for_type(&b_ty);
        store.push_row(b_table, b);

        let c = e(3);
        let c_ty = vec![Id::pair(IS_A, b)];
        let c_table = store.table_for_type(&c_ty);
        store.push_row(c_table, c);

        idx.ensure(Id::pair(IS_A, a), |_, _| false).unwrap();
        idx.ensure(Id::pair(IS_A, b), |_, _| false).unwrap();

        let result = trav_up(&mut idx, &store, IS_A, c_table, tag);
        assert_eq!(result.map(|(src, _, _)| src), Some(a));
    }
}
