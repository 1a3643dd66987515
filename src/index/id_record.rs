//! The id record: the per-id payload of the id index (§3, §4.1).

use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::bitflags_like;
use crate::id::Id;
use crate::table::{TableHandle, TableRecord};

bitflags_like! {
    /// Flags carried by an id record (§3). Concrete pairs inherit these from
    /// their `(Relation, *)` record on creation (§4.1 step 2).
    pub struct IdFlags: u8 {
        /// This id carries no component data (a zero-sized tag).
        const TAG = 1 << 0;
        /// A pair with this relation is not inherited along `is-a` (§4.1).
        const DONT_INHERIT = 1 << 1;
        /// An entity may only have one concrete pair for this relation.
        const EXCLUSIVE = 1 << 2;
        /// This relation's chain participates in the acyclic sub-chain and
        /// is eligible for reachability/propagation (§4.1, §4.5, §4.7).
        const ACYCLIC = 1 << 3;
        /// A union-relation id, rewritten to its `(Union, P)` storage
        /// encoding before lookup (§4.4).
        const UNION = 1 << 4;
    }
}

/// Component type metadata attached to an id record when the id carries data.
#[derive(Clone, Copy, Debug)]
pub struct ComponentInfo {
    /// Size in bytes of one component value.
    pub size: usize,
    /// Required alignment in bytes.
    pub align: usize,
    /// Whether the component type is `Copy` (host-determined; this crate
    /// never touches the bytes itself).
    pub is_copy: bool,
}

/// Intrusive wildcard-chain link: membership in a sibling list whose head is
/// some other id record (§3, §9 "intrusive wildcard lists").
#[derive(Clone, Copy, Default, Debug)]
pub struct ListLink {
    /// Previous member of the chain, if any.
    pub prev: Option<IdRecordHandle>,
    /// Next member of the chain, if any.
    pub next: Option<IdRecordHandle>,
}

/// Handle into the id index's record slab.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct IdRecordHandle(
    /// Slab index into [`crate::index::IdIndex`]'s record storage.
    pub u32,
);

/// A simple name index on an id record, supplemented from
/// `id_record.h`'s `name_index` field (§B in `SPEC_FULL.md`).
pub type NameIndex = HashMap<alloc::string::String, Id>;

/// One entry per distinct id key in the index (§3).
pub struct IdRecord {
    /// The id this record is keyed on.
    pub id: Id,
    /// Flags inherited from the `(Relation, *)` record at creation.
    pub flags: IdFlags,
    /// Component type metadata, if this id carries data.
    pub type_info: Option<ComponentInfo>,

    /// Tables with at least one live row containing this id (fast path).
    tables_non_empty: Vec<TableRecord>,
    /// Tables registered for this id but currently with zero live rows.
    tables_empty: Vec<TableRecord>,
    /// `table -> (is_non_empty, index into the corresponding vec)`, kept in
    /// sync so empty/non-empty toggling is O(1) (§3 invariants).
    table_pos: HashMap<TableHandle, (bool, usize)>,

    /// Membership in the `(Relation, *)` chain, when this is a concrete pair.
    pub first: ListLink,
    /// Membership in the `(*, Target)` chain, when this is a concrete pair.
    pub second: ListLink,
    /// Membership in the acyclic sub-chain of `(*, Target)`.
    pub acyclic: ListLink,

    /// Head of the `(Relation, *)` chain, when this record itself is `(R, *)`.
    pub first_head: Option<IdRecordHandle>,
    /// Head of the `(*, Target)` chain, when this record itself is `(*, T)`.
    pub second_head: Option<IdRecordHandle>,
    /// Head of the acyclic sub-chain, when this record itself is `(*, T)`.
    pub acyclic_head: Option<IdRecordHandle>,

    /// Bumped whenever the down cache entries keyed on this id must be
    /// rebuilt (§4.5); down cache entries compare against this.
    pub generation: u32,

    /// `true` while this record's `(R, *)` head is on the world's pending
    /// reachable-invalidation list, to keep that list deduplicated (§4.5).
    pub reachable_pending: bool,

    /// Lazily-built name-to-id lookup scoped to this record, if named
    /// children have been registered against it (§B).
    pub name_index: Option<NameIndex>,
}

impl IdRecord {
    pub(crate) fn new(id: Id) -> Self {
        IdRecord {
            id,
            flags: IdFlags::empty(),
            type_info: None,
            tables_non_empty: Vec::new(),
            tables_empty: Vec::new(),
            table_pos: HashMap::new(),
            first: ListLink::default(),
            second: ListLink::default(),
            acyclic: ListLink::default(),
            first_head: None,
            second_head: None,
            acyclic_head: None,
            generation: 0,
            reachable_pending: false,
            name_index: None,
        }
    }

    /// `true` if no table is registered for this id, empty or not.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables_non_empty.is_empty() && self.tables_empty.is_empty()
    }

    /// Tables registered for this id with at least one live row.
    #[must_use]
    pub fn non_empty_tables(&self) -> &[TableRecord] {
        &self.tables_non_empty
    }

    /// Tables registered for this id with zero live rows.
    #[must_use]
    pub fn empty_tables(&self) -> &[TableRecord] {
        &self.tables_empty
    }

    /// All tables registered for this id, empty or not — the "all-variants"
    /// iterator the down-cache build folds the empty list back into (§4.3 step 1).
    pub fn all_tables(&self) -> impl Iterator<Item = &TableRecord> {
        self.tables_non_empty.iter().chain(self.tables_empty.iter())
    }

    /// Registers `table` against this id record. `row_count` determines
    /// whether it starts in the empty or non-empty list.
    pub(crate) fn register_table(&mut self, tr: TableRecord, row_count: usize) {
        if self.table_pos.contains_key(&tr.table) {
            return;
        }
        if row_count == 0 {
            self.tables_empty.push(tr);
            self.table_pos
                .insert(tr.table, (false, self.tables_empty.len() - 1));
        } else {
            self.tables_non_empty.push(tr);
            self.table_pos
                .insert(tr.table, (true, self.tables_non_empty.len() - 1));
        }
    }

    /// Unregisters `table` entirely. Returns the removed record, if any.
    pub(crate) fn unregister_table(&mut self, table: TableHandle) -> Option<TableRecord> {
        let (was_non_empty, idx) = self.table_pos.remove(&table)?;
        let list = if was_non_empty {
            &mut self.tables_non_empty
        } else {
            &mut self.tables_empty
        };
        let removed = list.swap_remove(idx);
        if idx < list.len() {
            let moved = list[idx].table;
            self.table_pos.insert(moved, (was_non_empty, idx));
        }
        Some(removed)
    }

    /// Flips `table`'s membership between the empty and non-empty lists
    /// (§3's empty/non-empty state machine). No-op if already in that state.
    pub(crate) fn set_table_empty(&mut self, table: TableHandle, empty: bool) {
        let Some(&(was_non_empty, idx)) = self.table_pos.get(&table) else {
            return;
        };
        if was_non_empty == !empty {
            return;
        }
        let (src, dst) = if was_non_empty {
            (&mut self.tables_non_empty, &mut self.tables_empty)
        } else {
            (&mut self.tables_empty, &mut self.tables_non_empty)
        };
        let tr = src.swap_remove(idx);
        if idx < src.len() {
            let moved = src[idx].table;
            self.table_pos.insert(moved, (was_non_empty, idx));
        }
        dst.push(tr);
        self.table_pos.insert(table, (!was_non_empty, dst.len() - 1));
    }

    /// The table record for `table`, whichever list it currently lives in.
    #[must_use]
    pub fn table_record(&self, table: TableHandle) -> Option<&TableRecord> {
        let &(was_non_empty, idx) = self.table_pos.get(&table)?;
        Some(if was_non_empty {
            &self.tables_non_empty[idx]
        } else {
            &self.tables_empty[idx]
        })
    }
}

#[test]
fn empty_nonempty_toggle() {
    use crate::id::Entity;
    let mut r = IdRecord::new(Id::component(Entity::new(1, 1)));
    let t = TableHandle(0);
    r.register_table(
        TableRecord {
            table: t,
            column: 0,
            count: 1,
        },
        0,
    );
    assert_eq!(r.empty_tables().len(), 1);
    assert_eq!(r.non_empty_tables().len(), 0);
    r.set_table_empty(t, false);
    assert_eq!(r.empty_tables().len(), 0);
    assert_eq!(r.non_empty_tables().len(), 1);
    r.set_table_empty(t, true);
    assert_eq!(r.empty_tables().len(), 1);
    assert_eq!(r.non_empty_tables().len(), 0);
}

#[test]
fn unregister_swaps_last_in() {
    use crate::id::Entity;
    let mut r = IdRecord::new(Id::component(Entity::new(1, 1)));
    for i in 0..3u32 {
        r.register_table(
            TableRecord {
                table: TableHandle(i),
                column: 0,
                count: 1,
            },
            1,
        );
    }
    r.unregister_table(TableHandle(0));
    assert_eq!(r.non_empty_tables().len(), 2);
    assert!(r.table_record(TableHandle(1)).is_some());
    assert!(r.table_record(TableHandle(2)).is_some());
    assert!(r.table_record(TableHandle(0)).is_none());
}
