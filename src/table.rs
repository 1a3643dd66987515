//! Tables, table records and the abstract record store.
//!
//! The general entity/record storage and the table graph construction are
//! external collaborators (§1 non-goals): this module only models the slice
//! of table state the id index and traversal caches need — the type, the
//! row count, the acyclic projection, and the handful of flags every
//! invariant in §3 is stated against.

use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::bitflags_like;
use crate::id::Entity;
use crate::id::Id;

/// Opaque handle to a table, stable for the table's lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct TableHandle(
    /// Index into [`TableStore`]'s table vector.
    pub u32,
);

bitflags_like! {
    /// Per-table flags (§3).
    pub struct TableFlags: u8 {
        /// The table carries at least one `(is-a, *)` pair.
        const HAS_IS_A = 1 << 0;
        /// The table carries at least one pair along an acyclic relation.
        const HAS_ACYCLIC = 1 << 1;
    }
}

/// Back-reference stored in a table's id-record cache-header list (§3).
#[derive(Clone, Copy, Debug)]
pub struct TableRecord {
    /// The table this record points to.
    pub table: TableHandle,
    /// First occurrence index of the id in the table's type.
    pub column: i32,
    /// Number of consecutive occurrences of the id starting at `column`.
    pub count: i32,
}

/// An ordered sequence of ids (the table's type) plus the handful of facts
/// about it this subsystem needs.
#[derive(Clone, Debug)]
pub struct Table {
    /// The table's component/relationship-pair type, in declaration order.
    pub ty: Vec<Id>,
    /// Entities occupying each row, in row order. Needed to test
    /// "observed-as-acyclic-target" per row during traversal and propagation.
    pub rows: Vec<Entity>,
    /// Per-table flags (§3).
    pub flags: TableFlags,
    /// Sub-sequence of `ty` whose relation is marked acyclic (§3).
    pub acyclic_projection: Vec<Id>,
    /// Number of rows whose entity is itself used as an acyclic target.
    pub observed_count: u32,
}

impl Table {
    /// An empty table of the given type, with no rows yet.
    #[must_use]
    pub fn new(ty: Vec<Id>) -> Self {
        Table {
            ty,
            rows: Vec::new(),
            flags: TableFlags::empty(),
            acyclic_projection: Vec::new(),
            observed_count: 0,
        }
    }

    /// Number of live rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// `true` if `id` occurs anywhere in the table's type.
    #[must_use]
    pub fn has_id(&self, id: Id) -> bool {
        self.ty.contains(&id)
    }

    /// Column range `[column, column+count)` for the first run of `id` in `ty`, if present.
    #[must_use]
    pub fn column_of(&self, id: Id) -> Option<(i32, i32)> {
        column_of(&self.ty, id)
    }

    /// Recomputes `flags` and `acyclic_projection` from `ty` (§3). `is_acyclic`
    /// answers whether a given relation's `(R, *)` record carries the Acyclic
    /// flag; kept as a closure so this module doesn't depend on `crate::index`.
    pub fn sync_flags(&mut self, is_acyclic: impl Fn(Entity) -> bool) {
        let mut flags = TableFlags::empty();
        let mut projection = Vec::new();
        for &id in &self.ty {
            if let crate::id::IdKind::Pair(r, _) = id.kind() {
                if r == crate::id::IS_A {
                    flags.insert(TableFlags::HAS_IS_A);
                }
                if is_acyclic(r) {
                    flags.insert(TableFlags::HAS_ACYCLIC);
                    projection.push(id);
                }
            }
        }
        self.flags = flags;
        self.acyclic_projection = projection;
    }

    /// Recomputes `observed_count` from `rows` (§3). `is_observed` answers
    /// whether a given entity is itself used as an acyclic target.
    pub fn sync_observed_count(&mut self, is_observed: impl Fn(Entity) -> bool) {
        self.observed_count = self.rows.iter().filter(|&&e| is_observed(e)).count() as u32;
    }
}

/// Column range `[column, column+count)` for the first run of `id` in `ty`,
/// if present. Free function so callers holding only a `&[Id]` (e.g. via
/// [`RecordStore::type_of`]) don't need a concrete [`Table`].
#[must_use]
pub fn column_of(ty: &[Id], id: Id) -> Option<(i32, i32)> {
    let col = ty.iter().position(|&i| i == id)? as i32;
    let count = ty[col as usize..].iter().take_while(|&&i| i == id).count() as i32;
    Some((col, count))
}

/// Abstract collaborator giving access to general entity/record storage and
/// the table graph (§1: deliberately out of scope, provided by the host).
pub trait RecordStore {
    /// Resolves an entity to its current `(table, row)`, or `None` if the
    /// entity is not alive / has no record.
    fn record_of(&self, entity: Entity) -> Option<(TableHandle, usize)>;

    /// The ordered type of a table.
    fn type_of(&self, table: TableHandle) -> &[Id];

    /// Looks up (or creates, via the external table-graph factory) the
    /// canonical table for a given type. Used by the reachable-ids cache
    /// (§4.2 step 3) so repeated builds with identical acyclic subsets share
    /// storage.
    fn table_for_type(&mut self, ty: &[Id]) -> TableHandle;

    /// Entities occupying each row of `table`, in row order. Needed to walk
    /// observed-as-acyclic-target rows during traversal, invalidation and
    /// propagation.
    fn rows(&self, table: TableHandle) -> &[Entity];
}

/// A minimal, in-crate [`RecordStore`] sufficient to exercise and test the
/// traversal/event subsystem standalone. A host ECS is expected to supply
/// its own, backed by its real archetype storage.
#[derive(Default)]
pub struct TableStore {
    tables: Vec<Table>,
    by_type: HashMap<Vec<Id>, TableHandle>,
    entity_location: HashMap<Entity, (TableHandle, usize)>,
}

impl TableStore {
    /// An empty table store.
    #[must_use]
    pub fn new() -> Self {
        TableStore::default()
    }

    /// The table behind `handle`.
    #[must_use]
    pub fn table(&self, handle: TableHandle) -> &Table {
        &self.tables[handle.0 as usize]
    }

    /// The table behind `handle`, mutably.
    pub fn table_mut(&mut self, handle: TableHandle) -> &mut Table {
        &mut self.tables[handle.0 as usize]
    }

    /// Total number of distinct tables ever created.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Inserts `entity` as a new row of `table`, returning its row index.
    pub fn push_row(&mut self, table: TableHandle, entity: Entity) -> usize {
        let t = self.table_mut(table);
        t.rows.push(entity);
        let row = t.rows.len() - 1;
        self.entity_location.insert(entity, (table, row));
        row
    }

    /// Removes the row at `row` from `table` via swap-remove, fixing up the
    /// moved entity's recorded location. Returns the entity that used to
    /// occupy the last slot, if a swap occurred.
    pub fn swap_remove_row(&mut self, table: TableHandle, row: usize) -> Option<Entity> {
        let t = self.table_mut(table);
        let removed = t.rows.swap_remove(row);
        self.entity_location.remove(&removed);
        if row < t.rows.len() {
            let moved = t.rows[row];
            self.entity_location.insert(moved, (table, row));
            Some(moved)
        } else {
            None
        }
    }
}

impl RecordStore for TableStore {
    fn record_of(&self, entity: Entity) -> Option<(TableHandle, usize)> {
        self.entity_location.get(&entity).copied()
    }

    fn type_of(&self, table: TableHandle) -> &[Id] {
        &self.table(table).ty
    }

    fn table_for_type(&mut self, ty: &[Id]) -> TableHandle {
        if let Some(&h) = self.by_type.get(ty) {
            return h;
        }
        let handle = TableHandle(self.tables.len() as u32);
        self.tables.push(Table::new(ty.to_vec()));
        self.by_type.insert(ty.to_vec(), handle);
        handle
    }

    fn rows(&self, table: TableHandle) -> &[Entity] {
        &self.table(table).rows
    }
}

#[test]
fn table_column_of() {
    let a = Id::component(Entity::new(1, 1));
    let b = Id::component(Entity::new(2, 1));
    let t = Table::new(alloc::vec![a, a, b]);
    assert_eq!(t.column_of(a), Some((0, 2)));
    assert_eq!(t.column_of(b), Some((2, 1)));
    assert_eq!(t.column_of(Id::component(Entity::new(3, 1))), None);
}

#[test]
fn table_store_roundtrip() {
    let mut store = TableStore::new();
    let ty = alloc::vec![Id::component(Entity::new(5, 1))];
    let h = store.table_for_type(&ty);
    let e = Entity::new(100, 1);
    store.push_row(h, e);
    assert_eq!(store.record_of(e), Some((h, 0)));
    assert_eq!(store.type_of(h), &ty[..]);
}
