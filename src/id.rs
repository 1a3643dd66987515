//! Entity handles and the 64-bit [`Id`] encoding used to key the id index.
//!
//! An [`Id`] is either a bare component id, or a pair `(Relation, Target)`.
//! Either side of a pair may be the wildcard sentinel, and the whole id may
//! be the universal wildcard `Any`. Stripping the generation from an entity
//! yields the canonical key used everywhere in the index.

use core::fmt;

/// Opaque entity handle: a 32-bit index plus a 32-bit generation.
///
/// Dereferencing an `Entity` into a `(table, row)` pair is the job of the
/// external record store (see [`crate::table::RecordStore`]); this type
/// carries no storage pointer of its own.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Entity {
    bits: u64,
}

const INDEX_MASK: u64 = 0xFFFF_FFFF;

impl Entity {
    /// Constructs an entity from an index and a generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Entity {
            bits: (index as u64) | ((generation as u64) << 32),
        }
    }

    /// The 32-bit slot index, ignoring generation.
    #[must_use]
    pub const fn index(self) -> u32 {
        (self.bits & INDEX_MASK) as u32
    }

    /// The 32-bit generation counter.
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.bits >> 32) as u32
    }

    /// Strips the generation, yielding the canonical key for this entity's index.
    #[must_use]
    pub const fn strip_generation(self) -> Entity {
        Entity::new(self.index(), 0)
    }

    /// `true` if this entity is the [`WILDCARD`] sentinel.
    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        self.index() == WILDCARD.index()
    }

    /// `true` if this entity is the [`ANY`] sentinel.
    #[must_use]
    pub const fn is_any(self) -> bool {
        self.index() == ANY.index()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("index", &self.index())
            .field("generation", &self.generation())
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:x}#{:x}}}", self.index(), self.generation())
    }
}

/// Wildcard sentinel: matches any target or any relation, depending on slot.
pub const WILDCARD: Entity = Entity::new(u32::MAX, 0);

/// Universal wildcard: matches a bare id or any pair, in any slot.
pub const ANY: Entity = Entity::new(u32::MAX - 1, 0);

/// Built-in `IsA` relation, used for component inheritance between prefab and instance.
pub const IS_A: Entity = Entity::new(1, 1);

/// Built-in `ChildOf` relation, the default acyclic parent-of relation.
pub const CHILD_OF: Entity = Entity::new(2, 1);

/// Built-in `Union` relation, used to rewrite a union-relation id `(P, X)`
/// to its actual storage encoding `(Union, P)` before lookup (§4.4).
pub const UNION: Entity = Entity::new(3, 1);

const PAIR_FLAG: u64 = 1 << 63;

/// A 64-bit id: either a bare component id or an encoded `(Relation, Target)` pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Id {
    bits: u64,
}

/// The decomposed form of an [`Id`], used by [`crate::index::IdIndex::ensure`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IdKind {
    /// A bare component or tag id.
    Component(Entity),
    /// A relationship pair. Either side may be [`WILDCARD`].
    Pair(Entity, Entity),
}

impl Id {
    /// Builds a bare component/tag id.
    #[must_use]
    pub fn component(e: Entity) -> Self {
        Id {
            bits: e.strip_generation().bits,
        }
    }

    /// Builds a pair id `(relation, target)`. Either side may be [`WILDCARD`].
    #[must_use]
    pub fn pair(relation: Entity, target: Entity) -> Self {
        let r = relation.strip_generation().index() as u64;
        let t = target.strip_generation().index() as u64;
        Id {
            bits: PAIR_FLAG | (r << 32) | t,
        }
    }

    /// The `(R, *)` wildcard id for a relation.
    #[must_use]
    pub fn first_wildcard(relation: Entity) -> Self {
        Id::pair(relation, WILDCARD)
    }

    /// The `(*, T)` wildcard id for a target.
    #[must_use]
    pub fn second_wildcard(target: Entity) -> Self {
        Id::pair(WILDCARD, target)
    }

    /// `true` if this id encodes a `(Relation, Target)` pair rather than a
    /// bare component.
    #[must_use]
    pub const fn is_pair(self) -> bool {
        self.bits & PAIR_FLAG != 0
    }

    /// Splits this id into its canonical `(role, relation, target)` decomposition.
    #[must_use]
    pub fn kind(self) -> IdKind {
        if self.is_pair() {
            let r = ((self.bits >> 32) & INDEX_MASK) as u32;
            let t = (self.bits & INDEX_MASK) as u32;
            IdKind::Pair(Entity::new(r, 0), Entity::new(t, 0))
        } else {
            IdKind::Component(Entity::new((self.bits & INDEX_MASK) as u32, 0))
        }
    }

    /// Relation side of a pair id, if this is a pair.
    #[must_use]
    pub fn relation(self) -> Option<Entity> {
        match self.kind() {
            IdKind::Pair(r, _) => Some(r),
            IdKind::Component(_) => None,
        }
    }

    /// Target side of a pair id, if this is a pair.
    #[must_use]
    pub fn target(self) -> Option<Entity> {
        match self.kind() {
            IdKind::Pair(_, t) => Some(t),
            IdKind::Component(_) => None,
        }
    }

    /// `true` if either slot of a pair is the wildcard, or the id is the
    /// universal `Any` component id.
    #[must_use]
    pub fn is_wildcard(self) -> bool {
        match self.kind() {
            IdKind::Component(e) => e.is_any(),
            IdKind::Pair(r, t) => r.is_wildcard() || t.is_wildcard() || r.is_any() || t.is_any(),
        }
    }

    /// Canonical key: generation bits are already stripped at construction,
    /// this exists for symmetry with `Entity::strip_generation` call sites.
    #[must_use]
    pub const fn canonical(self) -> Self {
        self
    }

    /// The raw 64-bit encoding, for diagnostics (tracing's `bits` field).
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.bits
    }
}

impl From<Entity> for Id {
    fn from(e: Entity) -> Self {
        Id::component(e)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            IdKind::Component(e) => write!(f, "Id({:x})", e.index()),
            IdKind::Pair(r, t) => write!(f, "Id({:x}, {:x})", r.index(), t.index()),
        }
    }
}

#[test]
fn pair_roundtrip() {
    let r = Entity::new(10, 3);
    let t = Entity::new(20, 5);
    let id = Id::pair(r, t);
    assert!(id.is_pair());
    assert_eq!(id.relation().unwrap().index(), 10);
    assert_eq!(id.target().unwrap().index(), 20);
}

#[test]
fn wildcard_detection() {
    let r = Entity::new(10, 1);
    assert!(Id::first_wildcard(r).is_wildcard());
    assert!(Id::second_wildcard(r).is_wildcard());
    assert!(!Id::pair(r, Entity::new(3, 1)).is_wildcard());
    assert!(Id::component(ANY).is_wildcard());
}

#[test]
fn component_strips_generation() {
    let a = Entity::new(7, 1);
    let b = Entity::new(7, 99);
    assert_eq!(Id::component(a), Id::component(b));
}
