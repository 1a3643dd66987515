//!
//! ## rel-trav
//!
//! `rel-trav` is the relationship traversal, reachability and
//! event-propagation core of an entity-component-system: the engine that
//! answers "given a component requirement, which table/row satisfies it, and
//! through which chain of relationships?"
//!
//! ### What's in scope
//!
//! * An [`id index`](index) mapping a component id or relationship pair
//!   `(Relation, Target)` — wildcards included — to an id record aggregating
//!   its tables, flags and intrusive wildcard-chain links.
//! * A [`reachable-ids cache`](index::reachable) answering "which components
//!   does this table inherit along relation R, and from which ancestor?" in
//!   amortized constant time.
//! * [`Down`](index::trav) and [`up`](index::trav) traversal caches,
//!   invalidated by [`generation counters`](index::invalidate) whenever a
//!   participating entity is mutated.
//! * An [`observer index`](observer) and [`event-emission engine`](event)
//!   that broadcasts add/remove/set/unset along acyclic relationship edges,
//!   synthesizing override and re-exposure events from the reachable-ids
//!   cache.
//!
//! ### Deliberately out of scope
//!
//! General entity/record storage and table-graph construction are external
//! collaborators, reached only through the [`RecordStore`](table::RecordStore)
//! trait. [`World`](world::World) bundles a minimal in-crate implementation
//! (`TableStore`) so the crate is runnable standalone; a host ECS is expected
//! to supply its own backed by real archetype storage.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

extern crate alloc;
extern crate self as rel_trav;

#[macro_use]
mod util;

pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod index;
pub mod observer;
pub mod table;
pub mod world;

mod hash;

pub mod prelude;
