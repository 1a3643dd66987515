//! A prelude module. Reexports types and traits, enough to start using [`rel_trav`](crate).

pub use crate::{
    config::WorldConfig,
    error::{ConstraintViolation, RelTravError},
    event::{EmitDesc, EmitFlags},
    id::{Entity, Id, IdKind, ANY, CHILD_OF, IS_A, UNION, WILDCARD},
    index::{IdFlags, IdIndex},
    observer::{Event, ObserverContext, ObserverDesc, ObserverId, ObserverTerm},
    table::{RecordStore, Table, TableHandle, TableRecord, TableStore},
    world::World,
};
