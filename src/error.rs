//! Error taxonomy (§7): hand-rolled enums with manual `Display`/`Error` impls,
//! matching the teacher's own `EntityError`/`OwnershipError` pattern rather
//! than pulling in a derive-macro error crate.

use core::fmt;

/// A constraint the engine refused to violate. Carrying a mutation that
/// would violate one of these is rejected before any state is committed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConstraintViolation {
    /// Adding a second instance of an [`crate::id::Id::relation`]-exclusive relation.
    Exclusive,
    /// `oneof(Relation) = K` and the target does not have `(ChildOf, K)`.
    OneOf,
    /// `is-a` target carries the `final` flag; it cannot be instantiated from.
    Final,
    /// An acyclic relation edge would form a cycle.
    Cycle,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintViolation::Exclusive => {
                write!(f, "relation is exclusive and already has an instance")
            }
            ConstraintViolation::OneOf => write!(f, "target does not satisfy oneof constraint"),
            ConstraintViolation::Final => write!(f, "cannot inherit from a final entity"),
            ConstraintViolation::Cycle => write!(f, "acyclic relation would form a cycle"),
        }
    }
}

/// Top-level error for all fallible operations in this crate (§7).
#[derive(Debug)]
pub enum RelTravError {
    /// A required argument was null, zero, or otherwise missing.
    InvalidParameter(&'static str),
    /// A mutation was refused because it would violate an invariant.
    ConstraintViolated(ConstraintViolation),
    /// Distinguishes "lookup came back empty because of a caller error" from
    /// plain absence (plain absence is modeled as `None`, not this variant).
    NotFound,
    /// An internal invariant was broken (missing wildcard record, generation
    /// mismatch). Fatal in debug builds; logged and returned in release.
    Internal(&'static str),
    /// The operation depends on a feature that isn't enabled/registered.
    Unsupported(&'static str),
}

impl fmt::Display for RelTravError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelTravError::InvalidParameter(what) => write!(f, "invalid parameter: {what}"),
            RelTravError::ConstraintViolated(c) => write!(f, "constraint violated: {c}"),
            RelTravError::NotFound => write!(f, "not found"),
            RelTravError::Internal(what) => write!(f, "internal invariant violated: {what}"),
            RelTravError::Unsupported(what) => write!(f, "unsupported: {what}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RelTravError {}

impl From<ConstraintViolation> for RelTravError {
    fn from(c: ConstraintViolation) -> Self {
        RelTravError::ConstraintViolated(c)
    }
}

/// Raises an internal invariant violation: logs at `error!` and panics in
/// debug builds, returns `RelTravError::Internal` in release builds.
/// Mirrors §7: "fatal; crash-debug, report in release".
#[cfg_attr(not(debug_assertions), allow(unused_variables))]
pub(crate) fn fatal(what: &'static str) -> RelTravError {
    #[cfg(feature = "tracing")]
    tracing::error!(what, "internal invariant violated");

    #[cfg(debug_assertions)]
    panic!("internal invariant violated: {what}");

    #[cfg(not(debug_assertions))]
    RelTravError::Internal(what)
}
