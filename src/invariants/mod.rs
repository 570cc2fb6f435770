//! Invariant registry: named, typed predicates over subject snapshots.

pub mod registry;
pub mod violation;

pub use registry::{Evaluation, Finding, Invariant, InvariantRegistry, Predicate, PredicateFailure};
pub use violation::{Category, Severity, Violation};
