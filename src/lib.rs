#![forbid(unsafe_code)]

//! Invariant Sentinel: an invariant-based regression harness for stateful,
//! turn-based simulations.
//!
//! A driver reports every mutating action to the harness:
//! 1. **Snapshots**: the state is deep-copied before and after the action
//! 2. **Invariants**: absolute and transitional predicates run on the pair
//! 3. **Violations**: findings are fingerprinted, deduplicated and persisted
//!    in a bounded SQLite store, then optionally synced to a report sink
//!
//! Attended sessions pause on the first violation for an operator; unattended
//! sessions record and keep going (fuzzing mode).
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use invariant_sentinel::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use invariant_sentinel::core::config::Config;
//! use invariant_sentinel::invariants::{Invariant, InvariantRegistry};
//! ```

pub mod prelude;

pub mod cardgame;
#[cfg(feature = "cli")]
pub mod cli;
pub mod core;
pub mod harness;
pub mod invariants;
pub mod logger;
pub mod monitor;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod violations;
