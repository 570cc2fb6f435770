//! Snapshot/diff engine: independent deep copies of subject state and
//! human-readable before→after deltas for diagnostics.

pub mod capture;
pub mod diff;

pub use capture::{Capture, StateSnapshot, snapshot};
pub use diff::{DiffSummary, diff};
