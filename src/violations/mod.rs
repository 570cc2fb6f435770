//! Violation identity and persistence: fingerprints, enriched reports and
//! the deduplicating registry.

pub mod fingerprint;
pub mod report;
pub mod tracker;

pub use fingerprint::{DEFAULT_VOLATILE_PATTERN, Fingerprinter};
pub use report::{ActionSummary, HistoryEntry, Report};
pub use tracker::{DEFAULT_SAMPLE_CAPACITY, ViolationRegistry};
