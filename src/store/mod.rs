//! Persistent store: bounded run history, subject statistics, deduplicated
//! violations and session metadata in one SQLite database.

pub mod records;
pub mod sqlite;
pub mod stats;

pub use records::{
    ParticipantSummary, RunOutcome, RunRecord, SubjectDelta, SubjectStats, ViolationRecord,
};
pub use sqlite::{DEFAULT_MAX_RUNS, HarnessStore, StoreTxn, meta_keys};
pub use stats::{FullStatistics, StatsEngine};
