//! Session orchestration: multi-run sequencing, aggregates, stop/resume.

pub mod control;
pub mod orchestrator;
pub mod runner;
pub mod summary;

pub use control::SessionControl;
pub use orchestrator::{
    ADHOC_SESSION_ID, Concludable, RunConclusion, RunDecision, SessionOptions,
    SessionOrchestrator, SessionState, SummaryCallback, SyncPlan,
};
pub use runner::{DEFAULT_MAX_STEPS, Driver, RunnerOptions, run_session};
pub use summary::{SessionSummary, SessionTally};
