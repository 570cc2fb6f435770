//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use invariant_sentinel::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, SentinelError};

// Harness
pub use crate::harness::{Harness, HarnessBuilder};

// Snapshots
pub use crate::snapshot::{Capture, StateSnapshot, snapshot};

// Invariants and violations
pub use crate::invariants::{Category, Invariant, InvariantRegistry, Severity, Violation};
pub use crate::violations::{Fingerprinter, Report, ViolationRegistry};

// Monitor
pub use crate::monitor::{ActionContext, ActionLike, OperatorHandle, RunMonitor};

// Sessions
pub use crate::session::{
    Concludable, Driver, RunConclusion, RunDecision, RunnerOptions, SessionControl,
    SessionOptions, SessionSummary, run_session,
};

// Store
pub use crate::store::{HarnessStore, RunOutcome, RunRecord, ViolationRecord};

// Sync
pub use crate::sync::{FileSink, MemorySink, ReportSink, WebhookSink};
