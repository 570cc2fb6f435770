//! Run monitor: action bracketing, invariant evaluation, pause control.

pub mod control;
pub mod history;
pub mod run_monitor;

pub use control::{Continuation, OperatorHandle};
pub use history::{DEFAULT_HISTORY_CAPACITY, HistoryRing};
pub use run_monitor::{
    ActionContext, ActionLike, DEFAULT_IMMEDIATE_THRESHOLD, FailureCounters, RunCounters,
    RunMonitor,
};
