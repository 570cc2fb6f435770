//! Activity logging: JSONL writer plus the background logger thread.

pub mod activity;
pub mod jsonl;

pub use activity::{ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger};
