//! Remote sync: payload shaping, report sinks, and the background worker.

pub mod payload;
pub mod sink;
pub mod worker;

pub use payload::BugReportPayload;
pub use sink::{FileSink, MemorySink, ReportSink, WebhookSink, sink_from_config};
pub use worker::{SyncHandle, SyncPassSummary, SyncSettings, SyncWorker, Syncer};
