//! Background sync: pushes deduplicated violations to a report sink.
//!
//! A dedicated thread owns the pass loop. It wakes on a command or when the
//! interval elapses (`recv_timeout`). Periodic passes submit unsynced records
//! with at least `min_occurrences` occurrences. Immediate requests submit one
//! record regardless of the threshold. A failed submission leaves the record
//! unsynced so the next pass retries it.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

use crate::core::errors::{Result, SentinelError};
use crate::logger::{ActivityEvent, ActivityLoggerHandle};
use crate::sync::payload::BugReportPayload;
use crate::sync::sink::ReportSink;
use crate::violations::ViolationRegistry;

const COMMAND_CAPACITY: usize = 256;

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncPassSummary {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Sync thresholds and cadence.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub interval: Duration,
    pub min_occurrences: u64,
}

/// Synchronous core of the sync worker.
pub struct Syncer {
    violations: Arc<ViolationRegistry>,
    sink: Arc<dyn ReportSink>,
    min_occurrences: u64,
    logger: ActivityLoggerHandle,
}

impl Syncer {
    pub fn new(
        violations: Arc<ViolationRegistry>,
        sink: Arc<dyn ReportSink>,
        min_occurrences: u64,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            violations,
            sink,
            min_occurrences: min_occurrences.max(1),
            logger,
        }
    }

    /// Submit every due record.
    pub fn sync_pending(&self) -> SyncPassSummary {
        let mut summary = SyncPassSummary::default();
        let due = match self.violations.get_unsynced(self.min_occurrences) {
            Ok(due) => due,
            Err(err) => {
                eprintln!("[SEN-SYNC] cannot list unsynced violations: {err}");
                return summary;
            }
        };
        for record in due {
            summary.attempted += 1;
            match self.submit(&BugReportPayload::from_record(&record)) {
                Ok(()) => summary.synced += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// Submit one record now. Returns `Ok(false)` if there was nothing to do.
    pub fn sync_one(&self, fingerprint: &str) -> Result<bool> {
        match self.violations.get(fingerprint)? {
            Some(record) if !record.synced_to_remote => {
                self.submit(&BugReportPayload::from_record(&record))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn submit(&self, payload: &BugReportPayload) -> Result<()> {
        let outcome = self
            .sink
            .submit(payload)
            .and_then(|remote_id| {
                self.violations
                    .mark_synced(&payload.fingerprint, &remote_id)
                    .map(|_| remote_id)
            });
        match outcome {
            Ok(remote_id) => {
                self.logger.send(ActivityEvent::SyncSucceeded {
                    fingerprint: payload.fingerprint.clone(),
                    remote_id,
                });
                Ok(())
            }
            Err(err) => {
                eprintln!(
                    "[SEN-SYNC] {} sink failed for {}: {err}",
                    self.sink.name(),
                    payload.fingerprint
                );
                self.logger.send(ActivityEvent::SyncFailed {
                    fingerprint: payload.fingerprint.clone(),
                    error_code: err.code().to_string(),
                    error_message: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

enum SyncCommand {
    Immediate(String),
    Flush(Sender<SyncPassSummary>),
    Shutdown,
}

/// Cloneable handle for queueing sync work.
#[derive(Clone)]
pub struct SyncHandle {
    tx: Sender<SyncCommand>,
}

impl SyncHandle {
    /// Queue an immediate submission. Never blocks; returns `false` if the
    /// request could not be queued (the periodic pass still picks it up).
    pub fn request_immediate(&self, fingerprint: &str) -> bool {
        match self.tx.try_send(SyncCommand::Immediate(fingerprint.to_string())) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    /// Run a pass now and wait up to `timeout` for its summary.
    pub fn flush(&self, timeout: Duration) -> Result<SyncPassSummary> {
        let (ack_tx, ack_rx) = bounded(1);
        self.tx
            .send_timeout(SyncCommand::Flush(ack_tx), timeout)
            .map_err(|_| SentinelError::ChannelClosed { component: "sync" })?;
        ack_rx
            .recv_timeout(timeout)
            .map_err(|_| SentinelError::ChannelClosed { component: "sync" })
    }
}

/// The running sync thread.
pub struct SyncWorker {
    handle: SyncHandle,
    join: Option<thread::JoinHandle<()>>,
}

impl SyncWorker {
    pub fn spawn(syncer: Syncer, settings: SyncSettings) -> Result<Self> {
        let (tx, rx) = bounded(COMMAND_CAPACITY);
        let interval = settings.interval.max(Duration::from_millis(10));
        let join = thread::Builder::new()
            .name("sen-sync".to_string())
            .spawn(move || sync_thread_main(&syncer, &rx, interval))
            .map_err(|e| SentinelError::Runtime {
                details: format!("failed to spawn sync thread: {e}"),
            })?;
        Ok(Self {
            handle: SyncHandle { tx },
            join: Some(join),
        })
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Final pass, then stop the thread and wait for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.handle.tx.send(SyncCommand::Shutdown);
            if join.join().is_err() {
                eprintln!("[SEN-SYNC] sync thread panicked during shutdown");
            }
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sync_thread_main(syncer: &Syncer, rx: &Receiver<SyncCommand>, interval: Duration) {
    loop {
        match rx.recv_timeout(interval) {
            Ok(SyncCommand::Immediate(fingerprint)) => {
                let _ = syncer.sync_one(&fingerprint);
            }
            Ok(SyncCommand::Flush(ack)) => {
                let _ = ack.send(syncer.sync_pending());
            }
            Err(RecvTimeoutError::Timeout) => {
                syncer.sync_pending();
            }
            Ok(SyncCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                syncer.sync_pending();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::HarnessStore;
    use crate::sync::sink::MemorySink;
    use crate::violations::report::fixtures;

    fn setup() -> (tempfile::TempDir, Arc<ViolationRegistry>, Arc<MemorySink>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(HarnessStore::open(&dir.path().join("sync.db")).unwrap());
        let reg = Arc::new(ViolationRegistry::new(store, 5).unwrap());
        (dir, reg, Arc::new(MemorySink::new()))
    }

    fn syncer(reg: &Arc<ViolationRegistry>, sink: &Arc<MemorySink>) -> Syncer {
        let sink: Arc<dyn ReportSink> = Arc::clone(sink) as Arc<dyn ReportSink>;
        Syncer::new(Arc::clone(reg), sink, 2, ActivityLoggerHandle::disabled())
    }

    #[test]
    fn periodic_pass_honours_min_occurrences() {
        let (_dir, reg, sink) = setup();
        reg.record(&fixtures::report("a", "a:1")).unwrap();
        reg.record(&fixtures::report("b", "b:1")).unwrap();
        reg.record(&fixtures::report("b", "b:1")).unwrap();

        let s = syncer(&reg, &sink);
        let summary = s.sync_pending();
        assert_eq!(summary, SyncPassSummary { attempted: 1, synced: 1, failed: 0 });
        assert_eq!(sink.submitted()[0].fingerprint, "b:1");
        let synced = reg.get("b:1").unwrap().unwrap();
        assert_eq!(synced.remote_id.as_deref(), Some("mem-1"));
        assert!(!reg.get("a:1").unwrap().unwrap().synced_to_remote);

        assert_eq!(s.sync_pending().attempted, 0);
    }

    #[test]
    fn failures_leave_records_for_retry() {
        let (_dir, reg, sink) = setup();
        for _ in 0..2 {
            reg.record(&fixtures::report("c", "c:1")).unwrap();
        }
        let s = syncer(&reg, &sink);
        sink.set_failing(true);
        assert_eq!(s.sync_pending().failed, 1);
        assert!(!reg.get("c:1").unwrap().unwrap().synced_to_remote);

        sink.set_failing(false);
        assert_eq!(s.sync_pending().synced, 1);
        assert!(reg.get("c:1").unwrap().unwrap().synced_to_remote);
    }

    #[test]
    fn immediate_sync_ignores_threshold_and_skips_synced() {
        let (_dir, reg, sink) = setup();
        reg.record(&fixtures::report("d", "d:1")).unwrap();
        let s = syncer(&reg, &sink);
        assert!(s.sync_one("d:1").unwrap());
        assert!(!s.sync_one("d:1").unwrap());
        assert!(!s.sync_one("missing:0").unwrap());
        assert_eq!(sink.submitted().len(), 1);
    }

    #[test]
    fn worker_flushes_and_shuts_down() {
        let (_dir, reg, sink) = setup();
        for _ in 0..3 {
            reg.record(&fixtures::report("e", "e:1")).unwrap();
        }
        let worker = SyncWorker::spawn(
            syncer(&reg, &sink),
            SyncSettings {
                interval: Duration::from_secs(60),
                min_occurrences: 2,
            },
        )
        .unwrap();
        let summary = worker.handle().flush(Duration::from_secs(5)).unwrap();
        assert_eq!(summary.synced, 1);

        reg.record(&fixtures::report("f", "f:1")).unwrap();
        reg.record(&fixtures::report("f", "f:1")).unwrap();
        worker.shutdown();
        assert!(reg.get("f:1").unwrap().unwrap().synced_to_remote);
    }

    #[test]
    fn immediate_requests_after_shutdown_are_refused() {
        let (_dir, reg, sink) = setup();
        let worker = SyncWorker::spawn(
            syncer(&reg, &sink),
            SyncSettings {
                interval: Duration::from_secs(60),
                min_occurrences: 2,
            },
        )
        .unwrap();
        let handle = worker.handle();
        worker.shutdown();
        assert!(!handle.request_immediate("x:1"));
        assert!(handle.flush(Duration::from_millis(50)).is_err());
    }
}
