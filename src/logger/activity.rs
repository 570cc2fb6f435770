//! Activity logger: a dedicated thread owns the JSONL writer; every other
//! component sends `ActivityEvent`s through a bounded crossbeam channel.
//! `send` uses `try_send`, so the harness is never blocked by logging.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, SentinelError};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, LogLevel};

const CHANNEL_CAPACITY: usize = 1024;

/// Events logged by the harness.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    SessionStarted {
        session_id: String,
        config_hash: String,
    },
    SessionStopped {
        session_id: String,
        reason: String,
        runs: u64,
        violations: u64,
        duration_ms: u64,
    },
    RunStarted {
        session_id: Option<String>,
        run_index: u64,
    },
    RunEnded {
        session_id: Option<String>,
        run_index: u64,
        outcome: String,
        steps: u64,
        violations: u64,
        duration_ms: u64,
    },
    ViolationDetected {
        session_id: Option<String>,
        run_index: u64,
        step: u64,
        fingerprint: String,
        kind: String,
        severity: String,
        occurrence_count: u64,
    },
    Paused {
        step: u64,
        fingerprint: Option<String>,
    },
    Resumed {
        step: u64,
    },
    SyncSucceeded {
        fingerprint: String,
        remote_id: String,
    },
    SyncFailed {
        fingerprint: String,
        error_code: String,
        error_message: String,
    },
    InternalFailure {
        component: &'static str,
        error_code: String,
        message: String,
    },
    StoreUnavailable {
        details: String,
    },
    Shutdown,
}

/// Cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// A handle whose events go nowhere.
    pub fn disabled() -> Self {
        let (tx, _rx) = bounded(1);
        Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send an event. Never blocks; a full channel drops the event.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Options for the activity logger thread.
pub struct ActivityLoggerConfig {
    pub jsonl: JsonlConfig,
    pub channel_capacity: usize,
}

impl ActivityLoggerConfig {
    pub fn new(jsonl: JsonlConfig) -> Self {
        Self {
            jsonl,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the logger thread.
///
/// The thread runs until `shutdown()` is called or every handle is dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let join = thread::Builder::new()
        .name("sen-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config.jsonl, &dropped_clone))
        .map_err(|e| SentinelError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((
        ActivityLoggerHandle {
            tx,
            dropped_events: dropped,
        },
        join,
    ))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, jsonl: JsonlConfig, dropped: &AtomicU64) {
    let mut writer = JsonlWriter::open(jsonl);

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::LogDropped, LogLevel::Warning);
            warn.count = Some(lost);
            warn.details = Some(format!("{lost} log events dropped due to back-pressure"));
            writer.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        if let Some(entry) = to_log_entry(&event) {
            writer.write_entry(&entry);
        }
    }

    writer.flush();
    writer.fsync();
}

#[allow(clippy::too_many_lines)]
fn to_log_entry(event: &ActivityEvent) -> Option<LogEntry> {
    let entry = match event {
        ActivityEvent::SessionStarted {
            session_id,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::SessionStart, LogLevel::Info);
            e.session_id = Some(session_id.clone());
            e.details = Some(format!("config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::SessionStopped {
            session_id,
            reason,
            runs,
            violations,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::SessionStop, LogLevel::Info);
            e.session_id = Some(session_id.clone());
            e.count = Some(*runs);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("reason={reason} violations={violations}"));
            e
        }
        ActivityEvent::RunStarted {
            session_id,
            run_index,
        } => {
            let mut e = LogEntry::new(EventType::RunStart, LogLevel::Info);
            e.session_id.clone_from(session_id);
            e.run_index = Some(*run_index);
            e
        }
        ActivityEvent::RunEnded {
            session_id,
            run_index,
            outcome,
            steps,
            violations,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::RunEnd, LogLevel::Info);
            e.session_id.clone_from(session_id);
            e.run_index = Some(*run_index);
            e.step = Some(*steps);
            e.count = Some(*violations);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("outcome={outcome}"));
            e
        }
        ActivityEvent::ViolationDetected {
            session_id,
            run_index,
            step,
            fingerprint,
            kind,
            severity,
            occurrence_count,
        } => {
            let level = if severity == "critical" {
                LogLevel::Critical
            } else {
                LogLevel::Warning
            };
            let mut e = LogEntry::new(EventType::ViolationDetected, level);
            e.session_id.clone_from(session_id);
            e.run_index = Some(*run_index);
            e.step = Some(*step);
            e.fingerprint = Some(fingerprint.clone());
            e.kind = Some(kind.clone());
            e.severity = Some(severity.clone());
            e.count = Some(*occurrence_count);
            e
        }
        ActivityEvent::Paused { step, fingerprint } => {
            let mut e = LogEntry::new(EventType::Paused, LogLevel::Info);
            e.step = Some(*step);
            e.fingerprint.clone_from(fingerprint);
            e
        }
        ActivityEvent::Resumed { step } => {
            let mut e = LogEntry::new(EventType::Resumed, LogLevel::Info);
            e.step = Some(*step);
            e
        }
        ActivityEvent::SyncSucceeded {
            fingerprint,
            remote_id,
        } => {
            let mut e = LogEntry::new(EventType::SyncOk, LogLevel::Info);
            e.fingerprint = Some(fingerprint.clone());
            e.details = Some(format!("remote_id={remote_id}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::SyncFailed {
            fingerprint,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::SyncFailed, LogLevel::Warning);
            e.fingerprint = Some(fingerprint.clone());
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::InternalFailure {
            component,
            error_code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::InternalFailure, LogLevel::Warning);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(message.clone());
            e.details = Some(format!("component={component}"));
            e.ok = Some(false);
            e
        }
        ActivityEvent::StoreUnavailable { details } => {
            let mut e = LogEntry::new(EventType::StoreUnavailable, LogLevel::Critical);
            e.error_code = Some("SEN-2103".to_string());
            e.error_message = Some(details.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path, capacity: usize) -> ActivityLoggerConfig {
        ActivityLoggerConfig {
            jsonl: JsonlConfig {
                path: dir.join("activity.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_rotated_files: 3,
                fsync_interval_secs: 60,
            },
            channel_capacity: capacity,
        }
    }

    #[test]
    fn events_reach_the_log_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path(), 64)).unwrap();
        let clone = handle.clone();
        handle.send(ActivityEvent::SessionStarted {
            session_id: "s-1".to_string(),
            config_hash: "abc".to_string(),
        });
        clone.send(ActivityEvent::ViolationDetected {
            session_id: Some("s-1".to_string()),
            run_index: 0,
            step: 2,
            fingerprint: "zombie-entity:01".to_string(),
            kind: "zombie-entity".to_string(),
            severity: "critical".to_string(),
            occurrence_count: 1,
        });
        handle.send(ActivityEvent::StoreUnavailable {
            details: "disk full".to_string(),
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("activity.jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event"], "session_start");
        assert_eq!(lines[1]["event"], "violation_detected");
        assert_eq!(lines[1]["level"], "critical");
        assert_eq!(lines[1]["step"], 2);
        assert_eq!(lines[2]["error_code"], "SEN-2103");
    }

    #[test]
    fn disabled_handle_swallows_events() {
        let handle = ActivityLoggerHandle::disabled();
        handle.send(ActivityEvent::Resumed { step: 1 });
        handle.shutdown();
        assert_eq!(handle.dropped_events(), 0);
    }

    #[test]
    fn full_channel_counts_drops() {
        let (tx, _rx) = bounded(1);
        let handle = ActivityLoggerHandle {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        };
        handle.send(ActivityEvent::Resumed { step: 1 });
        handle.send(ActivityEvent::Resumed { step: 2 });
        handle.send(ActivityEvent::Resumed { step: 3 });
        assert_eq!(handle.dropped_events(), 2);
    }
}
