//! Report sinks: where deduplicated bug reports are delivered.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::core::config::{SinkKind, SyncConfig};
use crate::core::errors::{Result, SentinelError};
use crate::sync::payload::BugReportPayload;

/// A reporting collaborator. `submit` returns the remote identifier.
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn submit(&self, payload: &BugReportPayload) -> Result<String>;
}

/// Build the sink selected by the sync configuration, if any.
pub fn sink_from_config(config: &SyncConfig) -> Result<Option<Box<dyn ReportSink>>> {
    match config.sink {
        SinkKind::None => Ok(None),
        SinkKind::File => Ok(Some(Box::new(FileSink::new(config.file_path.clone())))),
        SinkKind::Webhook => {
            let url = config.webhook_url.trim();
            if url.is_empty() {
                return Err(SentinelError::InvalidConfig {
                    details: "sync.sink = \"webhook\" requires sync.webhook_url".to_string(),
                });
            }
            Ok(Some(Box::new(WebhookSink::new(
                url,
                Duration::from_secs(config.webhook_timeout_secs),
            ))))
        }
    }
}

// ──── Webhook (HTTP POST via curl) ────

/// POSTs the payload as JSON and reads the remote id from the response.
pub struct WebhookSink {
    url: String,
    timeout: Duration,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl ReportSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn submit(&self, payload: &BugReportPayload) -> Result<String> {
        let body = serde_json::to_vec(payload)?;
        let mut child = Command::new("curl")
            .arg("--silent")
            .arg("--show-error")
            .arg("--fail")
            .arg("--max-time")
            .arg(self.timeout.as_secs().max(1).to_string())
            .arg("--header")
            .arg("Content-Type: application/json")
            .arg("--data-binary")
            .arg("@-")
            .arg(&self.url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| sink_error("webhook", format!("cannot spawn curl: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&body) {
                drop(stdin);
                abandon(child);
                return Err(sink_error(
                    "webhook",
                    format!("cannot write request body: {e}"),
                ));
            }
        }
        let output = child
            .wait_with_output()
            .map_err(|e| sink_error("webhook", format!("curl did not finish: {e}")))?;

        if !output.status.success() {
            return Err(sink_error(
                "webhook",
                format!(
                    "curl exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        remote_id_from_response(&output.stdout)
    }
}

/// Kill and reap a child whose request could not be sent.
fn abandon(mut child: Child) -> Option<ExitStatus> {
    if let Err(e) = child.kill() {
        eprintln!("[SEN-SYNC] WARNING: cannot kill curl: {e}");
    }
    child.wait().ok()
}

/// Extract `id` or `number` from a JSON response body.
pub fn remote_id_from_response(body: &[u8]) -> Result<String> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| sink_error("webhook", format!("response is not JSON: {e}")))?;
    ["id", "number"]
        .iter()
        .find_map(|key| match value.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| sink_error("webhook", "response has no \"id\" or \"number\" field"))
}

// ──── File (append JSONL) ────

/// Appends one JSON line per report; the remote id is the line number.
pub struct FileSink {
    path: PathBuf,
    lines: Mutex<Option<u64>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: Mutex::new(None),
        }
    }
}

impl ReportSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn submit(&self, payload: &BugReportPayload) -> Result<String> {
        let mut lines = self.lines.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SentinelError::io(parent, e))?;
        }
        let count = match *lines {
            Some(n) => n,
            None => fs::read_to_string(&self.path)
                .map(|s| s.lines().count() as u64)
                .unwrap_or(0),
        };

        let mut line = serde_json::to_string(payload)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SentinelError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| SentinelError::io(&self.path, e))?;

        let id = count + 1;
        *lines = Some(id);
        Ok(format!("{}#{id}", self.path.display()))
    }
}

// ──── In-memory (tests) ────

/// Collects payloads in memory. Can be switched to fail for retry tests.
#[derive(Default)]
pub struct MemorySink {
    submitted: Mutex<Vec<BugReportPayload>>,
    failing: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn submitted(&self) -> Vec<BugReportPayload> {
        self.submitted.lock().clone()
    }
}

impl ReportSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn submit(&self, payload: &BugReportPayload) -> Result<String> {
        if *self.failing.lock() {
            return Err(sink_error("memory", "configured to fail"));
        }
        let mut submitted = self.submitted.lock();
        submitted.push(payload.clone());
        Ok(format!("mem-{}", submitted.len()))
    }
}

fn sink_error(sink: &'static str, details: impl Into<String>) -> SentinelError {
    SentinelError::Sink {
        sink,
        details: details.into(),
    }
}
