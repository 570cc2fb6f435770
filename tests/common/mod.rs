#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use invariant_sentinel::core::config::Config;
use invariant_sentinel::invariants::{Category, Invariant, InvariantRegistry, Severity, Violation};
use invariant_sentinel::monitor::ActionLike;
use invariant_sentinel::session::{Concludable, RunConclusion};
use invariant_sentinel::snapshot::Capture;
use invariant_sentinel::store::{HarnessStore, RunOutcome};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_sentinel") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "sentinel.exe" } else { "sentinel" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve sentinel binary path for integration test"),
    }
}

/// Write a config whose store and logs live under `dir`.
pub fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("sentinel.toml");
    let body = format!(
        "[paths]\nsqlite_db = {:?}\njsonl_log = {:?}\n\n[session]\nsettle_delay_ms = 0\n",
        dir.join("sentinel.sqlite3").display().to_string(),
        dir.join("activity.jsonl").display().to_string(),
    );
    fs::write(&path, body).expect("write test config");
    path
}

/// Run the CLI with `HOME` pointed at `home` so nothing escapes the sandbox.
pub fn run_cli(home: &Path, args: &[&str]) -> CmdResult {
    let output = Command::new(resolve_bin_path())
        .args(args)
        .env("HOME", home)
        .env("SENTINEL_OUTPUT_FORMAT", "json")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute sentinel command");

    CmdResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

/// Minimal subject: a counter the driver adds to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    pub value: i64,
}

impl Capture for Counter {
    fn try_deep_copy(&self) -> Option<Self> {
        Some(self.clone())
    }
}

impl Concludable for Counter {
    fn conclude(&self) -> RunConclusion {
        RunConclusion::new(RunOutcome::Draw)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Add(pub i64);

impl ActionLike for Add {
    fn label(&self) -> String {
        "add".to_string()
    }
}

/// `value` must stay within `[0, 10]`.
pub fn bounded_counter_invariants() -> InvariantRegistry<Counter, Add> {
    let mut reg = InvariantRegistry::new();
    reg.register(Invariant::absolute(
        "counter-in-range",
        Category::StateCorruption,
        |c: &Counter| {
            Ok(if (0..=10).contains(&c.value) {
                Vec::new()
            } else {
                vec![
                    Violation::new(
                        "counter-out-of-range",
                        Severity::High,
                        format!("counter is {}", c.value),
                    )
                    .identifying("bound", if c.value < 0 { "lower" } else { "upper" })
                    .detail("value", c.value),
                ]
            })
        },
    ))
    .expect("register counter invariant");
    reg
}

pub fn temp_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.paths.sqlite_db = dir.path().join("harness.sqlite3");
    config.paths.jsonl_log = dir.path().join("activity.jsonl");
    config.sync.file_path = dir.path().join("synced.jsonl");
    config.session.settle_delay_ms = 0;
    config
}

pub fn temp_store(dir: &tempfile::TempDir) -> Arc<HarnessStore> {
    Arc::new(HarnessStore::open(&dir.path().join("harness.sqlite3")).expect("open store"))
}
