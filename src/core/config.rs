//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SentinelError};

/// Full sentinel configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub session: SessionConfig,
    pub paths: PathsConfig,
}

/// Run monitor knobs: history windows and report shaping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Actions retained in the monitor's history ring.
    pub history_capacity: usize,
    /// Most recent actions copied into each report.
    pub report_history_window: usize,
    /// Sample reports retained per violation record.
    pub sample_capacity: usize,
    /// Maximum diff lines attached to a report.
    pub diff_line_cap: usize,
    /// Start in unattended (never-pause) mode.
    pub unattended: bool,
}

/// Bounded store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Run records retained before FIFO eviction.
    pub max_runs: usize,
}

/// Which reporting collaborator receives synced violations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    None,
    File,
    Webhook,
}

/// Background sync to the remote reporting collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Occurrences a violation needs before the periodic pass submits it.
    pub min_occurrences: u64,
    /// Occurrence count at which a violation is submitted immediately.
    pub immediate_threshold: u64,
    pub sink: SinkKind,
    pub webhook_url: String,
    /// Seconds before a webhook submission is abandoned.
    pub webhook_timeout_secs: u64,
    pub file_path: PathBuf,
}

/// Multi-run session defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause between one run ending and the next being requested.
    pub settle_delay_ms: u64,
    /// Default target run count; `None` runs until stopped.
    pub target_runs: Option<u64>,
    /// Safety bound on actions in a single run before it is declared a timeout.
    pub max_steps_per_run: u64,
}

/// Filesystem paths used by the sentinel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub sqlite_db: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            report_history_window: 10,
            sample_capacity: 5,
            diff_line_cap: 25,
            unattended: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_runs: 500 }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 30,
            min_occurrences: 2,
            immediate_threshold: 3,
            sink: SinkKind::None,
            webhook_url: String::new(),
            webhook_timeout_secs: 10,
            file_path: data_dir().join("synced-violations.jsonl"),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
            target_runs: None,
            max_steps_per_run: 2_000,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = home_dir();
        Self {
            config_file: home_dir.join(".config").join("sentinel").join("config.toml"),
            sqlite_db: data_dir().join("sentinel.sqlite3"),
            jsonl_log: data_dir().join("activity.jsonl"),
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[SEN-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("sentinel")
}

impl SyncConfig {
    /// Periodic sync interval as a `Duration`.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl SessionConfig {
    /// Settle delay as a `Duration`.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| SentinelError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(SentinelError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // monitor
        set_usize(
            &mut lookup,
            "SENTINEL_MONITOR_HISTORY_CAPACITY",
            &mut self.monitor.history_capacity,
        )?;
        set_usize(
            &mut lookup,
            "SENTINEL_MONITOR_REPORT_HISTORY_WINDOW",
            &mut self.monitor.report_history_window,
        )?;
        set_usize(
            &mut lookup,
            "SENTINEL_MONITOR_SAMPLE_CAPACITY",
            &mut self.monitor.sample_capacity,
        )?;
        set_usize(
            &mut lookup,
            "SENTINEL_MONITOR_DIFF_LINE_CAP",
            &mut self.monitor.diff_line_cap,
        )?;
        set_bool(
            &mut lookup,
            "SENTINEL_MONITOR_UNATTENDED",
            &mut self.monitor.unattended,
        )?;

        // store
        set_usize(&mut lookup, "SENTINEL_STORE_MAX_RUNS", &mut self.store.max_runs)?;

        // sync
        set_bool(&mut lookup, "SENTINEL_SYNC_ENABLED", &mut self.sync.enabled)?;
        set_u64(
            &mut lookup,
            "SENTINEL_SYNC_INTERVAL_SECS",
            &mut self.sync.interval_secs,
        )?;
        set_u64(
            &mut lookup,
            "SENTINEL_SYNC_MIN_OCCURRENCES",
            &mut self.sync.min_occurrences,
        )?;
        set_u64(
            &mut lookup,
            "SENTINEL_SYNC_IMMEDIATE_THRESHOLD",
            &mut self.sync.immediate_threshold,
        )?;
        if let Some(raw) = lookup("SENTINEL_SYNC_SINK") {
            self.sync.sink = parse_sink_kind(&raw)?;
        }
        if let Some(raw) = lookup("SENTINEL_SYNC_WEBHOOK_URL") {
            self.sync.webhook_url = raw;
        }
        if let Some(raw) = lookup("SENTINEL_SYNC_FILE_PATH") {
            self.sync.file_path = PathBuf::from(raw);
        }

        // session
        set_u64(
            &mut lookup,
            "SENTINEL_SESSION_SETTLE_DELAY_MS",
            &mut self.session.settle_delay_ms,
        )?;
        if let Some(raw) = lookup("SENTINEL_SESSION_TARGET_RUNS") {
            self.session.target_runs = if raw.eq_ignore_ascii_case("unbounded") {
                None
            } else {
                Some(parse_u64("SENTINEL_SESSION_TARGET_RUNS", &raw)?)
            };
        }
        set_u64(
            &mut lookup,
            "SENTINEL_SESSION_MAX_STEPS_PER_RUN",
            &mut self.session.max_steps_per_run,
        )?;

        // paths
        if let Some(raw) = lookup("SENTINEL_SQLITE_DB") {
            self.paths.sqlite_db = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SENTINEL_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.monitor.history_capacity == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "monitor.history_capacity must be >= 1".to_string(),
            });
        }
        if self.monitor.report_history_window > self.monitor.history_capacity {
            return Err(SentinelError::InvalidConfig {
                details: format!(
                    "monitor.report_history_window ({}) must be <= monitor.history_capacity ({})",
                    self.monitor.report_history_window, self.monitor.history_capacity
                ),
            });
        }
        if self.monitor.sample_capacity == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "monitor.sample_capacity must be >= 1".to_string(),
            });
        }
        if self.store.max_runs == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "store.max_runs must be >= 1".to_string(),
            });
        }
        if self.sync.interval_secs == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "sync.interval_secs must be > 0".to_string(),
            });
        }
        if self.sync.min_occurrences == 0 || self.sync.immediate_threshold == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "sync.min_occurrences and sync.immediate_threshold must be >= 1"
                    .to_string(),
            });
        }
        if self.sync.enabled
            && self.sync.sink == SinkKind::Webhook
            && self.sync.webhook_url.is_empty()
        {
            return Err(SentinelError::InvalidConfig {
                details: "sync.webhook_url is required when sync.sink = \"webhook\"".to_string(),
            });
        }
        if self.session.target_runs == Some(0) {
            return Err(SentinelError::InvalidConfig {
                details: "session.target_runs must be >= 1 (omit it for unbounded sessions)"
                    .to_string(),
            });
        }
        if self.session.max_steps_per_run == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "session.max_steps_per_run must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_u64<F>(lookup: &mut F, name: &str, slot: &mut u64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_u64(name, &raw)?;
    }
    Ok(())
}

fn set_usize<F>(lookup: &mut F, name: &str, slot: &mut usize) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw
            .parse::<usize>()
            .map_err(|error| SentinelError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

fn set_bool<F>(lookup: &mut F, name: &str, slot: &mut bool) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw
            .parse::<bool>()
            .map_err(|error| SentinelError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

fn parse_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|error| SentinelError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_sink_kind(raw: &str) -> Result<SinkKind> {
    match raw.to_ascii_lowercase().as_str() {
        "none" => Ok(SinkKind::None),
        "file" => Ok(SinkKind::File),
        "webhook" => Ok(SinkKind::Webhook),
        other => Err(SentinelError::ConfigParse {
            context: "env",
            details: format!("SENTINEL_SYNC_SINK={other:?}: expected none, file or webhook"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, SentinelError, SinkKind};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.store.max_runs, 500);
        assert_eq!(cfg.sync.interval_secs, 30);
        assert_eq!(cfg.sync.immediate_threshold, 3);
        assert_eq!(cfg.monitor.history_capacity, 50);
        assert_eq!(cfg.monitor.report_history_window, 10);
        assert_eq!(cfg.monitor.sample_capacity, 5);
    }

    #[test]
    fn report_window_larger_than_history_rejected() {
        let mut cfg = Config::default();
        cfg.monitor.report_history_window = cfg.monitor.history_capacity + 1;
        let err = cfg.validate().expect_err("expected window error");
        assert!(err.to_string().contains("report_history_window"));
    }

    #[test]
    fn zero_max_runs_rejected() {
        let mut cfg = Config::default();
        cfg.store.max_runs = 0;
        let err = cfg.validate().expect_err("expected max_runs error");
        assert!(err.to_string().contains("max_runs"));
    }

    #[test]
    fn webhook_sink_requires_url() {
        let mut cfg = Config::default();
        cfg.sync.enabled = true;
        cfg.sync.sink = SinkKind::Webhook;
        let err = cfg.validate().expect_err("expected webhook url error");
        assert!(err.to_string().contains("webhook_url"));

        cfg.sync.webhook_url = "https://example.invalid/hook".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_target_runs_rejected() {
        let mut cfg = Config::default();
        cfg.session.target_runs = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("SENTINEL_STORE_MAX_RUNS", "42"),
            ("SENTINEL_MONITOR_UNATTENDED", "true"),
            ("SENTINEL_SYNC_SINK", "file"),
            ("SENTINEL_SESSION_TARGET_RUNS", "7"),
            ("SENTINEL_SQLITE_DB", "/tmp/sentinel/test.sqlite3"),
        ]);
        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("overrides should parse");

        assert_eq!(cfg.store.max_runs, 42);
        assert!(cfg.monitor.unattended);
        assert_eq!(cfg.sync.sink, SinkKind::File);
        assert_eq!(cfg.session.target_runs, Some(7));
        assert_eq!(
            cfg.paths.sqlite_db,
            PathBuf::from("/tmp/sentinel/test.sqlite3")
        );
    }

    #[test]
    fn env_unbounded_target_clears_limit() {
        let mut cfg = Config::default();
        cfg.session.target_runs = Some(10);
        let overrides = vars(&[("SENTINEL_SESSION_TARGET_RUNS", "unbounded")]);
        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("overrides should parse");
        assert_eq!(cfg.session.target_runs, None);
    }

    #[test]
    fn env_invalid_values_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("SENTINEL_MONITOR_UNATTENDED", "yes-please")]);
        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("invalid bool should fail");
        match err {
            SentinelError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("SENTINEL_MONITOR_UNATTENDED"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let overrides = vars(&[("SENTINEL_SYNC_SINK", "carrier-pigeon")]);
        assert!(
            cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
                .is_err()
        );
    }

    #[test]
    fn toml_round_trip_preserves_sections() {
        let raw = r#"
            [monitor]
            unattended = true
            sample_capacity = 3

            [store]
            max_runs = 20

            [sync]
            enabled = true
            sink = "file"
        "#;
        let cfg: Config = toml::from_str(raw).expect("parse");
        assert!(cfg.monitor.unattended);
        assert_eq!(cfg.monitor.sample_capacity, 3);
        assert_eq!(cfg.monitor.history_capacity, 50);
        assert_eq!(cfg.store.max_runs, 20);
        assert_eq!(cfg.sync.sink, SinkKind::File);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/sentinel/config.toml")));
        assert!(matches!(result, Err(SentinelError::MissingConfig { .. })));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store]\nmax_runs = 9\n").unwrap();
        let cfg = Config::load(Some(&path)).expect("load");
        assert_eq!(cfg.store.max_runs, 9);
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let cfg = Config::default();
        let before = cfg.stable_hash().expect("hash");
        assert_eq!(before, cfg.stable_hash().expect("hash"));
        let mut modified = Config::default();
        modified.store.max_runs += 1;
        assert_ne!(before, modified.stable_hash().expect("hash"));
    }
}
