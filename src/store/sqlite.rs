//! Harness store: WAL-mode SQLite holding runs, subject statistics,
//! deduplicated violations and session metadata.
//!
//! One connection behind a mutex is shared by the monitor, the orchestrator and
//! the sync worker. Every multi-row mutation runs inside an IMMEDIATE
//! transaction so concurrent writers never interleave, and the run table is
//! bounded by FIFO eviction on insert.

#![allow(missing_docs)]

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};

use crate::core::errors::{Result, SentinelError};
use crate::invariants::{Category, Severity};
use crate::store::records::{RunOutcome, RunRecord, SubjectDelta, SubjectStats, ViolationRecord};

/// Default cap on persisted runs.
pub const DEFAULT_MAX_RUNS: usize = 500;

/// Metadata keys written by the session orchestrator.
pub mod meta_keys {
    pub const LAST_SESSION_ID: &str = "last_session_id";
    pub const LAST_SESSION_START: &str = "last_session_start";
    pub const LAST_SESSION_END: &str = "last_session_end";
    pub const LAST_RUN_COUNT: &str = "last_run_count";
}

/// Shared SQLite store.
pub struct HarnessStore {
    conn: Mutex<Connection>,
    path: PathBuf,
    max_runs: usize,
}

impl HarnessStore {
    /// Open (or create) the store at `path` with the default run cap.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_limit(path, DEFAULT_MAX_RUNS)
    }

    /// Open (or create) the store keeping at most `max_runs` run records.
    pub fn open_with_limit(path: &Path, max_runs: usize) -> Result<Self> {
        if max_runs == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "store.max_runs must be at least 1".to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SentinelError::StoreUnavailable {
                    path: path.to_path_buf(),
                    details: format!("cannot create {}: {e}", parent.display()),
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SentinelError::StoreUnavailable {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;

        let opened = apply_pragmas(&conn).and_then(|()| apply_schema(&conn));
        if let Err(err) = opened {
            return Err(SentinelError::StoreUnavailable {
                path: path.to_path_buf(),
                details: err.to_string(),
            });
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            max_runs,
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn max_runs(&self) -> usize {
        self.max_runs
    }

    /// Run `f` inside one IMMEDIATE transaction. Any error rolls back.
    pub fn atomically<T>(&self, f: impl FnOnce(&StoreTxn<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let outcome = (|| -> Result<T> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&StoreTxn {
                conn: &tx,
                max_runs: self.max_runs,
            })?;
            tx.commit()?;
            Ok(value)
        })();
        outcome.map_err(|err| self.locate(err))
    }

    /// Run a read-only query against the connection.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn).map_err(|err| self.locate(err))
    }

    fn locate(&self, err: SentinelError) -> SentinelError {
        match err {
            SentinelError::StoreUnavailable { path, details } if path.as_os_str().is_empty() => {
                SentinelError::StoreUnavailable {
                    path: self.path.clone(),
                    details,
                }
            }
            other => other,
        }
    }

    // ──────────────────── runs ────────────────────

    /// Persist a run and evict the oldest runs beyond the cap.
    ///
    /// Fingerprints with no committed violation record are dropped from the
    /// stored run. Returns the assigned run id.
    pub fn save_run(&self, run: &RunRecord) -> Result<i64> {
        self.atomically(|txn| txn.save_run(run))
    }

    pub fn run_count(&self) -> Result<u64> {
        self.read(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
            Ok(from_i64(n))
        })
    }

    /// Most recent runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, session_id, run_index, started_at, duration_ms, steps, outcome,
                        winner, participants, action_counts, violation_count, fingerprints
                 FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
            )?;
            let raw = stmt
                .query_map(params![to_i64(limit as u64)], RawRun::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            raw.into_iter().map(RawRun::decode).collect()
        })
    }

    /// Alias of [`recent_runs`](Self::recent_runs).
    pub fn get_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        self.recent_runs(limit)
    }

    /// Runs belonging to one session, oldest first.
    pub fn runs_for_session(&self, session_id: &str) -> Result<Vec<RunRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, session_id, run_index, started_at, duration_ms, steps, outcome,
                        winner, participants, action_counts, violation_count, fingerprints
                 FROM runs WHERE session_id = ?1 ORDER BY started_at ASC, id ASC",
            )?;
            let raw = stmt
                .query_map(params![session_id], RawRun::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            raw.into_iter().map(RawRun::decode).collect()
        })
    }

    /// Run counts keyed by outcome label.
    pub fn outcome_counts(&self) -> Result<BTreeMap<String, u64>> {
        self.read(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT outcome, COUNT(*) FROM runs GROUP BY outcome")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(|(k, n)| (k, from_i64(n))).collect())
        })
    }

    // ──────────────────── subject stats ────────────────────

    /// Apply additive deltas in one transaction.
    pub fn update_subject_stats(&self, deltas: &[SubjectDelta]) -> Result<()> {
        self.atomically(|txn| txn.update_subject_stats(deltas))
    }

    pub fn subject_stats(&self, subject_id: &str) -> Result<Option<SubjectStats>> {
        self.read(|conn| {
            let stats = conn
                .prepare_cached(
                    "SELECT subject_id, runs, wins, losses, draws, kills, deaths,
                            damage_dealt, win_rate
                     FROM subject_stats WHERE subject_id = ?1",
                )?
                .query_row(params![subject_id], subject_from_row)
                .optional()?;
            Ok(stats)
        })
    }

    /// Subjects ordered by win rate, then wins.
    pub fn subject_leaderboard(&self, limit: usize) -> Result<Vec<SubjectStats>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT subject_id, runs, wins, losses, draws, kills, deaths,
                        damage_dealt, win_rate
                 FROM subject_stats
                 ORDER BY win_rate DESC, wins DESC, subject_id ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![to_i64(limit as u64)], subject_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // ──────────────────── violations ────────────────────

    pub fn get_violation(&self, fingerprint: &str) -> Result<Option<ViolationRecord>> {
        self.read(|conn| get_violation_in(conn, fingerprint))
    }

    /// Insert or replace the record keyed by its fingerprint.
    pub fn upsert_violation(&self, record: &ViolationRecord) -> Result<()> {
        self.atomically(|txn| txn.upsert_violation(record))
    }

    /// All records, most frequent first, then most recently seen.
    pub fn get_all_violations(&self) -> Result<Vec<ViolationRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT fingerprint, kind, category, severity, message, first_seen, last_seen,
                        occurrence_count, samples, synced_to_remote, remote_id
                 FROM violations ORDER BY occurrence_count DESC, last_seen DESC, fingerprint ASC",
            )?;
            let raw = stmt
                .query_map([], RawViolation::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            raw.into_iter().map(RawViolation::decode).collect()
        })
    }

    /// Unsynced records with at least `min_occurrences` occurrences.
    pub fn get_unsynced(&self, min_occurrences: u64) -> Result<Vec<ViolationRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT fingerprint, kind, category, severity, message, first_seen, last_seen,
                        occurrence_count, samples, synced_to_remote, remote_id
                 FROM violations
                 WHERE synced_to_remote = 0 AND occurrence_count >= ?1
                 ORDER BY occurrence_count DESC, last_seen DESC, fingerprint ASC",
            )?;
            let raw = stmt
                .query_map(params![to_i64(min_occurrences)], RawViolation::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            raw.into_iter().map(RawViolation::decode).collect()
        })
    }

    /// Mark a record as reported. Touches only the sync columns.
    ///
    /// Returns `false` when no record has this fingerprint.
    pub fn mark_synced(&self, fingerprint: &str, remote_id: &str) -> Result<bool> {
        self.atomically(|txn| {
            let changed = txn
                .conn
                .prepare_cached(
                    "UPDATE violations SET synced_to_remote = 1, remote_id = ?2
                     WHERE fingerprint = ?1",
                )?
                .execute(params![fingerprint, remote_id])?;
            Ok(changed > 0)
        })
    }

    /// Record counts and occurrence totals keyed by severity label.
    pub fn violation_counts_by_severity(&self) -> Result<BTreeMap<String, (u64, u64)>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT severity, COUNT(*), COALESCE(SUM(occurrence_count), 0)
                 FROM violations GROUP BY severity",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows
                .into_iter()
                .map(|(sev, records, total)| (sev, (from_i64(records), from_i64(total))))
                .collect())
        })
    }

    // ──────────────────── metadata ────────────────────

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.atomically(|txn| txn.set_meta(key, value))
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.read(|conn| get_meta_in(conn, key))
    }

    /// All metadata pairs.
    pub fn all_meta(&self) -> Result<BTreeMap<String, String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached("SELECT key, value FROM metadata")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
            Ok(rows)
        })
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .lock()
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

// ──────────────────── transaction view ────────────────────

/// Operations available inside [`HarnessStore::atomically`].
pub struct StoreTxn<'a> {
    conn: &'a Connection,
    max_runs: usize,
}

impl StoreTxn<'_> {
    pub fn get_violation(&self, fingerprint: &str) -> Result<Option<ViolationRecord>> {
        get_violation_in(self.conn, fingerprint)
    }

    pub fn upsert_violation(&self, record: &ViolationRecord) -> Result<()> {
        let samples = serde_json::to_string(&record.samples)?;
        self.conn
            .prepare_cached(
                "INSERT INTO violations (
                    fingerprint, kind, category, severity, severity_rank, message,
                    first_seen, last_seen, occurrence_count, samples, synced_to_remote, remote_id
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
                ON CONFLICT(fingerprint) DO UPDATE SET
                    kind = excluded.kind,
                    category = excluded.category,
                    severity = excluded.severity,
                    severity_rank = excluded.severity_rank,
                    message = excluded.message,
                    first_seen = excluded.first_seen,
                    last_seen = excluded.last_seen,
                    occurrence_count = excluded.occurrence_count,
                    samples = excluded.samples,
                    synced_to_remote = excluded.synced_to_remote,
                    remote_id = excluded.remote_id",
            )?
            .execute(params![
                record.fingerprint,
                record.kind,
                record.category.as_str(),
                record.severity.as_str(),
                severity_rank(record.severity),
                record.message,
                record.first_seen.timestamp_millis(),
                record.last_seen.timestamp_millis(),
                to_i64(record.occurrence_count),
                samples,
                record.synced_to_remote,
                record.remote_id,
            ])?;
        Ok(())
    }

    pub fn save_run(&self, run: &RunRecord) -> Result<i64> {
        let mut known = Vec::with_capacity(run.fingerprints.len());
        {
            let mut exists = self
                .conn
                .prepare_cached("SELECT 1 FROM violations WHERE fingerprint = ?1")?;
            for fp in &run.fingerprints {
                if exists.exists(params![fp])? && !known.contains(fp) {
                    known.push(fp.clone());
                }
            }
        }

        self.conn
            .prepare_cached(
                "INSERT INTO runs (
                    session_id, run_index, started_at, duration_ms, steps, outcome, winner,
                    participants, action_counts, violation_count, fingerprints
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            )?
            .execute(params![
                run.session_id,
                to_i64(run.run_index),
                run.started_at.timestamp_millis(),
                to_i64(run.duration_ms),
                to_i64(run.steps),
                run.outcome.as_str(),
                run.winner,
                serde_json::to_string(&run.participants)?,
                serde_json::to_string(&run.action_counts)?,
                to_i64(run.violation_count),
                serde_json::to_string(&known)?,
            ])?;
        let id = self.conn.last_insert_rowid();

        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        let excess = from_i64(count).saturating_sub(self.max_runs as u64);
        if excess > 0 {
            self.conn
                .prepare_cached(
                    "DELETE FROM runs WHERE id IN (
                        SELECT id FROM runs ORDER BY started_at ASC, id ASC LIMIT ?1
                    )",
                )?
                .execute(params![to_i64(excess)])?;
        }
        Ok(id)
    }

    pub fn update_subject_stats(&self, deltas: &[SubjectDelta]) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO subject_stats (
                subject_id, runs, wins, losses, draws, kills, deaths, damage_dealt,
                win_rate, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,
                CAST(?3 AS REAL) / MAX(?2, 1), ?9)
            ON CONFLICT(subject_id) DO UPDATE SET
                runs = runs + excluded.runs,
                wins = wins + excluded.wins,
                losses = losses + excluded.losses,
                draws = draws + excluded.draws,
                kills = kills + excluded.kills,
                deaths = deaths + excluded.deaths,
                damage_dealt = damage_dealt + excluded.damage_dealt,
                win_rate = CAST(wins + excluded.wins AS REAL)
                    / MAX(runs + excluded.runs, 1),
                updated_at = excluded.updated_at",
        )?;
        for delta in deltas {
            stmt.execute(params![
                delta.subject_id,
                to_i64(delta.runs),
                to_i64(delta.wins),
                to_i64(delta.losses),
                to_i64(delta.draws),
                to_i64(delta.kills),
                to_i64(delta.deaths),
                to_i64(delta.damage_dealt),
                now,
            ])?;
        }
        Ok(())
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO metadata (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?
            .execute(params![key, value])?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        get_meta_in(self.conn, key)
    }
}

// ──────────────────── row decoding ────────────────────

struct RawViolation {
    fingerprint: String,
    kind: String,
    category: String,
    severity: String,
    message: String,
    first_seen: i64,
    last_seen: i64,
    occurrence_count: i64,
    samples: String,
    synced_to_remote: bool,
    remote_id: Option<String>,
}

impl RawViolation {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            fingerprint: row.get(0)?,
            kind: row.get(1)?,
            category: row.get(2)?,
            severity: row.get(3)?,
            message: row.get(4)?,
            first_seen: row.get(5)?,
            last_seen: row.get(6)?,
            occurrence_count: row.get(7)?,
            samples: row.get(8)?,
            synced_to_remote: row.get(9)?,
            remote_id: row.get(10)?,
        })
    }

    fn decode(self) -> Result<ViolationRecord> {
        let category =
            Category::parse(&self.category).ok_or_else(|| corrupt("category", &self.category))?;
        let severity =
            Severity::parse(&self.severity).ok_or_else(|| corrupt("severity", &self.severity))?;
        let samples: VecDeque<_> = serde_json::from_str(&self.samples)?;
        Ok(ViolationRecord {
            fingerprint: self.fingerprint,
            kind: self.kind,
            category,
            severity,
            message: self.message,
            first_seen: from_millis(self.first_seen),
            last_seen: from_millis(self.last_seen),
            occurrence_count: from_i64(self.occurrence_count),
            samples,
            synced_to_remote: self.synced_to_remote,
            remote_id: self.remote_id,
        })
    }
}

struct RawRun {
    id: i64,
    session_id: String,
    run_index: i64,
    started_at: i64,
    duration_ms: i64,
    steps: i64,
    outcome: String,
    winner: Option<String>,
    participants: String,
    action_counts: String,
    violation_count: i64,
    fingerprints: String,
}

impl RawRun {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            run_index: row.get(2)?,
            started_at: row.get(3)?,
            duration_ms: row.get(4)?,
            steps: row.get(5)?,
            outcome: row.get(6)?,
            winner: row.get(7)?,
            participants: row.get(8)?,
            action_counts: row.get(9)?,
            violation_count: row.get(10)?,
            fingerprints: row.get(11)?,
        })
    }

    fn decode(self) -> Result<RunRecord> {
        let outcome =
            RunOutcome::parse(&self.outcome).ok_or_else(|| corrupt("outcome", &self.outcome))?;
        Ok(RunRecord {
            id: Some(self.id),
            session_id: self.session_id,
            run_index: from_i64(self.run_index),
            started_at: from_millis(self.started_at),
            duration_ms: from_i64(self.duration_ms),
            steps: from_i64(self.steps),
            outcome,
            winner: self.winner,
            participants: serde_json::from_str(&self.participants)?,
            action_counts: serde_json::from_str(&self.action_counts)?,
            violation_count: from_i64(self.violation_count),
            fingerprints: serde_json::from_str(&self.fingerprints)?,
        })
    }
}

fn subject_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubjectStats> {
    Ok(SubjectStats {
        subject_id: row.get(0)?,
        runs: from_i64(row.get(1)?),
        wins: from_i64(row.get(2)?),
        losses: from_i64(row.get(3)?),
        draws: from_i64(row.get(4)?),
        kills: from_i64(row.get(5)?),
        deaths: from_i64(row.get(6)?),
        damage_dealt: from_i64(row.get(7)?),
        win_rate: row.get(8)?,
    })
}

fn get_violation_in(conn: &Connection, fingerprint: &str) -> Result<Option<ViolationRecord>> {
    let raw = conn
        .prepare_cached(
            "SELECT fingerprint, kind, category, severity, message, first_seen, last_seen,
                    occurrence_count, samples, synced_to_remote, remote_id
             FROM violations WHERE fingerprint = ?1",
        )?
        .query_row(params![fingerprint], RawViolation::from_row)
        .optional()?;
    raw.map(RawViolation::decode).transpose()
}

fn get_meta_in(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .prepare_cached("SELECT value FROM metadata WHERE key = ?1")?
        .query_row(params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

fn corrupt(column: &'static str, value: &str) -> SentinelError {
    SentinelError::Serialization {
        context: "store decode",
        details: format!("unrecognized {column} value {value:?}"),
    }
}

const fn severity_rank(severity: Severity) -> i64 {
    match severity {
        Severity::Low => 0,
        Severity::Medium => 1,
        Severity::High => 2,
        Severity::Critical => 3,
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_i64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[SEN-STORE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            run_index INTEGER NOT NULL,
            started_at INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            steps INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            winner TEXT,
            participants TEXT NOT NULL,
            action_counts TEXT NOT NULL,
            violation_count INTEGER NOT NULL DEFAULT 0,
            fingerprints TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS subject_stats (
            subject_id TEXT PRIMARY KEY,
            runs INTEGER NOT NULL DEFAULT 0,
            wins INTEGER NOT NULL DEFAULT 0,
            losses INTEGER NOT NULL DEFAULT 0,
            draws INTEGER NOT NULL DEFAULT 0,
            kills INTEGER NOT NULL DEFAULT 0,
            deaths INTEGER NOT NULL DEFAULT 0,
            damage_dealt INTEGER NOT NULL DEFAULT 0,
            win_rate REAL NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS violations (
            fingerprint TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            category TEXT NOT NULL,
            severity TEXT NOT NULL,
            severity_rank INTEGER NOT NULL,
            message TEXT NOT NULL,
            first_seen INTEGER NOT NULL,
            last_seen INTEGER NOT NULL,
            occurrence_count INTEGER NOT NULL,
            samples TEXT NOT NULL,
            synced_to_remote INTEGER NOT NULL DEFAULT 0,
            remote_id TEXT
        );

        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at, id);
        CREATE INDEX IF NOT EXISTS idx_runs_outcome ON runs(outcome);
        CREATE INDEX IF NOT EXISTS idx_runs_session ON runs(session_id);
        CREATE INDEX IF NOT EXISTS idx_subject_win_rate ON subject_stats(win_rate);
        CREATE INDEX IF NOT EXISTS idx_violations_count ON violations(occurrence_count);
        CREATE INDEX IF NOT EXISTS idx_violations_last_seen ON violations(last_seen);
        CREATE INDEX IF NOT EXISTS idx_violations_severity ON violations(severity_rank);
        CREATE INDEX IF NOT EXISTS idx_violations_unsynced
            ON violations(synced_to_remote, occurrence_count);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────
