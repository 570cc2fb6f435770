//! Stats query engine: aggregation over the harness store for the `stats`
//! command and the harness statistics view.
//!
//! A read-only view; every query borrows the store's connection.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::errors::Result;
use crate::store::records::SubjectStats;
use crate::store::sqlite::HarnessStore;

/// Default number of rows in ranked listings.
pub const DEFAULT_TOP_N: usize = 10;

/// Aggregates over persisted runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub total_runs: u64,
    pub outcomes: BTreeMap<String, u64>,
    pub avg_steps: f64,
    pub avg_duration_ms: f64,
    pub max_steps: u64,
    pub violations_in_runs: u64,
}

/// Aggregates over deduplicated violation records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViolationStats {
    pub records: u64,
    pub occurrences: u64,
    pub unsynced: u64,
    /// severity label -> (records, occurrences)
    pub by_severity: BTreeMap<String, (u64, u64)>,
}

/// One row of the most-frequent-violations listing.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationDigest {
    pub fingerprint: String,
    pub kind: String,
    pub severity: String,
    pub occurrence_count: u64,
    pub last_seen: String,
    pub synced: bool,
}

/// Everything the store knows, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct FullStatistics {
    pub runs: RunStats,
    pub violations: ViolationStats,
    pub top_violations: Vec<ViolationDigest>,
    pub leaderboard: Vec<SubjectStats>,
    pub metadata: BTreeMap<String, String>,
}

/// Read-only statistics view over a [`HarnessStore`].
pub struct StatsEngine<'a> {
    store: &'a HarnessStore,
}

impl<'a> StatsEngine<'a> {
    pub fn new(store: &'a HarnessStore) -> Self {
        Self { store }
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn run_stats(&self) -> Result<RunStats> {
        let (total, avg_steps, avg_duration, max_steps, violations): (i64, f64, f64, i64, i64) =
            self.store.read(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*),
                            COALESCE(AVG(steps), 0),
                            COALESCE(AVG(duration_ms), 0),
                            COALESCE(MAX(steps), 0),
                            COALESCE(SUM(violation_count), 0)
                     FROM runs",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
                )?)
            })?;
        Ok(RunStats {
            total_runs: total.max(0) as u64,
            outcomes: self.store.outcome_counts()?,
            avg_steps,
            avg_duration_ms: avg_duration,
            max_steps: max_steps.max(0) as u64,
            violations_in_runs: violations.max(0) as u64,
        })
    }

    #[allow(clippy::cast_sign_loss)]
    pub fn violation_stats(&self) -> Result<ViolationStats> {
        let (records, occurrences, unsynced): (i64, i64, i64) = self.store.read(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(occurrence_count), 0),
                        COALESCE(SUM(CASE WHEN synced_to_remote = 0 THEN 1 ELSE 0 END), 0)
                 FROM violations",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?)
        })?;
        Ok(ViolationStats {
            records: records.max(0) as u64,
            occurrences: occurrences.max(0) as u64,
            unsynced: unsynced.max(0) as u64,
            by_severity: self.store.violation_counts_by_severity()?,
        })
    }

    /// The `n` most frequent defect classes.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn top_violations(&self, n: usize) -> Result<Vec<ViolationDigest>> {
        self.store.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT fingerprint, kind, severity, occurrence_count, last_seen, synced_to_remote
                 FROM violations
                 ORDER BY occurrence_count DESC, last_seen DESC, fingerprint ASC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([n as i64], |row| {
                    let last_seen: i64 = row.get(4)?;
                    Ok(ViolationDigest {
                        fingerprint: row.get(0)?,
                        kind: row.get(1)?,
                        severity: row.get(2)?,
                        occurrence_count: row.get::<_, i64>(3)?.max(0) as u64,
                        last_seen: chrono::DateTime::from_timestamp_millis(last_seen)
                            .unwrap_or_default()
                            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                        synced: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn full(&self) -> Result<FullStatistics> {
        Ok(FullStatistics {
            runs: self.run_stats()?,
            violations: self.violation_stats()?,
            top_violations: self.top_violations(DEFAULT_TOP_N)?,
            leaderboard: self.store.subject_leaderboard(DEFAULT_TOP_N)?,
            metadata: self.store.all_meta()?,
        })
    }

    /// Full statistics as JSON for agent consumption.
    pub fn export_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.full()?)?)
    }
}
