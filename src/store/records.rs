//! Persisted record types.

#![allow(missing_docs)]

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::invariants::{Category, Severity};
use crate::violations::report::Report;

/// Terminal outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Win,
    Draw,
    /// Hit the step bound without a winner.
    Timeout,
    /// Stopped before reaching a terminal state.
    Aborted,
}

impl RunOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Draw => "draw",
            Self::Timeout => "timeout",
            Self::Aborted => "aborted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "win" => Some(Self::Win),
            "draw" => Some(Self::Draw),
            "timeout" => Some(Self::Timeout),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-participant statistics for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub subject_id: String,
    pub won: bool,
    pub kills: u64,
    pub deaths: u64,
    pub damage_dealt: u64,
    pub final_health: i64,
}

/// One completed run. Immutable once saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Assigned by the store.
    pub id: Option<i64>,
    pub session_id: String,
    pub run_index: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: u64,
    pub outcome: RunOutcome,
    pub winner: Option<String>,
    pub participants: Vec<ParticipantSummary>,
    pub action_counts: BTreeMap<String, u64>,
    pub violation_count: u64,
    /// Violation fingerprints observed during the run.
    pub fingerprints: Vec<String>,
}

/// Aggregated counters for one tracked subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectStats {
    pub subject_id: String,
    pub runs: u64,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub kills: u64,
    pub deaths: u64,
    pub damage_dealt: u64,
    pub win_rate: f64,
}

/// One run's contribution to a subject's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDelta {
    pub subject_id: String,
    pub runs: u64,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub kills: u64,
    pub deaths: u64,
    pub damage_dealt: u64,
}

impl SubjectDelta {
    /// Counters contributed by `participant` in a run that ended with `outcome`.
    pub fn from_participant(participant: &ParticipantSummary, outcome: RunOutcome) -> Self {
        let decided = outcome == RunOutcome::Win;
        Self {
            subject_id: participant.subject_id.clone(),
            runs: 1,
            wins: u64::from(decided && participant.won),
            losses: u64::from(decided && !participant.won),
            draws: u64::from(outcome == RunOutcome::Draw),
            kills: participant.kills,
            deaths: participant.deaths,
            damage_dealt: participant.damage_dealt,
        }
    }

    /// Deltas for every participant of a run.
    pub fn for_run(record: &RunRecord) -> Vec<Self> {
        record
            .participants
            .iter()
            .map(|p| Self::from_participant(p, record.outcome))
            .collect()
    }
}

/// Persisted, deduplicated violation keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub fingerprint: String,
    pub kind: String,
    pub category: Category,
    pub severity: Severity,
    /// Message of the most recent occurrence.
    pub message: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrence_count: u64,
    /// Most recent sample reports, oldest first.
    pub samples: VecDeque<Report>,
    pub synced_to_remote: bool,
    pub remote_id: Option<String>,
}

impl ViolationRecord {
    /// Record for the first occurrence of a fingerprint.
    pub fn first(report: &Report) -> Self {
        let mut sample = report.clone();
        sample.occurrence_count = Some(1);
        Self {
            fingerprint: report.fingerprint.clone(),
            kind: report.kind.clone(),
            category: report.category,
            severity: report.severity,
            message: report.message.clone(),
            first_seen: report.detected_at,
            last_seen: report.detected_at,
            occurrence_count: 1,
            samples: VecDeque::from([sample]),
            synced_to_remote: false,
            remote_id: None,
        }
    }

    /// Fold a recurrence into the record. The sample ring keeps at most
    /// `sample_capacity` reports.
    pub fn absorb(&mut self, report: &Report, sample_capacity: usize) {
        self.occurrence_count += 1;
        self.last_seen = self.last_seen.max(report.detected_at);
        self.message.clone_from(&report.message);
        self.severity = self.severity.max(report.severity);

        let mut sample = report.clone();
        sample.occurrence_count = Some(self.occurrence_count);
        self.samples.push_back(sample);
        while self.samples.len() > sample_capacity.max(1) {
            self.samples.pop_front();
        }
    }

    /// The newest sample report.
    pub fn latest_sample(&self) -> Option<&Report> {
        self.samples.back()
    }
}
