//! Session aggregates and the end-of-session summary.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::RunOutcome;

/// Running totals for the active session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionTally {
    pub runs_completed: u64,
    pub wins_by_participant: BTreeMap<String, u64>,
    pub outcomes: BTreeMap<String, u64>,
    pub total_steps: u64,
    pub total_violations: u64,
    pub fastest_run_steps: Option<u64>,
    pub longest_run_steps: Option<u64>,
}

impl SessionTally {
    /// Fold one finished run into the totals.
    pub fn absorb(
        &mut self,
        outcome: RunOutcome,
        winner: Option<&str>,
        steps: u64,
        violations: u64,
    ) {
        self.runs_completed += 1;
        *self.outcomes.entry(outcome.as_str().to_string()).or_insert(0) += 1;
        if let (RunOutcome::Win, Some(winner)) = (outcome, winner) {
            *self.wins_by_participant.entry(winner.to_string()).or_insert(0) += 1;
        }
        self.total_steps += steps;
        self.total_violations += violations;
        self.fastest_run_steps = Some(self.fastest_run_steps.map_or(steps, |f| f.min(steps)));
        self.longest_run_steps = Some(self.longest_run_steps.map_or(steps, |l| l.max(steps)));
    }
}

/// Final report of one session, handed to the summary callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stop_reason: String,
    pub target_runs: Option<u64>,
    pub runs_completed: u64,
    pub wins_by_participant: BTreeMap<String, u64>,
    pub outcomes: BTreeMap<String, u64>,
    pub total_steps: u64,
    pub total_violations: u64,
    pub fastest_run_steps: Option<u64>,
    pub longest_run_steps: Option<u64>,
    pub internal_failures: u64,
    /// Store-unavailable failures; non-zero means results were lost.
    pub store_failures: u64,
}

impl SessionSummary {
    /// Mean steps per completed run.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_steps(&self) -> f64 {
        if self.runs_completed == 0 {
            0.0
        } else {
            self.total_steps as f64 / self.runs_completed as f64
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let target = self
            .target_runs
            .map_or_else(|| "unbounded".to_string(), |t| t.to_string());
        let _ = writeln!(out, "session {} ({})", self.session_id, self.stop_reason);
        let _ = writeln!(
            out,
            "  runs:       {} / {target} in {:.1}s",
            self.runs_completed,
            Seconds(self.duration_ms)
        );
        let _ = writeln!(
            out,
            "  steps:      {} total, {:.1} avg, fastest {}, longest {}",
            self.total_steps,
            self.average_steps(),
            opt(self.fastest_run_steps),
            opt(self.longest_run_steps)
        );
        let _ = writeln!(out, "  violations: {}", self.total_violations);
        for (outcome, n) in &self.outcomes {
            let _ = writeln!(out, "  outcome {outcome}: {n}");
        }
        for (who, wins) in &self.wins_by_participant {
            let _ = writeln!(out, "  wins {who}: {wins}");
        }
        let _ = write!(
            out,
            "  failures:   {} internal, {} store",
            self.internal_failures, self.store_failures
        );
        out
    }
}

struct Seconds(u64);

impl std::fmt::Display for Seconds {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&(self.0 as f64 / 1000.0), f)
    }
}

fn opt(v: Option<u64>) -> String {
    v.map_or_else(|| "-".to_string(), |n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_tracks_extremes_and_wins() {
        let mut tally = SessionTally::default();
        tally.absorb(RunOutcome::Win, Some("P1"), 40, 1);
        tally.absorb(RunOutcome::Draw, None, 12, 0);
        tally.absorb(RunOutcome::Win, Some("P1"), 90, 2);
        tally.absorb(RunOutcome::Timeout, Some("P2"), 200, 0);

        assert_eq!(tally.runs_completed, 4);
        assert_eq!(tally.wins_by_participant.get("P1"), Some(&2));
        assert!(!tally.wins_by_participant.contains_key("P2"));
        assert_eq!(tally.fastest_run_steps, Some(12));
        assert_eq!(tally.longest_run_steps, Some(200));
        assert_eq!(tally.total_steps, 342);
        assert_eq!(tally.total_violations, 3);
        assert_eq!(tally.outcomes.get("win"), Some(&2));
    }

    #[test]
    fn summary_renders_unbounded_target() {
        let now = Utc::now();
        let summary = SessionSummary {
            session_id: "s-1".to_string(),
            started_at: now,
            ended_at: now,
            duration_ms: 1500,
            stop_reason: "operator".to_string(),
            target_runs: None,
            runs_completed: 2,
            wins_by_participant: BTreeMap::new(),
            outcomes: BTreeMap::new(),
            total_steps: 30,
            total_violations: 0,
            fastest_run_steps: Some(10),
            longest_run_steps: Some(20),
            internal_failures: 0,
            store_failures: 0,
        };
        let text = summary.render();
        assert!(text.contains("2 / unbounded in 1.5s"));
        assert!(text.contains("15.0 avg"));
        assert!((summary.average_steps() - 15.0).abs() < f64::EPSILON);
    }
}
