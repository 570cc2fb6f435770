//! Reports: violations enriched with the run context they were detected in.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::invariants::{Category, Severity};

/// Serializable description of one subject action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSummary {
    /// Short stable label such as `play_card`.
    pub label: String,
    /// Bucket used for per-run action counts.
    pub category: String,
    /// Full action payload.
    pub payload: Value,
}

/// One entry in the monitor's recent-action ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: u64,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub action: ActionSummary,
    pub at: DateTime<Utc>,
}

/// A detected violation with everything an operator needs to triage it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub fingerprint: String,
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    pub details: BTreeMap<String, Value>,
    pub invariant: String,
    pub category: Category,
    pub step: u64,
    pub phase: String,
    /// Participant that took the action, when the driver names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub action: Option<ActionSummary>,
    pub state_diff: Vec<String>,
    pub recent_actions: Vec<HistoryEntry>,
    pub fix_hint: String,
    pub session_id: Option<String>,
    pub run_index: u64,
    pub detected_at: DateTime<Utc>,
    /// The before or after snapshot used the serialization fallback.
    #[serde(default)]
    pub degraded_snapshot: bool,
    /// Set once the report has been registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_count: Option<u64>,
}

impl Report {
    /// Multi-line operator view shown when the harness pauses.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "[{}] {} ({}): {}",
            self.severity.as_str().to_ascii_uppercase(),
            self.kind,
            self.category,
            self.message
        );
        let _ = writeln!(out, "  invariant:   {}", self.invariant);
        let _ = writeln!(out, "  fingerprint: {}", self.fingerprint);
        if let Some(count) = self.occurrence_count {
            let _ = writeln!(out, "  occurrences: {count}");
        }
        match &self.actor {
            Some(actor) => {
                let _ = writeln!(
                    out,
                    "  step {} · phase {} · actor {actor}",
                    self.step, self.phase
                );
            }
            None => {
                let _ = writeln!(out, "  step {} · phase {}", self.step, self.phase);
            }
        }
        if let Some(action) = &self.action {
            let _ = writeln!(out, "  action:      {} {}", action.label, action.payload);
        }
        if !self.details.is_empty() {
            let _ = writeln!(out, "  details:");
            for (key, value) in &self.details {
                let _ = writeln!(out, "    {key} = {value}");
            }
        }
        if !self.state_diff.is_empty() {
            let _ = writeln!(out, "  state diff:");
            for line in &self.state_diff {
                let _ = writeln!(out, "    {line}");
            }
        }
        if !self.recent_actions.is_empty() {
            let _ = writeln!(out, "  recent actions:");
            for entry in &self.recent_actions {
                let actor = entry
                    .actor
                    .as_deref()
                    .map_or_else(String::new, |a| format!(" {a}:"));
                let _ = writeln!(
                    out,
                    "    #{} [{}]{actor} {}",
                    entry.step, entry.phase, entry.action.label
                );
            }
        }
        let _ = write!(out, "  fix hint:    {}", self.fix_hint);
        out
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_triage_fields() {
        let mut report = fixtures::report("zombie-entity", "zombie-entity:00ff");
        report.details.insert("hp".to_string(), Value::from(-3));
        report.state_diff = vec!["players[P2].board size: 1 → 1".to_string()];
        report.occurrence_count = Some(4);
        report.actor = Some("P2".to_string());
        report.recent_actions = vec![HistoryEntry {
            step: 1,
            phase: "combat".to_string(),
            actor: Some("P1".to_string()),
            action: ActionSummary {
                label: "attack".to_string(),
                category: "combat".to_string(),
                payload: Value::Null,
            },
            at: Utc::now(),
        }];

        let text = report.render();
        assert!(text.contains("[HIGH] zombie-entity"));
        assert!(text.contains("occurrences: 4"));
        assert!(text.contains("hp = -3"));
        assert!(text.contains("players[P2].board"));
        assert!(text.contains("phase main · actor P2"));
        assert!(text.contains("#1 [combat] P1: attack"));
        assert!(text.ends_with("fix it"));
    }

    #[test]
    fn occurrence_count_omitted_until_registered() {
        let report = fixtures::report("turn-skipped", "turn-skipped:01");
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("occurrence_count"));
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
