//! Bug-report payload handed to report sinks.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::invariants::{Category, Severity};
use crate::store::ViolationRecord;
use crate::violations::Report;

/// One deduplicated defect, ready for an external tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugReportPayload {
    pub fingerprint: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub bug_type: String,
    pub category: Category,
    pub severity: Severity,
    pub occurrence_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sample: Option<Report>,
    pub details: BTreeMap<String, Value>,
}

impl BugReportPayload {
    pub fn from_record(record: &ViolationRecord) -> Self {
        let sample = record.latest_sample().cloned();
        let details = sample
            .as_ref()
            .map(|s| s.details.clone())
            .unwrap_or_default();
        let description = sample.as_ref().map_or_else(
            || record.message.clone(),
            |s| format!("{}\n\n{}", record.message, s.render()),
        );
        Self {
            fingerprint: record.fingerprint.clone(),
            title: format!(
                "[{}] {}: {} (x{})",
                record.severity, record.kind, record.message, record.occurrence_count
            ),
            description,
            bug_type: record.kind.clone(),
            category: record.category,
            severity: record.severity,
            occurrence_count: record.occurrence_count,
            first_seen: record.first_seen,
            last_seen: record.last_seen,
            sample,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violations::report::fixtures;

    #[test]
    fn payload_carries_latest_sample_and_details() {
        let mut first = fixtures::report("zombie-entity", "zombie-entity:01");
        first.details.insert("zone".to_string(), Value::from("board"));
        let mut record = ViolationRecord::first(&first);
        let mut second = first.clone();
        second.step = 9;
        record.absorb(&second, 5);

        let payload = BugReportPayload::from_record(&record);
        assert_eq!(payload.occurrence_count, 2);
        assert_eq!(payload.bug_type, "zombie-entity");
        assert_eq!(payload.sample.as_ref().unwrap().step, 9);
        assert_eq!(payload.details.get("zone"), Some(&Value::from("board")));
        assert!(payload.title.contains("(x2)"));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "zombie-entity");
    }
}
