//! Violation values produced by invariant predicates.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Violation severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Defect class an invariant guards against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// State that no valid history can produce.
    StateCorruption,
    /// An action that the rules should have refused or shaped differently.
    RuleViolation,
    /// Quantities that must be preserved across actions.
    Conservation,
    /// Failures of the harness itself.
    Harness,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StateCorruption => "state_corruption",
            Self::RuleViolation => "rule_violation",
            Self::Conservation => "conservation",
            Self::Harness => "harness",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "state_corruption" => Some(Self::StateCorruption),
            "rule_violation" => Some(Self::RuleViolation),
            "conservation" => Some(Self::Conservation),
            "harness" => Some(Self::Harness),
            _ => None,
        }
    }

    /// Generic remediation advice when no kind-specific hint is registered.
    pub const fn default_hint(self) -> &'static str {
        match self {
            Self::StateCorruption => {
                "Find the mutation that produced this state; check cleanup paths that run after the value changed."
            }
            Self::RuleViolation => {
                "Check the rule guard for this action; the engine accepted or applied it when it should not have."
            }
            Self::Conservation => {
                "Trace where the quantity is created or destroyed; every move between zones must be paired."
            }
            Self::Harness => "Inspect the harness log; this is a monitoring failure, not a subject defect.",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single broken property found by one predicate invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Stable identifier, e.g. `zombie-entity`.
    pub kind: String,
    pub severity: Severity,
    /// Human-readable message with the concrete values.
    pub message: String,
    /// Named diagnostic values (`expected`, `actual`, entity names, ...).
    pub details: BTreeMap<String, Value>,
    /// Detail keys that identify the class of defect. Empty means the
    /// fingerprinter picks stable keys itself.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub identity: BTreeSet<String>,
}

impl Violation {
    pub fn new(kind: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity,
            message: message.into(),
            details: BTreeMap::new(),
            identity: BTreeSet::new(),
        }
    }

    /// Attach a diagnostic value.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach a diagnostic value that also identifies the defect class.
    #[must_use]
    pub fn identifying(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        self.details.insert(key.clone(), value.into());
        self.identity.insert(key);
        self
    }
}
