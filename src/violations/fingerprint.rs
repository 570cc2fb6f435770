//! Deterministic violation fingerprints.
//!
//! A fingerprint names the *class* of a defect: `kind` plus the details that
//! stay the same every time the same bug recurs. It is a pure function of those
//! inputs, hashed with SHA-256, so it is identical across process restarts.
//!
//! Stable-detail selection:
//! 1. If the violation declares identity keys, exactly those are used.
//! 2. Otherwise every string or boolean detail whose key is not volatile.
//!    Numbers are instance magnitudes (`expected`, `actual`, `hp`) and are
//!    left out, as are timestamps, session/run/seed identifiers, step counters
//!    and per-entity ids.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::core::errors::{Result, SentinelError};
use crate::invariants::Violation;

/// Detail keys that vary between occurrences of the same defect.
pub const DEFAULT_VOLATILE_PATTERN: &str = r"(?i)(^|_)(ts|timestamp|time|date|at|session|run|seed|step|turn|uuid|nonce|id|ids)$|^(session|run|seed)_";

/// Computes fingerprints with a configurable volatile-key pattern.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    volatile: Regex,
}

impl Fingerprinter {
    pub fn new() -> Result<Self> {
        Self::with_volatile_pattern(DEFAULT_VOLATILE_PATTERN)
    }

    pub fn with_volatile_pattern(pattern: &str) -> Result<Self> {
        let volatile = Regex::new(pattern).map_err(|e| SentinelError::InvalidConfig {
            details: format!("volatile detail pattern {pattern:?} does not compile: {e}"),
        })?;
        Ok(Self { volatile })
    }

    /// Whether a detail key is excluded from default identity selection.
    pub fn is_volatile(&self, key: &str) -> bool {
        self.volatile.is_match(key)
    }

    /// The details that participate in the fingerprint.
    pub fn stable_details<'a>(&self, violation: &'a Violation) -> BTreeMap<&'a str, &'a Value> {
        if violation.identity.is_empty() {
            violation
                .details
                .iter()
                .filter(|(key, value)| {
                    matches!(value, Value::String(_) | Value::Bool(_)) && !self.is_volatile(key)
                })
                .map(|(key, value)| (key.as_str(), value))
                .collect()
        } else {
            violation
                .details
                .iter()
                .filter(|(key, _)| violation.identity.contains(*key))
                .map(|(key, value)| (key.as_str(), value))
                .collect()
        }
    }

    /// `"<kind>:<16 hex>"` for the violation's defect class.
    pub fn fingerprint(&self, violation: &Violation) -> String {
        let mut canonical = String::with_capacity(64);
        canonical.push_str(&violation.kind);
        canonical.push('\n');
        for (key, value) in self.stable_details(violation) {
            canonical.push_str(key);
            canonical.push('=');
            canonical.push_str(&value.to_string());
            canonical.push('\n');
        }

        let digest = Sha256::digest(canonical.as_bytes());
        let mut hex = String::with_capacity(16);
        for byte in &digest[..8] {
            hex.push_str(&format!("{byte:02x}"));
        }
        format!("{}:{hex}", violation.kind)
    }
}
