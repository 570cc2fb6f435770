//! Structural state diff for report diagnostics.
//!
//! Both sides are viewed as JSON trees. Only differing leaves and changed
//! collection sizes are reported; an absent path means "unchanged". Invariant
//! logic never reads this output.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::StateSnapshot;

/// Default cap on emitted lines.
pub const DEFAULT_LINE_CAP: usize = 25;

/// Human-readable list of before→after changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub lines: Vec<String>,
    /// Changes dropped because the cap was reached.
    pub truncated: usize,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.truncated == 0
    }

    /// Lines including the truncation marker, as attached to reports.
    pub fn to_lines(&self) -> Vec<String> {
        let mut out = self.lines.clone();
        if self.truncated > 0 {
            out.push(format!("... {} more", self.truncated));
        }
        out
    }

    fn push(&mut self, cap: usize, line: String) {
        if self.lines.len() < cap {
            self.lines.push(line);
        } else {
            self.truncated += 1;
        }
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(no changes)");
        }
        for (i, line) in self.to_lines().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Diff two snapshots with the default line cap.
pub fn diff<S: Serialize>(before: &StateSnapshot<S>, after: &StateSnapshot<S>) -> DiffSummary {
    diff_states(before.state(), after.state(), DEFAULT_LINE_CAP)
}

/// Diff two states directly, emitting at most `cap` lines.
pub fn diff_states<S: Serialize>(before: &S, after: &S, cap: usize) -> DiffSummary {
    let mut out = DiffSummary::default();
    match (serde_json::to_value(before), serde_json::to_value(after)) {
        (Ok(b), Ok(a)) => walk("", &b, &a, cap, &mut out),
        (Err(e), _) | (_, Err(e)) => out.push(cap, format!("(diff unavailable: {e})")),
    }
    out
}

fn walk(path: &str, before: &Value, after: &Value, cap: usize, out: &mut DiffSummary) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let keys: BTreeSet<&String> = b.keys().chain(a.keys()).collect();
            for key in keys {
                let child = join(path, key);
                match (b.get(key), a.get(key)) {
                    (Some(bv), Some(av)) => walk(&child, bv, av, cap, out),
                    (Some(bv), None) => {
                        out.push(cap, format!("{child}: {} → <absent>", render(bv)));
                    }
                    (None, Some(av)) => {
                        out.push(cap, format!("{child}: <absent> → {}", render(av)));
                    }
                    (None, None) => {}
                }
            }
        }
        (Value::Array(b), Value::Array(a)) => {
            if b.len() != a.len() {
                out.push(cap, format!("{} size: {} → {}", display_path(path), b.len(), a.len()));
            }
            match (labels(b), labels(a)) {
                (Some(bl), Some(al)) => walk_labelled(path, b, &bl, a, &al, cap, out),
                _ => {
                    for (i, (bv, av)) in b.iter().zip(a.iter()).enumerate() {
                        walk(&format!("{path}[{i}]"), bv, av, cap, out);
                    }
                }
            }
        }
        _ => out.push(
            cap,
            format!("{}: {} → {}", display_path(path), render(before), render(after)),
        ),
    }
}

fn walk_labelled(
    path: &str,
    before: &[Value],
    before_labels: &[String],
    after: &[Value],
    after_labels: &[String],
    cap: usize,
    out: &mut DiffSummary,
) {
    for (bv, label) in before.iter().zip(before_labels) {
        let child = format!("{path}[{label}]");
        match after_labels.iter().position(|l| l == label) {
            Some(idx) => walk(&child, bv, &after[idx], cap, out),
            None => out.push(cap, format!("{child} removed")),
        }
    }
    for label in after_labels {
        if !before_labels.contains(label) {
            out.push(cap, format!("{path}[{label}] added"));
        }
    }
}

/// Element labels when every element carries a unique `name` or `id`.
fn labels(items: &[Value]) -> Option<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let label = match item.get("name").or_else(|| item.get("id"))? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if !seen.insert(label.clone()) {
            return None;
        }
        out.push(label);
    }
    Some(out)
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<root>" } else { path }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Object(_) => "{…}".to_string(),
        other => other.to_string(),
    }
}
