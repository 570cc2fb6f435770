//! Typed invariant registry.
//!
//! Two predicate classes:
//! - **Absolute** predicates see only the post-action state and assert
//!   properties every valid state holds.
//! - **Transitional** predicates see `(after, before, action)` and assert
//!   properties of the specific step just applied.
//!
//! Registration validates names up front. Evaluation isolates predicates from
//! each other: one that errors or panics is recorded as a failure and skipped.

#![allow(missing_docs)]

use std::collections::{BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};

use crate::core::errors::{Result, SentinelError};
use crate::invariants::violation::{Category, Violation};

pub type AbsoluteFn<S> = Box<dyn Fn(&S) -> Result<Vec<Violation>> + Send + Sync>;
pub type TransitionalFn<S, A> = Box<dyn Fn(&S, &S, &A) -> Result<Vec<Violation>> + Send + Sync>;

/// The check an invariant runs.
pub enum Predicate<S, A> {
    Absolute(AbsoluteFn<S>),
    Transitional(TransitionalFn<S, A>),
}

/// A named predicate with the defect category its violations belong to.
pub struct Invariant<S, A> {
    name: String,
    category: Category,
    predicate: Predicate<S, A>,
}

impl<S, A> Invariant<S, A> {
    pub fn absolute<F>(name: impl Into<String>, category: Category, check: F) -> Self
    where
        F: Fn(&S) -> Result<Vec<Violation>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            category,
            predicate: Predicate::Absolute(Box::new(check)),
        }
    }

    pub fn transitional<F>(name: impl Into<String>, category: Category, check: F) -> Self
    where
        F: Fn(&S, &S, &A) -> Result<Vec<Violation>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            category,
            predicate: Predicate::Transitional(Box::new(check)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn is_transitional(&self) -> bool {
        matches!(self.predicate, Predicate::Transitional(_))
    }
}

/// A violation attributed to the invariant that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub invariant: String,
    pub category: Category,
    pub violation: Violation,
}

/// A predicate that failed to produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateFailure {
    pub invariant: String,
    pub details: String,
}

/// Outcome of running the registry once.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub findings: Vec<Finding>,
    pub failures: Vec<PredicateFailure>,
    /// Predicates that ran (succeeded or failed).
    pub evaluated: usize,
}

impl Evaluation {
    pub fn has_violations(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Registry of invariants plus fix hints keyed by violation kind.
pub struct InvariantRegistry<S, A> {
    entries: Vec<Invariant<S, A>>,
    names: BTreeSet<String>,
    hints: HashMap<String, String>,
}

impl<S, A> Default for InvariantRegistry<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A> InvariantRegistry<S, A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            names: BTreeSet::new(),
            hints: HashMap::new(),
        }
    }

    /// Add an invariant. Names must be non-empty and unique.
    /// Surrounding whitespace is stripped from the stored name.
    pub fn register(&mut self, mut invariant: Invariant<S, A>) -> Result<()> {
        let name = invariant.name.trim().to_string();
        if name.is_empty() {
            return Err(SentinelError::Registration {
                name: invariant.name,
                reason: "name must not be blank".to_string(),
            });
        }
        if !self.names.insert(name.clone()) {
            return Err(SentinelError::Registration {
                name,
                reason: "an invariant with this name is already registered".to_string(),
            });
        }
        invariant.name = name;
        self.entries.push(invariant);
        Ok(())
    }

    /// Register a remediation hint for one violation kind.
    pub fn set_hint(&mut self, kind: impl Into<String>, hint: impl Into<String>) {
        self.hints.insert(kind.into(), hint.into());
    }

    /// Builder form of [`set_hint`](Self::set_hint).
    #[must_use]
    pub fn with_hint(mut self, kind: impl Into<String>, hint: impl Into<String>) -> Self {
        self.set_hint(kind, hint);
        self
    }

    /// Hint for `kind`, falling back to the category's generic advice.
    pub fn hint_for(&self, kind: &str, category: Category) -> String {
        self.hints
            .get(kind)
            .cloned()
            .unwrap_or_else(|| category.default_hint().to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Invariant::name)
    }

    /// Run every applicable predicate.
    ///
    /// Absolute predicates always run. Transitional ones run only when both
    /// `before` and `action` are supplied.
    pub fn evaluate(&self, after: &S, before: Option<&S>, action: Option<&A>) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for invariant in &self.entries {
            let outcome = match (&invariant.predicate, before, action) {
                (Predicate::Absolute(check), _, _) => guarded(|| check(after)),
                (Predicate::Transitional(check), Some(before), Some(action)) => {
                    guarded(|| check(after, before, action))
                }
                (Predicate::Transitional(_), _, _) => continue,
            };
            evaluation.evaluated += 1;

            match outcome {
                Ok(violations) => {
                    evaluation
                        .findings
                        .extend(violations.into_iter().map(|violation| Finding {
                            invariant: invariant.name.clone(),
                            category: invariant.category,
                            violation,
                        }));
                }
                Err(details) => {
                    eprintln!(
                        "[SEN-INVARIANT] predicate '{}' failed, skipping: {details}",
                        invariant.name
                    );
                    evaluation.failures.push(PredicateFailure {
                        invariant: invariant.name.clone(),
                        details,
                    });
                }
            }
        }

        evaluation
    }
}

fn guarded<F>(check: F) -> std::result::Result<Vec<Violation>, String>
where
    F: FnOnce() -> Result<Vec<Violation>>,
{
    match panic::catch_unwind(AssertUnwindSafe(check)) {
        Ok(Ok(violations)) => Ok(violations),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariants::violation::Severity;

    #[derive(Debug)]
    struct Counter {
        value: i64,
    }

    #[derive(Debug)]
    struct Step(i64);

    fn registry() -> InvariantRegistry<Counter, Step> {
        let mut reg = InvariantRegistry::new();
        reg.register(Invariant::absolute(
            "non-negative",
            Category::StateCorruption,
            |s: &Counter| {
                Ok(if s.value < 0 {
                    vec![Violation::new("negative-counter", Severity::High, "below zero")]
                } else {
                    Vec::new()
                })
            },
        ))
        .unwrap();
        reg.register(Invariant::transitional(
            "step-matches",
            Category::RuleViolation,
            |after: &Counter, before: &Counter, step: &Step| {
                Ok(if after.value - before.value == step.0 {
                    Vec::new()
                } else {
                    vec![Violation::new("step-mismatch", Severity::Medium, "wrong delta")]
                })
            },
        ))
        .unwrap();
        reg
    }

    #[test]
    fn duplicate_names_rejected_at_registration() {
        let mut reg = registry();
        let err = reg
            .register(Invariant::absolute(
                "non-negative",
                Category::StateCorruption,
                |_: &Counter| Ok(Vec::new()),
            ))
            .unwrap_err();
        assert_eq!(err.code(), "SEN-2201");
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn names_are_stored_trimmed() {
        let mut reg = registry();
        reg.register(Invariant::absolute(
            "  always-zero ",
            Category::StateCorruption,
            |s: &Counter| {
                Ok(if s.value == 0 {
                    Vec::new()
                } else {
                    vec![Violation::new("not-zero", Severity::Low, "non-zero")]
                })
            },
        ))
        .unwrap();
        assert!(reg.names().any(|n| n == "always-zero"));

        let eval = reg.evaluate(&Counter { value: 3 }, None, None);
        let finding = eval.findings.iter().find(|f| f.violation.kind == "not-zero").unwrap();
        assert_eq!(finding.invariant, "always-zero");

        let dup = reg.register(Invariant::absolute(
            "always-zero",
            Category::StateCorruption,
            |_: &Counter| Ok(Vec::new()),
        ));
        assert!(dup.is_err());
    }

    #[test]
    fn blank_names_rejected() {
        let mut reg: InvariantRegistry<Counter, Step> = InvariantRegistry::new();
        assert!(
            reg.register(Invariant::absolute("  ", Category::Harness, |_: &Counter| Ok(
                Vec::new()
            )))
            .is_err()
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn transitional_predicates_skipped_without_context() {
        let reg = registry();
        let eval = reg.evaluate(&Counter { value: 3 }, None, None);
        assert_eq!(eval.evaluated, 1);
        assert!(!eval.has_violations());
    }

    #[test]
    fn union_of_absolute_and_transitional_outputs() {
        let reg = registry();
        let eval = reg.evaluate(
            &Counter { value: -1 },
            Some(&Counter { value: 5 }),
            Some(&Step(1)),
        );
        assert_eq!(eval.evaluated, 2);
        let kinds: Vec<&str> = eval
            .findings
            .iter()
            .map(|f| f.violation.kind.as_str())
            .collect();
        assert!(kinds.contains(&"negative-counter"));
        assert!(kinds.contains(&"step-mismatch"));
        let mismatch = eval
            .findings
            .iter()
            .find(|f| f.violation.kind == "step-mismatch")
            .unwrap();
        assert_eq!(mismatch.invariant, "step-matches");
        assert_eq!(mismatch.category, Category::RuleViolation);
    }

    #[test]
    fn failing_predicates_do_not_abort_the_rest() {
        let mut reg = registry();
        reg.register(Invariant::absolute(
            "explodes",
            Category::Harness,
            |_: &Counter| -> Result<Vec<Violation>> { panic!("boom") },
        ))
        .unwrap();
        reg.register(Invariant::absolute(
            "errors",
            Category::Harness,
            |_: &Counter| Err(SentinelError::predicate("errors", "missing field")),
        ))
        .unwrap();

        let eval = reg.evaluate(&Counter { value: -4 }, None, None);
        assert_eq!(eval.failures.len(), 2);
        assert!(eval.failures.iter().any(|f| f.details.contains("boom")));
        assert!(
            eval.failures
                .iter()
                .any(|f| f.details.contains("missing field"))
        );
        assert_eq!(eval.findings.len(), 1);
        assert_eq!(eval.findings[0].violation.kind, "negative-counter");
    }

    #[test]
    fn hints_fall_back_to_category_defaults() {
        let mut reg = registry();
        reg.set_hint("negative-counter", "clamp the decrement");
        assert_eq!(
            reg.hint_for("negative-counter", Category::StateCorruption),
            "clamp the decrement"
        );
        assert_eq!(
            reg.hint_for("unknown", Category::Conservation),
            Category::Conservation.default_hint()
        );
    }
}
