//! Run monitor: wraps every subject action in a before/after snapshot pair
//! and evaluates the invariant registry on the transition.
//!
//! ```text
//! Idle --before_action--> Armed --after_action--> Idle
//!   \__________________ Paused (operator gate) ________/
//! ```
//!
//! The monitor never propagates its own failures to the driver. Snapshot,
//! predicate, fingerprint and persistence errors are logged, counted, and the
//! step carries on with whatever it could still evaluate.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::core::config::MonitorConfig;
use crate::core::errors::SentinelError;
use crate::invariants::{Finding, InvariantRegistry};
use crate::logger::{ActivityEvent, ActivityLoggerHandle};
use crate::monitor::control::OperatorHandle;
use crate::monitor::history::HistoryRing;
use crate::snapshot::{Capture, StateSnapshot, diff::diff_states, snapshot};
use crate::sync::SyncHandle;
use crate::violations::{ActionSummary, HistoryEntry, Report, ViolationRegistry};

/// Occurrence count at which a record is queued for immediate sync.
pub const DEFAULT_IMMEDIATE_THRESHOLD: u64 = 3;

/// A subject action the monitor can record.
pub trait ActionLike: Serialize {
    /// Short stable label, e.g. `play_card`.
    fn label(&self) -> String;

    /// Bucket for per-run action counts.
    fn category(&self) -> String {
        self.label()
    }
}

/// Where in the subject's turn structure an action happens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionContext {
    pub phase: String,
    pub actor: Option<String>,
}

impl ActionContext {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            actor: None,
        }
    }

    #[must_use]
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Harness-internal failure counts, shared with the session summary.
#[derive(Debug, Default)]
pub struct FailureCounters {
    internal: AtomicU64,
    store: AtomicU64,
}

impl FailureCounters {
    pub fn internal_failures(&self) -> u64 {
        self.internal.load(Ordering::Relaxed)
    }

    pub fn store_failures(&self) -> u64 {
        self.store.load(Ordering::Relaxed)
    }

    /// Count one absorbed failure.
    pub fn record(&self, err: &SentinelError) {
        self.internal.fetch_add(1, Ordering::Relaxed);
        if err.is_store_unavailable() {
            self.store.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Per-run counters handed to the orchestrator at run end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCounters {
    pub session_id: Option<String>,
    pub run_index: u64,
    pub started_at: DateTime<Utc>,
    pub steps: u64,
    pub violations: u64,
    pub action_counts: BTreeMap<String, u64>,
    pub fingerprints: BTreeSet<String>,
}

impl RunCounters {
    fn new(session_id: Option<String>, run_index: u64) -> Self {
        Self {
            session_id,
            run_index,
            started_at: Utc::now(),
            steps: 0,
            violations: 0,
            action_counts: BTreeMap::new(),
            fingerprints: BTreeSet::new(),
        }
    }

    /// Wall-clock milliseconds since the run began.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from((Utc::now() - self.started_at).num_milliseconds()).unwrap_or(0)
    }
}

enum Phase<S, A> {
    Idle,
    Armed {
        before: Option<StateSnapshot<S>>,
        action: A,
        context: ActionContext,
    },
}

pub struct RunMonitor<S, A> {
    invariants: Arc<InvariantRegistry<S, A>>,
    violations: Arc<ViolationRegistry>,
    config: MonitorConfig,
    immediate_threshold: u64,
    operator: OperatorHandle,
    logger: ActivityLoggerHandle,
    sync: Option<SyncHandle>,
    failures: Arc<FailureCounters>,
    phase: Phase<S, A>,
    history: HistoryRing,
    step: u64,
    run: RunCounters,
    last_reports: Vec<Report>,
}

impl<S, A> RunMonitor<S, A>
where
    S: Capture,
    A: ActionLike + Clone,
{
    pub fn new(
        invariants: Arc<InvariantRegistry<S, A>>,
        violations: Arc<ViolationRegistry>,
        config: MonitorConfig,
    ) -> Self {
        let operator = OperatorHandle::new(config.unattended);
        let history = HistoryRing::new(config.history_capacity);
        Self {
            invariants,
            violations,
            config,
            immediate_threshold: DEFAULT_IMMEDIATE_THRESHOLD,
            operator,
            logger: ActivityLoggerHandle::disabled(),
            sync: None,
            failures: Arc::new(FailureCounters::default()),
            phase: Phase::Idle,
            history,
            step: 0,
            run: RunCounters::new(None, 0),
            last_reports: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn with_operator(mut self, operator: OperatorHandle) -> Self {
        self.operator = operator;
        self
    }

    #[must_use]
    pub fn with_immediate_threshold(mut self, threshold: u64) -> Self {
        self.immediate_threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn with_failure_counters(mut self, failures: Arc<FailureCounters>) -> Self {
        self.failures = failures;
        self
    }

    /// Attach (or detach) the sync worker handle used for immediate sync.
    pub fn set_sync(&mut self, sync: Option<SyncHandle>) {
        self.sync = sync;
    }

    pub fn operator(&self) -> &OperatorHandle {
        &self.operator
    }

    pub fn failure_counters(&self) -> &Arc<FailureCounters> {
        &self.failures
    }

    pub fn is_paused(&self) -> bool {
        self.operator.is_paused()
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, Phase::Armed { .. })
    }

    /// Current global step counter.
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn internal_failures(&self) -> u64 {
        self.failures.internal_failures()
    }

    /// Start counting a new run.
    pub fn begin_run(&mut self, session_id: Option<String>, run_index: u64) {
        self.reset_run();
        self.run = RunCounters::new(session_id.clone(), run_index);
        self.logger.send(ActivityEvent::RunStarted {
            session_id,
            run_index,
        });
    }

    /// Clear per-run counters, the history ring and any armed action.
    pub fn reset_run(&mut self) {
        self.phase = Phase::Idle;
        self.history.clear();
        self.run = RunCounters::new(self.run.session_id.clone(), self.run.run_index);
    }

    pub fn run_counters(&self) -> &RunCounters {
        &self.run
    }

    /// Reports produced by the most recent step that found violations.
    pub fn last_reports(&self) -> &[Report] {
        &self.last_reports
    }

    /// Operator view of [`last_reports`](Self::last_reports).
    pub fn render_report(&self) -> String {
        if self.last_reports.is_empty() {
            return "no violations recorded".to_string();
        }
        self.last_reports
            .iter()
            .map(Report::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Capture the pre-action state and arm the monitor.
    ///
    /// Returns `false` without side effects while paused or already armed.
    pub fn before_action(&mut self, state: &S, action: &A, context: ActionContext) -> bool {
        if self.operator.is_paused() {
            return false;
        }
        if self.is_armed() {
            eprintln!(
                "[SEN-MONITOR] WARNING: before_action at step {} while an action is pending; ignored",
                self.step
            );
            return false;
        }

        let before = match snapshot(state) {
            Ok(snap) => Some(snap),
            Err(err) => {
                self.internal_failure("snapshot", &err);
                None
            }
        };

        self.step += 1;
        self.run.steps += 1;
        *self.run.action_counts.entry(action.category()).or_insert(0) += 1;
        self.history.push(HistoryEntry {
            step: self.step,
            phase: context.phase.clone(),
            actor: context.actor.clone(),
            action: summarize(action),
            at: Utc::now(),
        });
        self.phase = Phase::Armed {
            before,
            action: action.clone(),
            context,
        };
        true
    }

    /// Capture the post-action state and evaluate the transition.
    ///
    /// Returns `true` iff at least one violation was found. Outside the
    /// armed state this is a no-op returning `false`.
    pub fn after_action(&mut self, state: &S) -> bool {
        let Phase::Armed {
            before,
            action,
            context,
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return false;
        };

        let after = match snapshot(state) {
            Ok(snap) => snap,
            Err(err) => {
                self.internal_failure("snapshot", &err);
                return false;
            }
        };

        let evaluation = self.invariants.evaluate(
            after.state(),
            before.as_ref().map(StateSnapshot::state),
            Some(&action),
        );
        for failure in &evaluation.failures {
            let err = SentinelError::predicate(&failure.invariant, &failure.details);
            self.internal_failure("invariants", &err);
        }
        if evaluation.findings.is_empty() {
            return false;
        }

        let degraded =
            after.is_degraded() || before.as_ref().is_some_and(StateSnapshot::is_degraded);
        let state_diff = before.as_ref().map_or_else(Vec::new, |b| {
            diff_states(b.state(), after.state(), self.config.diff_line_cap).to_lines()
        });
        let recent = self.history.recent(self.config.report_history_window);
        let summary = summarize(&action);

        let mut reports = Vec::with_capacity(evaluation.findings.len());
        for finding in evaluation.findings {
            let mut report = self.build_report(
                finding,
                &context,
                &summary,
                &state_diff,
                &recent,
                degraded,
            );
            self.run.violations += 1;
            match self.violations.record(&report) {
                Ok(record) => {
                    report.occurrence_count = Some(record.occurrence_count);
                    self.run.fingerprints.insert(record.fingerprint.clone());
                    self.logger.send(ActivityEvent::ViolationDetected {
                        session_id: report.session_id.clone(),
                        run_index: report.run_index,
                        step: report.step,
                        fingerprint: record.fingerprint.clone(),
                        kind: record.kind.clone(),
                        severity: record.severity.to_string(),
                        occurrence_count: record.occurrence_count,
                    });
                    if record.occurrence_count >= self.immediate_threshold
                        && !record.synced_to_remote
                    {
                        if let Some(sync) = &self.sync {
                            sync.request_immediate(&record.fingerprint);
                        }
                    }
                }
                Err(err) => self.internal_failure("violations", &err),
            }
            reports.push(report);
        }
        self.last_reports = reports;

        if !self.operator.is_unattended() && self.operator.pause() {
            let fingerprint = self.last_reports.first().map(|r| r.fingerprint.clone());
            eprintln!(
                "[SEN-MONITOR] paused at step {}: {} violation(s)\n{}",
                self.step,
                self.last_reports.len(),
                self.render_report()
            );
            self.logger.send(ActivityEvent::Paused {
                step: self.step,
                fingerprint,
            });
        }
        true
    }

    fn build_report(
        &self,
        finding: Finding,
        context: &ActionContext,
        action: &ActionSummary,
        state_diff: &[String],
        recent: &[HistoryEntry],
        degraded: bool,
    ) -> Report {
        let Finding {
            invariant,
            category,
            violation,
        } = finding;
        let fingerprint = self.violations.fingerprint(&violation);
        let fix_hint = self.invariants.hint_for(&violation.kind, category);
        Report {
            fingerprint,
            kind: violation.kind,
            severity: violation.severity,
            message: violation.message,
            details: violation.details,
            invariant,
            category,
            step: self.step,
            phase: context.phase.clone(),
            actor: context.actor.clone(),
            action: Some(action.clone()),
            state_diff: state_diff.to_vec(),
            recent_actions: recent.to_vec(),
            fix_hint,
            session_id: self.run.session_id.clone(),
            run_index: self.run.run_index,
            detected_at: Utc::now(),
            degraded_snapshot: degraded,
            occurrence_count: None,
        }
    }

    fn internal_failure(&self, component: &'static str, err: &SentinelError) {
        self.failures.record(err);
        if err.is_store_unavailable() {
            eprintln!(
                "[SEN-STORE] CRITICAL: violation store unavailable, results are NOT being persisted: {err}"
            );
            self.logger.send(ActivityEvent::StoreUnavailable {
                details: err.to_string(),
            });
        } else {
            eprintln!("[SEN-MONITOR] {component} failure at step {}: {err}", self.step);
        }
        self.logger.send(ActivityEvent::InternalFailure {
            component,
            error_code: err.code().to_string(),
            message: err.to_string(),
        });
    }
}

fn summarize<A: ActionLike>(action: &A) -> ActionSummary {
    let payload = serde_json::to_value(action).unwrap_or_else(|e| {
        eprintln!("[SEN-MONITOR] WARNING: action payload not serializable: {e}");
        Value::Null
    });
    ActionSummary {
        label: action.label(),
        category: action.category(),
        payload,
    }
}
