//! Session orchestrator: sequences runs, aggregates their results and owns
//! the background sync worker for the lifetime of a session.
//!
//! ```text
//! Stopped --start--> Running <--pause/resume--> Paused
//!    ^                  |                         |
//!    +------ stop ------+-------------------------+
//! ```

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::config::SessionConfig;
use crate::core::errors::{Result, SentinelError};
use crate::logger::{ActivityEvent, ActivityLoggerHandle};
use crate::monitor::{FailureCounters, RunCounters};
use crate::session::summary::{SessionSummary, SessionTally};
use crate::store::{
    HarnessStore, ParticipantSummary, RunOutcome, RunRecord, SubjectDelta, meta_keys,
};
use crate::sync::{ReportSink, SyncHandle, SyncSettings, SyncWorker, Syncer};
use crate::violations::ViolationRegistry;

/// Session id recorded on runs that happen outside any session.
pub const ADHOC_SESSION_ID: &str = "adhoc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// `None` runs until stopped.
    pub target_runs: Option<u64>,
    pub settle_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            target_runs: None,
            settle_delay: Duration::from_millis(100),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            target_runs: config.target_runs,
            settle_delay: config.settle_delay(),
        }
    }

    #[must_use]
    pub fn target(mut self, runs: u64) -> Self {
        self.target_runs = Some(runs);
        self
    }
}

/// What the driver should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    /// Begin the first run of a new session.
    StartRun,
    /// Begin another run after `settle`.
    NextRun { settle: Duration },
    /// Paused: do not start a run until resumed.
    Wait,
    /// The session is over.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
    Paused,
}

/// How a run ended, as judged by its driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConclusion {
    pub outcome: RunOutcome,
    pub winner: Option<String>,
    pub participants: Vec<ParticipantSummary>,
}

impl RunConclusion {
    pub fn new(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            winner: None,
            participants: Vec::new(),
        }
    }
}

/// Subject state that can describe its own terminal result.
pub trait Concludable {
    fn conclude(&self) -> RunConclusion;
}

/// Everything needed to (re)start the sync worker for each session.
pub struct SyncPlan {
    pub violations: Arc<ViolationRegistry>,
    pub sink: Arc<dyn ReportSink>,
    pub settings: SyncSettings,
}

pub type SummaryCallback = Box<dyn FnMut(&SessionSummary) + Send>;

struct ActiveSession {
    id: String,
    started_at: DateTime<Utc>,
    options: SessionOptions,
    tally: SessionTally,
    next_run_index: u64,
    internal_baseline: u64,
    store_baseline: u64,
}

impl ActiveSession {
    fn target_reached(&self) -> bool {
        self.options
            .target_runs
            .is_some_and(|t| self.tally.runs_completed >= t)
    }
}

pub struct SessionOrchestrator {
    store: Arc<HarnessStore>,
    failures: Arc<FailureCounters>,
    logger: ActivityLoggerHandle,
    sync_plan: Option<SyncPlan>,
    worker: Option<SyncWorker>,
    on_summary: Option<SummaryCallback>,
    config_hash: String,
    state: SessionState,
    active: Option<ActiveSession>,
    last_summary: Option<SessionSummary>,
}

impl SessionOrchestrator {
    pub fn new(store: Arc<HarnessStore>, failures: Arc<FailureCounters>) -> Self {
        Self {
            store,
            failures,
            logger: ActivityLoggerHandle::disabled(),
            sync_plan: None,
            worker: None,
            on_summary: None,
            config_hash: String::new(),
            state: SessionState::Stopped,
            active: None,
            last_summary: None,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn with_sync(mut self, plan: SyncPlan) -> Self {
        self.sync_plan = Some(plan);
        self
    }

    #[must_use]
    pub fn with_summary_callback(mut self, callback: SummaryCallback) -> Self {
        self.on_summary = Some(callback);
        self
    }

    #[must_use]
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != SessionState::Stopped
    }

    pub fn session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.id.as_str())
    }

    /// Index the next run of the active session will carry.
    pub fn next_run_index(&self) -> u64 {
        self.active.as_ref().map_or(0, |a| a.next_run_index)
    }

    /// Handle of the session's sync worker, if one is running.
    pub fn sync_handle(&self) -> Option<SyncHandle> {
        self.worker.as_ref().map(SyncWorker::handle)
    }

    /// Begin a session.
    pub fn start(&mut self, options: SessionOptions) -> Result<RunDecision> {
        if self.state != SessionState::Stopped {
            return Err(SentinelError::Lifecycle {
                details: format!(
                    "session {} is already running",
                    self.session_id().unwrap_or("?")
                ),
            });
        }

        let started_at = Utc::now();
        let id = new_session_id(started_at);
        let meta = self.store.atomically(|txn| {
            txn.set_meta(meta_keys::LAST_SESSION_ID, &id)?;
            txn.set_meta(meta_keys::LAST_SESSION_START, &started_at.to_rfc3339())
        });
        if let Err(err) = meta {
            self.absorb(&err);
        }

        if let Some(plan) = &self.sync_plan {
            let syncer = Syncer::new(
                Arc::clone(&plan.violations),
                Arc::clone(&plan.sink),
                plan.settings.min_occurrences,
                self.logger.clone(),
            );
            match SyncWorker::spawn(syncer, plan.settings) {
                Ok(worker) => self.worker = Some(worker),
                Err(err) => self.absorb(&err),
            }
        }

        self.logger.send(ActivityEvent::SessionStarted {
            session_id: id.clone(),
            config_hash: self.config_hash.clone(),
        });
        self.active = Some(ActiveSession {
            id,
            started_at,
            options,
            tally: SessionTally::default(),
            next_run_index: 0,
            internal_baseline: self.failures.internal_failures(),
            store_baseline: self.failures.store_failures(),
        });
        self.state = SessionState::Running;
        Ok(RunDecision::StartRun)
    }

    /// Persist a finished run and decide what comes next.
    ///
    /// The run record and subject deltas commit together, once per run.
    pub fn on_run_end(
        &mut self,
        conclusion: &RunConclusion,
        counters: &RunCounters,
    ) -> RunDecision {
        let session_id = counters
            .session_id
            .clone()
            .or_else(|| self.session_id().map(str::to_string))
            .unwrap_or_else(|| ADHOC_SESSION_ID.to_string());
        let record = RunRecord {
            id: None,
            session_id: session_id.clone(),
            run_index: counters.run_index,
            started_at: counters.started_at,
            duration_ms: counters.elapsed_ms(),
            steps: counters.steps,
            outcome: conclusion.outcome,
            winner: conclusion.winner.clone(),
            participants: conclusion.participants.clone(),
            action_counts: counters.action_counts.clone(),
            violation_count: counters.violations,
            fingerprints: counters.fingerprints.iter().cloned().collect(),
        };
        let deltas = SubjectDelta::for_run(&record);
        let saved = self.store.atomically(|txn| {
            let id = txn.save_run(&record)?;
            txn.update_subject_stats(&deltas)?;
            Ok(id)
        });
        if let Err(err) = saved {
            self.absorb(&err);
        }

        self.logger.send(ActivityEvent::RunEnded {
            session_id: Some(session_id),
            run_index: record.run_index,
            outcome: record.outcome.to_string(),
            steps: record.steps,
            violations: record.violation_count,
            duration_ms: record.duration_ms,
        });

        if let Some(active) = self.active.as_mut() {
            active.tally.absorb(
                conclusion.outcome,
                conclusion.winner.as_deref(),
                counters.steps,
                counters.violations,
            );
            active.next_run_index += 1;
        }
        self.decide()
    }

    /// Stop requesting runs until [`resume`](Self::resume).
    pub fn pause(&mut self) -> bool {
        if self.state == SessionState::Running {
            self.state = SessionState::Paused;
            return true;
        }
        false
    }

    pub fn resume(&mut self) -> RunDecision {
        if self.state == SessionState::Paused {
            self.state = SessionState::Running;
        }
        self.decide()
    }

    /// The decision that applies right now.
    pub fn decide(&self) -> RunDecision {
        match (self.state, &self.active) {
            (SessionState::Stopped, _) | (_, None) => RunDecision::Stop,
            (_, Some(active)) if active.target_reached() => RunDecision::Stop,
            (SessionState::Paused, _) => RunDecision::Wait,
            (SessionState::Running, Some(active)) => RunDecision::NextRun {
                settle: active.options.settle_delay,
            },
        }
    }

    /// End the session. Safe to call at any point and more than once; later
    /// calls return the summary of the session that was stopped.
    pub fn stop(&mut self, reason: &str) -> Option<SessionSummary> {
        let Some(active) = self.active.take() else {
            return self.last_summary.clone();
        };
        self.state = SessionState::Stopped;

        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }

        let summary = self.summarize(&active, reason);
        let meta = self.store.atomically(|txn| {
            txn.set_meta(meta_keys::LAST_SESSION_END, &summary.ended_at.to_rfc3339())?;
            txn.set_meta(meta_keys::LAST_RUN_COUNT, &summary.runs_completed.to_string())
        });
        if let Err(err) = meta {
            self.absorb(&err);
        }

        self.logger.send(ActivityEvent::SessionStopped {
            session_id: summary.session_id.clone(),
            reason: reason.to_string(),
            runs: summary.runs_completed,
            violations: summary.total_violations,
            duration_ms: summary.duration_ms,
        });
        if let Some(callback) = self.on_summary.as_mut() {
            callback(&summary);
        }
        self.last_summary = Some(summary.clone());
        Some(summary)
    }

    /// Live summary of the active session, or the last stopped one.
    pub fn summary(&self) -> Option<SessionSummary> {
        match &self.active {
            Some(active) => Some(self.summarize(active, "running")),
            None => self.last_summary.clone(),
        }
    }

    fn summarize(&self, active: &ActiveSession, reason: &str) -> SessionSummary {
        let ended_at = Utc::now();
        let tally = &active.tally;
        SessionSummary {
            session_id: active.id.clone(),
            started_at: active.started_at,
            ended_at,
            duration_ms: u64::try_from((ended_at - active.started_at).num_milliseconds())
                .unwrap_or(0),
            stop_reason: reason.to_string(),
            target_runs: active.options.target_runs,
            runs_completed: tally.runs_completed,
            wins_by_participant: tally.wins_by_participant.clone(),
            outcomes: tally.outcomes.clone(),
            total_steps: tally.total_steps,
            total_violations: tally.total_violations,
            fastest_run_steps: tally.fastest_run_steps,
            longest_run_steps: tally.longest_run_steps,
            internal_failures: self
                .failures
                .internal_failures()
                .saturating_sub(active.internal_baseline),
            store_failures: self
                .failures
                .store_failures()
                .saturating_sub(active.store_baseline),
        }
    }

    fn absorb(&self, err: &SentinelError) {
        self.failures.record(err);
        if err.is_store_unavailable() {
            eprintln!("[SEN-STORE] CRITICAL: run history is NOT being persisted: {err}");
            self.logger.send(ActivityEvent::StoreUnavailable {
                details: err.to_string(),
            });
        } else {
            eprintln!("[SEN-SESSION] {err}");
        }
        self.logger.send(ActivityEvent::InternalFailure {
            component: "session",
            error_code: err.code().to_string(),
            message: err.to_string(),
        });
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        if self.active.is_some() {
            let _ = self.stop("dropped");
        }
    }
}

fn new_session_id(at: DateTime<Utc>) -> String {
    format!("{}-{:08x}", at.format("%Y%m%dT%H%M%SZ"), rand::random::<u32>())
}
