//! The top-level harness: one explicitly constructed instance wiring the
//! store, violation registry, run monitor, session orchestrator, logger and
//! sync sink together. Nothing here is global; every collaborator is
//! injected through [`HarnessBuilder`].

#![allow(missing_docs)]

use std::sync::Arc;

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::invariants::InvariantRegistry;
use crate::logger::{ActivityEvent, ActivityLoggerHandle};
use crate::monitor::{ActionContext, ActionLike, FailureCounters, OperatorHandle, RunMonitor};
use crate::session::{
    Concludable, RunConclusion, RunDecision, SessionOptions, SessionOrchestrator, SessionState,
    SessionSummary, SummaryCallback, SyncPlan,
};
use crate::snapshot::Capture;
use crate::store::{FullStatistics, HarnessStore, StatsEngine};
use crate::sync::{ReportSink, SyncSettings, sink_from_config};
use crate::violations::{Fingerprinter, Report, ViolationRegistry};

pub struct HarnessBuilder<S, A> {
    config: Config,
    invariants: InvariantRegistry<S, A>,
    store: Option<Arc<HarnessStore>>,
    sink: Option<Arc<dyn ReportSink>>,
    logger: ActivityLoggerHandle,
    fingerprinter: Option<Fingerprinter>,
    on_summary: Option<SummaryCallback>,
}

impl<S, A> HarnessBuilder<S, A>
where
    S: Capture,
    A: ActionLike + Clone,
{
    pub fn new(invariants: InvariantRegistry<S, A>) -> Self {
        Self {
            config: Config::default(),
            invariants,
            store: None,
            sink: None,
            logger: ActivityLoggerHandle::disabled(),
            fingerprinter: None,
            on_summary: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use an already-open store instead of opening `paths.sqlite_db`.
    #[must_use]
    pub fn store(mut self, store: Arc<HarnessStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Report sink for background sync. Overrides `sync.sink` and enables sync.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = Some(fingerprinter);
        self
    }

    #[must_use]
    pub fn on_session_summary(
        mut self,
        callback: impl FnMut(&SessionSummary) + Send + 'static,
    ) -> Self {
        self.on_summary = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Result<Harness<S, A>> {
        let Self {
            config,
            invariants,
            store,
            sink,
            logger,
            fingerprinter,
            on_summary,
        } = self;

        let store = match store {
            Some(store) => store,
            None => Arc::new(HarnessStore::open_with_limit(
                &config.paths.sqlite_db,
                config.store.max_runs,
            )?),
        };
        let sample_capacity = config.monitor.sample_capacity;
        let violations = Arc::new(match fingerprinter {
            Some(fp) => {
                ViolationRegistry::with_fingerprinter(Arc::clone(&store), fp, sample_capacity)
            }
            None => ViolationRegistry::new(Arc::clone(&store), sample_capacity)?,
        });

        let failures = Arc::new(FailureCounters::default());
        let operator = OperatorHandle::new(config.monitor.unattended);
        let monitor = RunMonitor::new(
            Arc::new(invariants),
            Arc::clone(&violations),
            config.monitor.clone(),
        )
        .with_logger(logger.clone())
        .with_operator(operator)
        .with_immediate_threshold(config.sync.immediate_threshold)
        .with_failure_counters(Arc::clone(&failures));

        let sink = match sink {
            Some(sink) => Some(sink),
            None if config.sync.enabled => {
                let configured: Option<Arc<dyn ReportSink>> =
                    sink_from_config(&config.sync)?.map(Arc::from);
                if configured.is_none() {
                    eprintln!("[SEN-SYNC] WARNING: sync.enabled is set but sync.sink = \"none\"");
                }
                configured
            }
            None => None,
        };

        let mut session = SessionOrchestrator::new(Arc::clone(&store), failures)
            .with_logger(logger.clone())
            .with_config_hash(config.stable_hash().unwrap_or_default());
        if let Some(sink) = sink {
            session = session.with_sync(SyncPlan {
                violations: Arc::clone(&violations),
                sink,
                settings: SyncSettings {
                    interval: config.sync.interval(),
                    min_occurrences: config.sync.min_occurrences,
                },
            });
        }
        if let Some(callback) = on_summary {
            session = session.with_summary_callback(callback);
        }

        Ok(Harness {
            config,
            store,
            violations,
            monitor,
            session,
            logger,
        })
    }
}

pub struct Harness<S, A> {
    config: Config,
    store: Arc<HarnessStore>,
    violations: Arc<ViolationRegistry>,
    monitor: RunMonitor<S, A>,
    session: SessionOrchestrator,
    logger: ActivityLoggerHandle,
}

impl<S, A> Harness<S, A>
where
    S: Capture,
    A: ActionLike + Clone,
{
    pub fn builder(invariants: InvariantRegistry<S, A>) -> HarnessBuilder<S, A> {
        HarnessBuilder::new(invariants)
    }

    // ──── driver boundary ────

    pub fn on_run_start(&mut self, _initial_state: &S) {
        let session_id = self.session.session_id().map(str::to_string);
        self.monitor
            .begin_run(session_id, self.session.next_run_index());
    }

    pub fn before_action(&mut self, state: &S, action: &A, context: ActionContext) -> bool {
        self.monitor.before_action(state, action, context)
    }

    pub fn after_action(&mut self, state: &S) -> bool {
        self.monitor.after_action(state)
    }

    pub fn on_run_end(&mut self, final_state: &S) -> RunDecision
    where
        S: Concludable,
    {
        self.on_run_end_with(final_state.conclude())
    }

    /// Close the current run with an explicit conclusion.
    ///
    /// Reaching the session's target stops the session.
    pub fn on_run_end_with(&mut self, conclusion: RunConclusion) -> RunDecision {
        let decision = self
            .session
            .on_run_end(&conclusion, self.monitor.run_counters());
        self.monitor.reset_run();
        if decision == RunDecision::Stop && self.session.is_running() {
            self.stop_session("target reached");
        }
        decision
    }

    /// Discard the current run without recording it.
    pub fn abort_run(&mut self) {
        self.monitor.reset_run();
    }

    // ──── session control ────

    /// Start a session. A gate left closed by the previous session's last
    /// violation is released first; its parked continuation fires.
    pub fn start_session(&mut self, options: SessionOptions) -> Result<RunDecision> {
        let decision = self.session.start(options)?;
        if self.monitor.operator().resume() {
            self.logger.send(ActivityEvent::Resumed {
                step: self.monitor.step(),
            });
        }
        self.monitor.set_sync(self.session.sync_handle());
        Ok(decision)
    }

    pub fn stop_session(&mut self, reason: &str) -> Option<SessionSummary> {
        let summary = self.session.stop(reason);
        self.monitor.set_sync(None);
        summary
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session_decision(&self) -> RunDecision {
        self.session.decide()
    }

    pub fn next_run_index(&self) -> u64 {
        self.session.next_run_index()
    }

    // ──── operator surface ────

    /// Stop requesting new runs. A run in progress completes normally.
    pub fn pause(&mut self) {
        if self.session.pause() {
            self.logger.send(ActivityEvent::Paused {
                step: self.monitor.step(),
                fingerprint: None,
            });
        }
    }

    /// Close the action gate mid-run, as a violation pause does; the next
    /// `before_action` is rejected until [`Harness::resume`].
    pub fn pause_actions(&mut self) {
        if self.monitor.operator().pause() {
            self.logger.send(ActivityEvent::Paused {
                step: self.monitor.step(),
                fingerprint: None,
            });
        }
    }

    /// Release both pauses, fire the pending continuation, and report what
    /// the session wants next.
    pub fn resume(&mut self) -> RunDecision {
        if self.monitor.operator().resume() {
            self.logger.send(ActivityEvent::Resumed {
                step: self.monitor.step(),
            });
        }
        self.session.resume()
    }

    /// The action gate is closed.
    pub fn is_paused(&self) -> bool {
        self.monitor.is_paused()
    }

    /// No new runs are being requested.
    pub fn is_session_paused(&self) -> bool {
        self.session.state() == SessionState::Paused
    }

    pub fn enable_unattended_mode(&mut self) {
        let was_paused = self.monitor.is_paused();
        self.monitor.operator().enable_unattended_mode();
        if was_paused {
            self.logger.send(ActivityEvent::Resumed {
                step: self.monitor.step(),
            });
        }
        self.session.resume();
    }

    pub fn disable_unattended_mode(&mut self) {
        self.monitor.operator().disable_unattended_mode();
    }

    /// Cloneable pause control for operator threads.
    pub fn operator(&self) -> &OperatorHandle {
        self.monitor.operator()
    }

    pub fn last_reports(&self) -> &[Report] {
        self.monitor.last_reports()
    }

    pub fn render_report(&self) -> String {
        self.monitor.render_report()
    }

    pub fn internal_failures(&self) -> u64 {
        self.monitor.internal_failures()
    }

    // ──── read-only queries ────

    /// Every violation record as pretty JSON, most frequent first.
    pub fn export_violations_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.violations.all()?)?)
    }

    pub fn session_summary(&self) -> Option<SessionSummary> {
        self.session.summary()
    }

    pub fn full_statistics(&self) -> Result<FullStatistics> {
        StatsEngine::new(&self.store).full()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<HarnessStore> {
        &self.store
    }

    pub fn violations(&self) -> &Arc<ViolationRegistry> {
        &self.violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariants::{Category, Invariant, Severity, Violation};
    use crate::store::RunOutcome;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tally {
        n: i64,
    }

    impl Capture for Tally {
        fn try_deep_copy(&self) -> Option<Self> {
            Some(self.clone())
        }
    }

    impl Concludable for Tally {
        fn conclude(&self) -> RunConclusion {
            RunConclusion::new(RunOutcome::Draw)
        }
    }

    #[derive(Debug, Clone, Serialize)]
    struct Bump;

    impl ActionLike for Bump {
        fn label(&self) -> String {
            "bump".to_string()
        }
    }

    fn harness(dir: &tempfile::TempDir, unattended: bool) -> Harness<Tally, Bump> {
        let mut invariants = InvariantRegistry::new();
        invariants
            .register(Invariant::absolute("even", Category::StateCorruption, |t: &Tally| {
                Ok(if t.n % 2 == 0 {
                    Vec::new()
                } else {
                    vec![Violation::new("odd-tally", Severity::Low, "tally is odd")]
                })
            }))
            .unwrap();
        let mut config = Config::default();
        config.paths.sqlite_db = dir.path().join("h.db");
        config.monitor.unattended = unattended;
        Harness::builder(invariants).config(config).build().unwrap()
    }

    #[test]
    fn builder_opens_configured_store() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(&dir, false);
        assert!(h.store().is_wal_mode());
        assert_eq!(h.session_state(), SessionState::Stopped);
    }

    #[test]
    fn target_reached_closes_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(&dir, true);
        h.start_session(SessionOptions::default().target(1)).unwrap();
        let mut t = Tally { n: 0 };
        h.on_run_start(&t);
        assert!(h.before_action(&t, &Bump, ActionContext::new("main")));
        t.n += 1;
        assert!(h.after_action(&t));
        assert_eq!(h.on_run_end(&t), RunDecision::Stop);
        assert_eq!(h.session_state(), SessionState::Stopped);

        let summary = h.session_summary().unwrap();
        assert_eq!(summary.stop_reason, "target reached");
        assert_eq!(summary.total_violations, 1);

        let exported: serde_json::Value =
            serde_json::from_str(&h.export_violations_json().unwrap()).unwrap();
        assert_eq!(exported[0]["kind"], "odd-tally");
        let stats = h.full_statistics().unwrap();
        assert_eq!(stats.runs.total_runs, 1);
    }

    #[test]
    fn session_pause_lets_the_current_run_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(&dir, true);
        h.start_session(SessionOptions::default()).unwrap();
        let mut t = Tally { n: 0 };
        h.on_run_start(&t);
        assert!(h.before_action(&t, &Bump, ActionContext::new("main")));
        t.n = 2;
        assert!(!h.after_action(&t));

        h.pause();
        assert!(h.is_session_paused());
        assert!(!h.is_paused());
        assert!(h.before_action(&t, &Bump, ActionContext::new("main")));
        t.n = 4;
        assert!(!h.after_action(&t));

        assert_eq!(h.on_run_end(&t), RunDecision::Wait);
        assert_eq!(h.store().run_count().unwrap(), 1);
        assert!(matches!(h.resume(), RunDecision::NextRun { .. }));
        assert!(!h.is_session_paused());
    }

    #[test]
    fn pause_actions_gates_until_resume() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(&dir, false);
        h.start_session(SessionOptions::default()).unwrap();
        let t = Tally { n: 0 };
        h.pause_actions();
        assert!(h.is_paused());
        assert!(!h.is_session_paused());
        assert!(!h.before_action(&t, &Bump, ActionContext::new("main")));
        assert!(matches!(h.resume(), RunDecision::NextRun { .. }));
        assert!(h.before_action(&t, &Bump, ActionContext::new("main")));
    }

    #[test]
    fn new_session_clears_a_stale_violation_pause() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(&dir, false);
        h.start_session(SessionOptions::default().target(1)).unwrap();
        let mut t = Tally { n: 0 };
        h.on_run_start(&t);
        h.before_action(&t, &Bump, ActionContext::new("main"));
        t.n = 1;
        assert!(h.after_action(&t));
        assert!(h.is_paused());
        assert_eq!(h.on_run_end(&t), RunDecision::Stop);
        assert!(h.is_paused());

        h.start_session(SessionOptions::default()).unwrap();
        assert!(!h.is_paused());
        let t = Tally { n: 0 };
        h.on_run_start(&t);
        assert!(h.before_action(&t, &Bump, ActionContext::new("main")));
    }

    #[test]
    fn unattended_toggle_releases_pause() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(&dir, false);
        let mut t = Tally { n: 0 };
        h.on_run_start(&t);
        h.before_action(&t, &Bump, ActionContext::new("main"));
        t.n = 1;
        assert!(h.after_action(&t));
        assert!(h.is_paused());
        h.enable_unattended_mode();
        assert!(!h.is_paused());
        assert!(h.operator().is_unattended());
    }
}
