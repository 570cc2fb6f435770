//! Convenience loop that drives a [`Driver`] through a whole session.

#![allow(missing_docs)]

use crate::core::errors::{Result, SentinelError};
use crate::harness::Harness;
use crate::monitor::{ActionContext, ActionLike};
use crate::session::control::{POLL_INTERVAL, SessionControl};
use crate::session::orchestrator::{RunConclusion, RunDecision, SessionOptions};
use crate::session::summary::SessionSummary;
use crate::snapshot::Capture;
use crate::store::RunOutcome;

/// Default safety bound on actions per run.
pub const DEFAULT_MAX_STEPS: u64 = 2_000;

/// The subject side of a session: builds runs, proposes and applies actions.
pub trait Driver<S, A> {
    /// Fresh initial state for run `run_index`.
    fn new_run(&mut self, run_index: u64) -> S;

    /// Next action to apply, or `None` once the run is over.
    fn next_action(&mut self, state: &S) -> Option<(A, ActionContext)>;

    fn apply(&mut self, state: &mut S, action: &A);

    fn conclude(&mut self, state: &S) -> RunConclusion;
}

/// Loop limits for [`run_session`].
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub session: SessionOptions,
    pub max_steps_per_run: u64,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            max_steps_per_run: DEFAULT_MAX_STEPS,
        }
    }
}

enum RunEnd {
    Finished(RunConclusion),
    Aborted,
}

/// Drive `driver` run after run until the session stops.
///
/// A run that hits `max_steps_per_run` ends as a timeout. A stop requested
/// mid-run discards that run; nothing partial is persisted.
pub fn run_session<S, A, D>(
    driver: &mut D,
    harness: &mut Harness<S, A>,
    control: &SessionControl,
    options: RunnerOptions,
) -> Result<SessionSummary>
where
    S: Capture,
    A: ActionLike + Clone,
    D: Driver<S, A>,
{
    let mut decision = harness.start_session(options.session)?;

    loop {
        match decision {
            RunDecision::Stop => break,
            RunDecision::Wait => match wait_for_resume(harness, control) {
                Some(next) => decision = next,
                None => break,
            },
            RunDecision::StartRun | RunDecision::NextRun { .. } => {
                if let RunDecision::NextRun { settle } = decision {
                    if !control.sleep(settle) {
                        break;
                    }
                }
                match drive_run(driver, harness, control, options.max_steps_per_run) {
                    RunEnd::Finished(conclusion) => {
                        decision = harness.on_run_end_with(conclusion);
                    }
                    RunEnd::Aborted => {
                        harness.abort_run();
                        break;
                    }
                }
            }
        }
        if control.should_stop() {
            break;
        }
    }

    let reason = control
        .stop_reason()
        .unwrap_or_else(|| "target reached".to_string());
    harness
        .stop_session(&reason)
        .ok_or_else(|| SentinelError::Lifecycle {
            details: "session ended without a summary".to_string(),
        })
}

fn drive_run<S, A, D>(
    driver: &mut D,
    harness: &mut Harness<S, A>,
    control: &SessionControl,
    max_steps: u64,
) -> RunEnd
where
    S: Capture,
    A: ActionLike + Clone,
    D: Driver<S, A>,
{
    let mut state = driver.new_run(harness.next_run_index());
    harness.on_run_start(&state);
    let mut steps = 0_u64;

    while let Some((action, context)) = driver.next_action(&state) {
        if steps >= max_steps {
            let mut conclusion = driver.conclude(&state);
            conclusion.outcome = RunOutcome::Timeout;
            conclusion.winner = None;
            for p in &mut conclusion.participants {
                p.won = false;
            }
            return RunEnd::Finished(conclusion);
        }
        loop {
            if control.should_stop() || !wait_for_gate(harness, control) {
                return RunEnd::Aborted;
            }
            if harness.before_action(&state, &action, context.clone()) {
                break;
            }
        }
        driver.apply(&mut state, &action);
        harness.after_action(&state);
        steps += 1;
    }

    RunEnd::Finished(driver.conclude(&state))
}

/// Block while the monitor is paused. Returns `false` if a stop arrived.
fn wait_for_gate<S, A>(harness: &mut Harness<S, A>, control: &SessionControl) -> bool
where
    S: Capture,
    A: ActionLike + Clone,
{
    while harness.is_paused() {
        if control.should_stop() {
            return false;
        }
        if control.take_resume_request() {
            harness.resume();
            continue;
        }
        harness.operator().wait_while_paused_for(POLL_INTERVAL);
    }
    true
}

/// Wait out a paused session. `None` means stop.
///
/// A paused session only withholds the next run, so there is no gate to
/// block on; poll the control for a resume request instead.
fn wait_for_resume<S, A>(
    harness: &mut Harness<S, A>,
    control: &SessionControl,
) -> Option<RunDecision>
where
    S: Capture,
    A: ActionLike + Clone,
{
    loop {
        if control.take_resume_request() || !harness.is_session_paused() {
            return Some(harness.resume());
        }
        if !control.sleep(POLL_INTERVAL) {
            return None;
        }
    }
}
