//! Full sessions driving the reference card game through the harness.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use invariant_sentinel::cardgame::{
    CardGameDriver, Faults, GameAction, GameState, card_game_invariants,
};
use invariant_sentinel::harness::Harness;
use invariant_sentinel::session::{RunnerOptions, SessionControl, SessionOptions, run_session};

const KNOWN_KINDS: &[&str] = &[
    "zombie-entity",
    "duplicate-id",
    "energy-out-of-bounds",
    "health-above-max",
    "hand-overflow",
    "turn-decreased",
    "turn-skipped",
    "card-count-changed",
    "acted-while-stunned",
    "energy-mismatch",
];

fn harness(dir: &tempfile::TempDir, unattended: bool) -> Harness<GameState, GameAction> {
    let mut config = common::temp_config(dir);
    config.monitor.unattended = unattended;
    Harness::builder(card_game_invariants().unwrap())
        .config(config)
        .build()
        .unwrap()
}

fn options(runs: u64) -> RunnerOptions {
    RunnerOptions {
        session: SessionOptions {
            target_runs: Some(runs),
            settle_delay: Duration::ZERO,
        },
        max_steps_per_run: 5_000,
    }
}

#[test]
fn clean_rules_complete_the_target_without_violations() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, true);
    let mut driver = CardGameDriver::new(11, Faults::default());

    let summary = run_session(&mut driver, &mut h, &SessionControl::new(), options(3)).unwrap();

    assert_eq!(summary.runs_completed, 3);
    assert_eq!(summary.total_violations, 0);
    assert_eq!(summary.stop_reason, "target reached");
    assert_eq!(summary.internal_failures, 0);
    assert!(summary.total_steps > 0);
    assert!(h.violations().all().unwrap().is_empty());
    assert_eq!(h.store().run_count().unwrap(), 3);

    let p1 = h.store().subject_stats("P1").unwrap().unwrap();
    let p2 = h.store().subject_stats("P2").unwrap().unwrap();
    assert_eq!(p1.runs, 3);
    assert_eq!(p2.runs, 3);
    assert_eq!(p1.wins + p2.wins + p1.draws, 3);
}

#[test]
fn injected_faults_are_caught_and_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, true);
    let mut driver = CardGameDriver::new(5, Faults::all(0.3));

    let summary = run_session(&mut driver, &mut h, &SessionControl::new(), options(2)).unwrap();
    assert_eq!(summary.runs_completed, 2);
    assert!(summary.total_violations > 0);

    let records = h.violations().all().unwrap();
    assert!(!records.is_empty());
    let occurrences: u64 = records.iter().map(|r| r.occurrence_count).sum();
    assert_eq!(occurrences, summary.total_violations);
    assert!(
        (records.len() as u64) < summary.total_violations,
        "recurring defects should share fingerprints"
    );
    for record in &records {
        assert!(KNOWN_KINDS.contains(&record.kind.as_str()), "unexpected kind {}", record.kind);
        assert!(record.fingerprint.starts_with(&format!("{}:", record.kind)));
    }
}

#[test]
fn same_seed_yields_the_same_fingerprints() {
    let fingerprints = |seed: u64| -> BTreeSet<String> {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(&dir, true);
        let mut driver = CardGameDriver::new(seed, Faults::all(0.2));
        run_session(&mut driver, &mut h, &SessionControl::new(), options(1)).unwrap();
        h.violations()
            .all()
            .unwrap()
            .into_iter()
            .map(|r| r.fingerprint)
            .collect()
    };
    assert_eq!(fingerprints(77), fingerprints(77));
}

#[test]
fn step_bound_turns_runs_into_timeouts() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, true);
    let mut driver = CardGameDriver::new(3, Faults::default());
    let opts = RunnerOptions {
        max_steps_per_run: 5,
        ..options(2)
    };

    let summary = run_session(&mut driver, &mut h, &SessionControl::new(), opts).unwrap();
    assert_eq!(summary.runs_completed, 2);
    assert_eq!(summary.outcomes.get("timeout"), Some(&2));
    assert!(summary.wins_by_participant.is_empty());
    for run in h.store().get_runs(10).unwrap() {
        assert_eq!(run.steps, 5);
        assert!(run.winner.is_none());
        assert!(run.participants.iter().all(|p| !p.won));
    }
}

#[test]
fn stop_before_the_first_action_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, true);
    let mut driver = CardGameDriver::new(1, Faults::default());
    let control = SessionControl::new();
    control.request_stop("operator");

    let summary = run_session(&mut driver, &mut h, &control, options(5)).unwrap();
    assert_eq!(summary.stop_reason, "operator");
    assert_eq!(summary.runs_completed, 0);
    assert_eq!(h.store().run_count().unwrap(), 0);
}

#[test]
fn attended_session_waits_for_resume_requests() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, false);
    let faults = Faults {
        rate: 0.2,
        skip_turns: true,
        ..Faults::default()
    };
    let mut driver = CardGameDriver::new(21, faults);
    let control = SessionControl::new();

    let done = Arc::new(AtomicBool::new(false));
    let operator = {
        let control = control.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut resumes = 0_u32;
            while !done.load(Ordering::SeqCst) {
                control.request_resume();
                resumes += 1;
                thread::sleep(Duration::from_millis(5));
            }
            resumes
        })
    };

    let summary = run_session(&mut driver, &mut h, &control, options(1)).unwrap();
    done.store(true, Ordering::SeqCst);
    assert!(operator.join().unwrap() > 0);

    assert_eq!(summary.runs_completed, 1);
    assert!(summary.total_violations > 0);
    assert_eq!(summary.stop_reason, "target reached");
    let kinds: BTreeSet<String> = h
        .violations()
        .all()
        .unwrap()
        .into_iter()
        .map(|r| r.kind)
        .collect();
    assert!(kinds.contains("turn-skipped"));
}
