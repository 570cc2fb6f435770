//! State capture: structural deep copy with a serde round-trip fallback.
//!
//! A snapshot owns its data outright. Nothing in it may alias the live state,
//! so later mutation of the subject can never rewrite what an invariant saw.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::errors::{Result, SentinelError};

/// Subject state that the harness can snapshot.
///
/// `try_deep_copy` is the fast, full-fidelity path. Return `None` when the
/// state holds something that cannot be copied structurally (shared handles,
/// interior caches); the engine then round-trips through `serde_json` and
/// flags the snapshot as degraded.
pub trait Capture: Serialize + DeserializeOwned {
    fn try_deep_copy(&self) -> Option<Self>;
}

impl Capture for serde_json::Value {
    fn try_deep_copy(&self) -> Option<Self> {
        Some(self.clone())
    }
}

/// Immutable copy of subject state at one instant.
#[derive(Debug, Clone)]
pub struct StateSnapshot<S> {
    state: S,
    captured_at: DateTime<Utc>,
    degraded: bool,
}

impl<S> StateSnapshot<S> {
    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// True when the copy came from the serialization fallback.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn into_state(self) -> S {
        self.state
    }
}

/// Take an independent copy of `state`.
pub fn snapshot<S: Capture>(state: &S) -> Result<StateSnapshot<S>> {
    if let Some(copy) = state.try_deep_copy() {
        return Ok(StateSnapshot {
            state: copy,
            captured_at: Utc::now(),
            degraded: false,
        });
    }

    eprintln!(
        "[SEN-SNAPSHOT] WARNING: structural copy unavailable for {}, using serialization fallback",
        std::any::type_name::<S>()
    );
    let copy = round_trip(state)?;
    Ok(StateSnapshot {
        state: copy,
        captured_at: Utc::now(),
        degraded: true,
    })
}

fn round_trip<S: Capture>(state: &S) -> Result<S> {
    let value = serde_json::to_value(state).map_err(|e| SentinelError::Snapshot {
        details: format!("serialize fallback failed: {e}"),
    })?;
    serde_json::from_value(value).map_err(|e| SentinelError::Snapshot {
        details: format!("deserialize fallback failed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Board {
        turn: u32,
        hp: Vec<i32>,
        names: Vec<String>,
    }

    impl Capture for Board {
        fn try_deep_copy(&self) -> Option<Self> {
            Some(self.clone())
        }
    }

    /// Refuses structural copies, forcing the fallback path.
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Opaque {
        counter: u64,
    }

    impl Capture for Opaque {
        fn try_deep_copy(&self) -> Option<Self> {
            None
        }
    }

    #[test]
    fn deep_copy_is_not_degraded() {
        let board = Board {
            turn: 1,
            hp: vec![10, 10],
            names: vec!["a".into(), "b".into()],
        };
        let snap = snapshot(&board).unwrap();
        assert!(!snap.is_degraded());
        assert_eq!(snap.state(), &board);
    }

    #[test]
    fn fallback_round_trip_marks_degraded() {
        let opaque = Opaque { counter: 7 };
        let snap = snapshot(&opaque).unwrap();
        assert!(snap.is_degraded());
        assert_eq!(snap.state().counter, 7);
    }

    #[test]
    fn json_values_snapshot_structurally() {
        let mut live = serde_json::json!({"turn": 3, "players": [{"hp": 5}]});
        let snap = snapshot(&live).unwrap();
        live["players"][0]["hp"] = serde_json::json!(0);
        assert_eq!(snap.state()["players"][0]["hp"], 5);
    }

    proptest! {
        #[test]
        fn mutating_live_state_never_changes_snapshot(
            turn in 0u32..1000,
            hp in prop::collection::vec(-50i32..50, 0..8),
            delta in 1i32..20,
        ) {
            let mut live = Board { turn, hp: hp.clone(), names: vec!["p".into(); hp.len()] };
            let snap = snapshot(&live).unwrap();

            live.turn += 1;
            for h in &mut live.hp {
                *h -= delta;
            }
            live.hp.push(99);
            for n in &mut live.names {
                n.push('!');
            }

            prop_assert_eq!(snap.state().turn, turn);
            prop_assert_eq!(&snap.state().hp, &hp);
            prop_assert!(snap.state().names.iter().all(|n| n == "p"));
        }
    }
}
