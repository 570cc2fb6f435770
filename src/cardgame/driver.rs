//! Seeded random player for fuzzing the card game.

#![allow(missing_docs)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cardgame::rules::{Faults, Rules, fuzz_actions, legal_actions};
use crate::cardgame::state::{GameAction, GameState};
use crate::monitor::ActionContext;
use crate::session::{Concludable, Driver, RunConclusion};

/// Chance of ending the turn when something else is possible.
const END_TURN_BIAS: f64 = 0.2;

/// Plays both sides with uniformly random choices from a seeded RNG, so a
/// `(seed, faults)` pair reproduces the same session.
pub struct CardGameDriver {
    rules: Rules,
    rng: StdRng,
    seed: u64,
    rejected: u64,
}

impl CardGameDriver {
    pub fn new(seed: u64, faults: Faults) -> Self {
        Self {
            rules: Rules::new(faults),
            rng: StdRng::seed_from_u64(seed),
            seed,
            rejected: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Actions the rules refused. Only stunned attacks are ever proposed
    /// illegally, so this counts stun checks that held.
    pub fn rejected_actions(&self) -> u64 {
        self.rejected
    }
}

impl Driver<GameState, GameAction> for CardGameDriver {
    fn new_run(&mut self, _run_index: u64) -> GameState {
        self.rules.new_game(&mut self.rng)
    }

    fn next_action(&mut self, state: &GameState) -> Option<(GameAction, ActionContext)> {
        let candidates = if self.rules.faults.stunned_attack {
            fuzz_actions(state)
        } else {
            legal_actions(state)
        };
        let (end_turn, others): (Vec<GameAction>, Vec<GameAction>) = candidates
            .into_iter()
            .partition(|a| matches!(a, GameAction::EndTurn { .. }));

        let action = if others.is_empty() || self.rng.random_bool(END_TURN_BIAS) {
            *end_turn.first()?
        } else {
            others[self.rng.random_range(0..others.len())]
        };
        let context = ActionContext::new(format!("turn {}", state.turn))
            .actor(state.players[action.player()].name.as_str());
        Some((action, context))
    }

    fn apply(&mut self, state: &mut GameState, action: &GameAction) {
        if self.rules.apply(state, action, &mut self.rng).is_err() {
            self.rejected += 1;
        }
    }

    fn conclude(&mut self, state: &GameState) -> RunConclusion {
        state.conclude()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_out(driver: &mut CardGameDriver, max_steps: usize) -> (GameState, Vec<GameAction>) {
        let mut state = driver.new_run(0);
        let mut actions = Vec::new();
        while let Some((action, _)) = driver.next_action(&state) {
            if actions.len() >= max_steps {
                break;
            }
            driver.apply(&mut state, &action);
            actions.push(action);
        }
        (state, actions)
    }

    #[test]
    fn same_seed_replays_the_same_game() {
        let (a_state, a_actions) = play_out(&mut CardGameDriver::new(42, Faults::default()), 500);
        let (b_state, b_actions) = play_out(&mut CardGameDriver::new(42, Faults::default()), 500);
        assert_eq!(a_actions, b_actions);
        assert_eq!(a_state, b_state);
    }

    #[test]
    fn clean_rules_reject_nothing_and_finish() {
        let mut driver = CardGameDriver::new(9, Faults::default());
        let (state, _) = play_out(&mut driver, 5_000);
        assert_eq!(driver.rejected_actions(), 0);
        assert!(state.is_over(), "fatigue guarantees the game ends");
        assert!(driver.next_action(&state).is_none());
    }

    #[test]
    fn context_names_the_acting_player() {
        let mut driver = CardGameDriver::new(1, Faults::default());
        let state = driver.new_run(0);
        let (action, context) = driver.next_action(&state).unwrap();
        assert_eq!(action.player(), 0);
        assert_eq!(context.actor.as_deref(), Some("P1"));
        assert_eq!(context.phase, "turn 1");
    }
}
