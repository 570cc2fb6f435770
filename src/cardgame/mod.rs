//! Reference subject: a two-player card game with injectable rule bugs.
//!
//! Used by the `sentinel fuzz` command and the integration tests to exercise
//! the harness end to end.

pub mod driver;
pub mod invariants;
pub mod rules;
pub mod state;

pub use driver::CardGameDriver;
pub use invariants::card_game_invariants;
pub use rules::{Faults, IllegalAction, Rules, fuzz_actions, legal_actions};
pub use state::{GameAction, GamePhase, GameState, Player, Target};
