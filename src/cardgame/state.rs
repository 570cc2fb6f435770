//! Card-game state: two heroes, their decks, hands, discard piles and boards.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::monitor::ActionLike;
use crate::session::{Concludable, RunConclusion};
use crate::snapshot::Capture;
use crate::store::{ParticipantSummary, RunOutcome};

pub const STARTING_HP: i32 = 30;
pub const MAX_ENERGY: u32 = 10;
pub const MAX_HAND: usize = 10;
pub const MAX_BOARD: usize = 7;
pub const OPENING_HAND: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "effect", content = "amount")]
pub enum Spell {
    Damage(i32),
    Heal(i32),
    Stun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Minion { attack: i32, hp: i32 },
    Spell(Spell),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: u32,
    pub name: String,
    pub cost: u32,
    pub kind: CardKind,
}

/// A summoned card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minion {
    pub id: u32,
    pub name: String,
    pub attack: i32,
    pub hp: i32,
    pub max_hp: i32,
    /// Summoned this turn or already attacked.
    pub exhausted: bool,
    /// Cannot attack until its controller's turn ends.
    pub stunned: bool,
    /// The card the minion returns to the discard pile as.
    pub card: Card,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    pub kills: u64,
    pub deaths: u64,
    pub damage_dealt: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub energy: u32,
    pub max_energy: u32,
    pub fatigue: i32,
    pub deck: Vec<Card>,
    pub hand: Vec<Card>,
    pub discard: Vec<Card>,
    pub board: Vec<Minion>,
    pub stats: CombatStats,
}

impl Player {
    pub fn new(name: impl Into<String>, deck: Vec<Card>) -> Self {
        Self {
            name: name.into(),
            hp: STARTING_HP,
            max_hp: STARTING_HP,
            energy: 0,
            max_energy: 0,
            fatigue: 0,
            deck,
            hand: Vec::new(),
            discard: Vec::new(),
            board: Vec::new(),
            stats: CombatStats::default(),
        }
    }

    /// Cards this player owns across every zone.
    pub fn card_total(&self) -> usize {
        self.deck.len() + self.hand.len() + self.discard.len() + self.board.len()
    }

    pub fn minion(&self, id: u32) -> Option<&Minion> {
        self.board.iter().find(|m| m.id == id)
    }

    pub fn hand_card(&self, id: u32) -> Option<&Card> {
        self.hand.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Main,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub turn: u32,
    pub phase: GamePhase,
    /// Index into `players` of the player whose turn it is.
    pub active: usize,
    pub players: Vec<Player>,
    pub next_entity_id: u32,
    pub winner: Option<String>,
}

impl GameState {
    pub fn active_player(&self) -> &Player {
        &self.players[self.active]
    }

    pub fn opponent_index(&self) -> usize {
        1 - self.active
    }

    pub fn is_over(&self) -> bool {
        self.phase == GamePhase::Ended
    }
}

impl Capture for GameState {
    fn try_deep_copy(&self) -> Option<Self> {
        Some(self.clone())
    }
}

impl Concludable for GameState {
    fn conclude(&self) -> RunConclusion {
        let outcome = match (&self.phase, &self.winner) {
            (GamePhase::Ended, Some(_)) => RunOutcome::Win,
            (GamePhase::Ended, None) => RunOutcome::Draw,
            (GamePhase::Main, _) => RunOutcome::Timeout,
        };
        let participants = self
            .players
            .iter()
            .map(|p| ParticipantSummary {
                subject_id: p.name.clone(),
                won: self.winner.as_deref() == Some(p.name.as_str()),
                kills: p.stats.kills,
                deaths: p.stats.deaths,
                damage_dealt: p.stats.damage_dealt,
                final_health: i64::from(p.hp),
            })
            .collect();
        RunConclusion {
            outcome,
            winner: self.winner.clone(),
            participants,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Target {
    Hero(usize),
    Minion(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum GameAction {
    PlayCard {
        player: usize,
        card_id: u32,
        target: Option<Target>,
    },
    Attack {
        player: usize,
        attacker: u32,
        target: Target,
    },
    EndTurn {
        player: usize,
    },
}

impl GameAction {
    pub fn player(&self) -> usize {
        match *self {
            Self::PlayCard { player, .. }
            | Self::Attack { player, .. }
            | Self::EndTurn { player } => {
                player
            }
        }
    }
}

impl ActionLike for GameAction {
    fn label(&self) -> String {
        match self {
            Self::PlayCard { .. } => "play_card",
            Self::Attack { .. } => "attack",
            Self::EndTurn { .. } => "end_turn",
        }
        .to_string()
    }
}
