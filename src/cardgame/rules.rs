//! Card-game rules engine, with optional injected faults.
//!
//! The faults reproduce classic bookkeeping bugs so the invariant pack has
//! something to find during fuzzing. Each enabled fault fires with
//! probability `Faults::rate` at every opportunity.

#![allow(missing_docs)]

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::cardgame::state::{
    Card, CardKind, GameAction, GamePhase, GameState, MAX_BOARD, MAX_ENERGY, MAX_HAND, Minion,
    OPENING_HAND, Player, Spell, Target,
};

/// Rejected actions. Drivers that only choose from [`legal_actions`] never
/// see these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalAction {
    #[error("the game is over")]
    GameOver,
    #[error("player {0} is not the active player")]
    NotYourTurn(usize),
    #[error("card {0} is not in hand")]
    NoSuchCard(u32),
    #[error("card costs {cost} but only {energy} energy is available")]
    NotEnoughEnergy { cost: u32, energy: u32 },
    #[error("the board is full")]
    BoardFull,
    #[error("minion {0} cannot attack")]
    CannotAttack(u32),
    #[error("invalid target {0:?}")]
    BadTarget(Target),
}

/// Bug switches for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Faults {
    /// Chance that an enabled fault fires when it has the opportunity.
    pub rate: f64,
    /// Dead minions stay on the board.
    pub leave_dead_minions: bool,
    /// Ending a turn advances the counter by two.
    pub skip_turns: bool,
    /// Spells are cast without paying energy.
    pub free_spells: bool,
    /// Draws ignore the hand limit.
    pub ignore_hand_limit: bool,
    /// Stunned minions may still attack.
    pub stunned_attack: bool,
    /// Summons reuse the last entity id.
    pub reuse_entity_ids: bool,
    /// Heals ignore max health.
    pub overheal: bool,
    /// Cast spells vanish instead of going to the discard pile.
    pub lose_spent_spells: bool,
}

impl Faults {
    /// Every fault enabled at `rate`.
    pub fn all(rate: f64) -> Self {
        Self {
            rate,
            leave_dead_minions: true,
            skip_turns: true,
            free_spells: true,
            ignore_hand_limit: true,
            stunned_attack: true,
            reuse_entity_ids: true,
            overheal: true,
            lose_spent_spells: true,
        }
    }

    fn fires<R: Rng>(&self, enabled: bool, rng: &mut R) -> bool {
        enabled && self.rate > 0.0 && rng.random_bool(self.rate.clamp(0.0, 1.0))
    }
}

const CARD_POOL: &[(&str, u32, CardKind)] = &[
    ("Squire", 1, CardKind::Minion { attack: 1, hp: 2 }),
    ("Raider", 2, CardKind::Minion { attack: 3, hp: 1 }),
    ("Shieldbearer", 3, CardKind::Minion { attack: 2, hp: 5 }),
    ("Ogre", 5, CardKind::Minion { attack: 5, hp: 6 }),
    ("Spark", 1, CardKind::Spell(Spell::Damage(2))),
    ("Fireball", 4, CardKind::Spell(Spell::Damage(6))),
    ("Mend", 2, CardKind::Spell(Spell::Heal(4))),
    ("Daze", 2, CardKind::Spell(Spell::Stun)),
];

pub const DECK_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, Default)]
pub struct Rules {
    pub faults: Faults,
}

impl Rules {
    pub fn new(faults: Faults) -> Self {
        Self { faults }
    }

    /// A shuffled two-player game with opening hands dealt and P1 to act.
    pub fn new_game<R: Rng>(&self, rng: &mut R) -> GameState {
        let mut next_id = 1;
        let mut players = Vec::with_capacity(2);
        for name in ["P1", "P2"] {
            let mut deck: Vec<Card> = (0..DECK_SIZE)
                .map(|i| {
                    let (card_name, cost, kind) = CARD_POOL[i % CARD_POOL.len()];
                    let card = Card {
                        id: next_id,
                        name: card_name.to_string(),
                        cost,
                        kind,
                    };
                    next_id += 1;
                    card
                })
                .collect();
            deck.shuffle(rng);
            players.push(Player::new(name, deck));
        }

        let mut state = GameState {
            turn: 1,
            phase: GamePhase::Main,
            active: 0,
            players,
            next_entity_id: next_id,
            winner: None,
        };
        for idx in 0..2 {
            for _ in 0..OPENING_HAND {
                self.draw(&mut state, idx, rng);
            }
        }
        self.start_turn(&mut state, rng);
        state
    }

    /// Apply one action.
    pub fn apply<R: Rng>(
        &self,
        state: &mut GameState,
        action: &GameAction,
        rng: &mut R,
    ) -> Result<(), IllegalAction> {
        if state.is_over() {
            return Err(IllegalAction::GameOver);
        }
        if action.player() != state.active {
            return Err(IllegalAction::NotYourTurn(action.player()));
        }
        match *action {
            GameAction::PlayCard {
                player,
                card_id,
                target,
            } => self.play_card(state, player, card_id, target, rng)?,
            GameAction::Attack {
                player,
                attacker,
                target,
            } => self.attack(state, player, attacker, target, rng)?,
            GameAction::EndTurn { player } => self.end_turn(state, player, rng),
        }
        self.resolve_deaths(state, rng);
        Ok(())
    }

    fn play_card<R: Rng>(
        &self,
        state: &mut GameState,
        player: usize,
        card_id: u32,
        target: Option<Target>,
        rng: &mut R,
    ) -> Result<(), IllegalAction> {
        let pos = state.players[player]
            .hand
            .iter()
            .position(|c| c.id == card_id)
            .ok_or(IllegalAction::NoSuchCard(card_id))?;
        let card = state.players[player].hand[pos].clone();
        let energy = state.players[player].energy;
        if card.cost > energy {
            return Err(IllegalAction::NotEnoughEnergy {
                cost: card.cost,
                energy,
            });
        }

        match card.kind {
            CardKind::Minion { attack, hp } => {
                if state.players[player].board.len() >= MAX_BOARD {
                    return Err(IllegalAction::BoardFull);
                }
                let id = if self.faults.fires(self.faults.reuse_entity_ids, rng) {
                    state.next_entity_id.saturating_sub(1)
                } else {
                    let id = state.next_entity_id;
                    state.next_entity_id += 1;
                    id
                };
                let p = &mut state.players[player];
                p.hand.remove(pos);
                p.energy -= card.cost;
                p.board.push(Minion {
                    id,
                    name: card.name.clone(),
                    attack,
                    hp,
                    max_hp: hp,
                    exhausted: true,
                    stunned: false,
                    card,
                });
            }
            CardKind::Spell(spell) => {
                let target = validate_spell_target(state, player, spell, target)?;
                let p = &mut state.players[player];
                p.hand.remove(pos);
                if !self.faults.fires(self.faults.free_spells, rng) {
                    p.energy -= card.cost;
                }
                self.cast(state, player, spell, target, rng);
                if !self.faults.fires(self.faults.lose_spent_spells, rng) {
                    state.players[player].discard.push(card);
                }
            }
        }
        Ok(())
    }

    fn cast<R: Rng>(
        &self,
        state: &mut GameState,
        caster: usize,
        spell: Spell,
        target: Target,
        rng: &mut R,
    ) {
        match spell {
            Spell::Damage(amount) => deal_damage(state, caster, target, amount),
            Spell::Heal(amount) => {
                let overheal = self.faults.fires(self.faults.overheal, rng);
                let heal = |hp: &mut i32, max: i32| {
                    *hp = if overheal { *hp + amount } else { (*hp + amount).min(max) };
                };
                match target {
                    Target::Hero(idx) => {
                        let p = &mut state.players[idx];
                        heal(&mut p.hp, p.max_hp);
                    }
                    Target::Minion(id) => {
                        if let Some(m) = find_minion_mut(state, id) {
                            heal(&mut m.hp, m.max_hp);
                        }
                    }
                }
            }
            Spell::Stun => {
                if let Target::Minion(id) = target {
                    if let Some(m) = find_minion_mut(state, id) {
                        m.stunned = true;
                    }
                }
            }
        }
    }

    fn attack<R: Rng>(
        &self,
        state: &mut GameState,
        player: usize,
        attacker: u32,
        target: Target,
        rng: &mut R,
    ) -> Result<(), IllegalAction> {
        let minion = state.players[player]
            .minion(attacker)
            .ok_or(IllegalAction::CannotAttack(attacker))?;
        let stun_ignored = minion.stunned && self.faults.fires(self.faults.stunned_attack, rng);
        if minion.exhausted || (minion.stunned && !stun_ignored) {
            return Err(IllegalAction::CannotAttack(attacker));
        }
        let power = minion.attack;
        let enemy = 1 - player;
        match target {
            Target::Hero(idx) if idx == enemy => {}
            Target::Minion(id) if state.players[enemy].minion(id).is_some() => {}
            other => return Err(IllegalAction::BadTarget(other)),
        }

        deal_damage(state, player, target, power);
        if let Target::Minion(id) = target {
            let retaliation = state.players[enemy].minion(id).map_or(0, |m| m.attack);
            deal_damage(state, enemy, Target::Minion(attacker), retaliation);
        }
        if let Some(m) = state.players[player].board.iter_mut().find(|m| m.id == attacker) {
            m.exhausted = true;
        }
        Ok(())
    }

    fn end_turn<R: Rng>(&self, state: &mut GameState, player: usize, rng: &mut R) {
        for m in &mut state.players[player].board {
            m.stunned = false;
        }
        let advance = if self.faults.fires(self.faults.skip_turns, rng) {
            2
        } else {
            1
        };
        state.turn += advance;
        state.active = 1 - player;
        self.start_turn(state, rng);
    }

    fn start_turn<R: Rng>(&self, state: &mut GameState, rng: &mut R) {
        let idx = state.active;
        {
            let p = &mut state.players[idx];
            p.max_energy = (p.max_energy + 1).min(MAX_ENERGY);
            p.energy = p.max_energy;
            for m in &mut p.board {
                m.exhausted = false;
            }
        }
        self.draw(state, idx, rng);
    }

    fn draw<R: Rng>(&self, state: &mut GameState, idx: usize, rng: &mut R) {
        let ignore_limit = self.faults.fires(self.faults.ignore_hand_limit, rng);
        let p = &mut state.players[idx];
        match p.deck.pop() {
            Some(card) if p.hand.len() < MAX_HAND || ignore_limit => p.hand.push(card),
            Some(card) => p.discard.push(card),
            None => {
                p.fatigue += 1;
                p.hp -= p.fatigue;
            }
        }
    }

    /// Move dead minions to their owner's discard pile and end the game when a
    /// hero falls.
    fn resolve_deaths<R: Rng>(&self, state: &mut GameState, rng: &mut R) {
        for idx in 0..state.players.len() {
            if self.faults.fires(self.faults.leave_dead_minions, rng) {
                continue;
            }
            let (dead, alive): (Vec<Minion>, Vec<Minion>) =
                std::mem::take(&mut state.players[idx].board)
                    .into_iter()
                    .partition(|m| m.hp <= 0);
            let p = &mut state.players[idx];
            p.board = alive;
            p.stats.deaths += dead.len() as u64;
            p.discard.extend(dead.into_iter().map(|m| m.card));
        }

        let fallen: Vec<bool> = state.players.iter().map(|p| p.hp <= 0).collect();
        match (fallen[0], fallen[1]) {
            (false, false) => {}
            (true, true) => {
                state.phase = GamePhase::Ended;
                state.winner = None;
            }
            (a_fell, _) => {
                state.phase = GamePhase::Ended;
                let winner = usize::from(a_fell);
                state.winner = Some(state.players[winner].name.clone());
            }
        }
    }
}

fn validate_spell_target(
    state: &GameState,
    caster: usize,
    spell: Spell,
    target: Option<Target>,
) -> Result<Target, IllegalAction> {
    let enemy = 1 - caster;
    let target = target.ok_or(IllegalAction::BadTarget(Target::Hero(enemy)))?;
    let ok = match (spell, target) {
        (Spell::Damage(_), Target::Hero(idx)) => idx == enemy,
        (Spell::Damage(_) | Spell::Stun, Target::Minion(id)) => {
            state.players[enemy].minion(id).is_some()
        }
        (Spell::Heal(_), Target::Hero(idx)) => idx == caster,
        (Spell::Heal(_), Target::Minion(id)) => state.players[caster].minion(id).is_some(),
        (Spell::Stun, Target::Hero(_)) => false,
    };
    if ok { Ok(target) } else { Err(IllegalAction::BadTarget(target)) }
}

fn find_minion_mut(state: &mut GameState, id: u32) -> Option<&mut Minion> {
    state
        .players
        .iter_mut()
        .flat_map(|p| p.board.iter_mut())
        .find(|m| m.id == id)
}

/// Damage `target` on behalf of `source`, crediting kills and damage.
fn deal_damage(state: &mut GameState, source: usize, target: Target, amount: i32) {
    if amount <= 0 {
        return;
    }
    let dealt = u64::try_from(amount).unwrap_or(0);
    let killed = match target {
        Target::Hero(idx) => {
            state.players[idx].hp -= amount;
            false
        }
        Target::Minion(id) => match find_minion_mut(state, id) {
            Some(m) => {
                let was_alive = m.hp > 0;
                m.hp -= amount;
                was_alive && m.hp <= 0
            }
            None => return,
        },
    };
    let stats = &mut state.players[source].stats;
    stats.damage_dealt += dealt;
    if killed {
        stats.kills += 1;
    }
}

/// Every action the active player may take right now.
pub fn legal_actions(state: &GameState) -> Vec<GameAction> {
    candidate_actions(state, false)
}

/// Legal actions plus attacks by stunned minions, which only succeed when
/// the stun fault fires.
pub fn fuzz_actions(state: &GameState) -> Vec<GameAction> {
    candidate_actions(state, true)
}

fn candidate_actions(state: &GameState, include_stunned: bool) -> Vec<GameAction> {
    if state.is_over() {
        return Vec::new();
    }
    let me = state.active;
    let enemy = state.opponent_index();
    let player = &state.players[me];
    let foe = &state.players[enemy];
    let mut actions = Vec::new();

    for card in player.hand.iter().filter(|c| c.cost <= player.energy) {
        match card.kind {
            CardKind::Minion { .. } if player.board.len() < MAX_BOARD => {
                actions.push(GameAction::PlayCard {
                    player: me,
                    card_id: card.id,
                    target: None,
                });
            }
            CardKind::Minion { .. } => {}
            CardKind::Spell(spell) => {
                let targets: Vec<Target> = match spell {
                    Spell::Damage(_) => std::iter::once(Target::Hero(enemy))
                        .chain(foe.board.iter().map(|m| Target::Minion(m.id)))
                        .collect(),
                    Spell::Heal(_) => std::iter::once(Target::Hero(me))
                        .chain(player.board.iter().map(|m| Target::Minion(m.id)))
                        .collect(),
                    Spell::Stun => foe.board.iter().map(|m| Target::Minion(m.id)).collect(),
                };
                actions.extend(targets.into_iter().map(|t| GameAction::PlayCard {
                    player: me,
                    card_id: card.id,
                    target: Some(t),
                }));
            }
        }
    }

    let ready = |m: &&Minion| !m.exhausted && (include_stunned || !m.stunned) && m.hp > 0;
    for minion in player.board.iter().filter(ready) {
        actions.push(GameAction::Attack {
            player: me,
            attacker: minion.id,
            target: Target::Hero(enemy),
        });
        for defender in foe.board.iter().filter(|d| d.hp > 0) {
            actions.push(GameAction::Attack {
                player: me,
                attacker: minion.id,
                target: Target::Minion(defender.id),
            });
        }
    }

    actions.push(GameAction::EndTurn { player: me });
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn new_game_deals_opening_hands() {
        let mut r = rng();
        let state = Rules::default().new_game(&mut r);
        assert_eq!(state.turn, 1);
        assert_eq!(state.players[0].hand.len(), OPENING_HAND + 1);
        assert_eq!(state.players[1].hand.len(), OPENING_HAND);
        assert_eq!(state.players[0].energy, 1);
        for p in &state.players {
            assert_eq!(p.card_total(), DECK_SIZE);
        }
    }

    #[test]
    fn end_turn_advances_by_one_and_swaps_player() {
        let mut r = rng();
        let rules = Rules::default();
        let mut state = rules.new_game(&mut r);
        rules.apply(&mut state, &GameAction::EndTurn { player: 0 }, &mut r).unwrap();
        assert_eq!(state.turn, 2);
        assert_eq!(state.active, 1);
        assert_eq!(state.players[1].energy, 1);
        assert_eq!(
            rules.apply(&mut state, &GameAction::EndTurn { player: 0 }, &mut r),
            Err(IllegalAction::NotYourTurn(0))
        );
    }

    #[test]
    fn legal_actions_always_apply_cleanly_without_faults() {
        let mut r = rng();
        let rules = Rules::default();
        let mut state = rules.new_game(&mut r);
        for _ in 0..400 {
            let actions = legal_actions(&state);
            if actions.is_empty() {
                break;
            }
            let pick = actions[r.random_range(0..actions.len())];
            rules.apply(&mut state, &pick, &mut r).unwrap();
            for p in &state.players {
                assert_eq!(p.card_total(), DECK_SIZE);
                assert!(p.board.iter().all(|m| m.hp > 0));
                assert!(p.hand.len() <= MAX_HAND);
            }
        }
    }

    #[test]
    fn dead_minions_go_to_discard_and_credit_the_killer() {
        let mut r = rng();
        let rules = Rules::default();
        let mut state = rules.new_game(&mut r);
        let card = Card {
            id: 900,
            name: "Squire".to_string(),
            cost: 1,
            kind: CardKind::Minion { attack: 1, hp: 2 },
        };
        state.players[1].board.push(Minion {
            id: 901,
            name: "Squire".to_string(),
            attack: 1,
            hp: 2,
            max_hp: 2,
            exhausted: false,
            stunned: false,
            card,
        });
        state.players[0].hand.push(Card {
            id: 902,
            name: "Fireball".to_string(),
            cost: 0,
            kind: CardKind::Spell(Spell::Damage(6)),
        });
        let action = GameAction::PlayCard {
            player: 0,
            card_id: 902,
            target: Some(Target::Minion(901)),
        };
        rules.apply(&mut state, &action, &mut r).unwrap();
        assert!(state.players[1].board.is_empty());
        assert_eq!(state.players[1].stats.deaths, 1);
        assert_eq!(state.players[0].stats.kills, 1);
        assert!(state.players[1].discard.iter().any(|c| c.id == 900));
        assert!(state.players[0].discard.iter().any(|c| c.id == 902));
    }

    #[test]
    fn skip_turn_fault_advances_two() {
        let mut r = rng();
        let rules = Rules::new(Faults {
            rate: 1.0,
            skip_turns: true,
            ..Faults::default()
        });
        let mut state = rules.new_game(&mut r);
        rules.apply(&mut state, &GameAction::EndTurn { player: 0 }, &mut r).unwrap();
        assert_eq!(state.turn, 3);
    }

    #[test]
    fn hero_death_ends_the_game() {
        let mut r = rng();
        let rules = Rules::default();
        let mut state = rules.new_game(&mut r);
        state.players[1].hp = 2;
        state.players[0].hand.push(Card {
            id: 950,
            name: "Spark".to_string(),
            cost: 0,
            kind: CardKind::Spell(Spell::Damage(2)),
        });
        let action = GameAction::PlayCard {
            player: 0,
            card_id: 950,
            target: Some(Target::Hero(1)),
        };
        rules.apply(&mut state, &action, &mut r).unwrap();
        assert!(state.is_over());
        assert_eq!(state.winner.as_deref(), Some("P1"));
        assert!(legal_actions(&state).is_empty());
    }
}
