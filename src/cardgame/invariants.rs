//! Invariant pack for the card game.

use std::collections::BTreeMap;

use crate::cardgame::state::{GameAction, GamePhase, GameState, MAX_ENERGY, MAX_HAND};
use crate::core::errors::Result;
use crate::invariants::{Category, Invariant, InvariantRegistry, Severity, Violation};

/// Every card-game invariant, with fix hints for each violation kind.
pub fn card_game_invariants() -> Result<InvariantRegistry<GameState, GameAction>> {
    let mut reg = InvariantRegistry::new();

    reg.register(Invariant::absolute(
        "no-zombies",
        Category::StateCorruption,
        |s: &GameState| Ok(zombies(s)),
    ))?;
    reg.register(Invariant::absolute(
        "unique-entity-ids",
        Category::StateCorruption,
        |s: &GameState| Ok(duplicate_ids(s)),
    ))?;
    reg.register(Invariant::absolute(
        "energy-bounds",
        Category::StateCorruption,
        |s: &GameState| {
            Ok(s.players
                .iter()
                .filter(|p| p.energy > p.max_energy || p.max_energy > MAX_ENERGY)
                .map(|p| {
                    Violation::new(
                        "energy-out-of-bounds",
                        Severity::Medium,
                        format!(
                            "{} has {}/{} energy (cap {MAX_ENERGY})",
                            p.name, p.energy, p.max_energy
                        ),
                    )
                    .identifying("player", p.name.as_str())
                    .detail("energy", p.energy)
                    .detail("max_energy", p.max_energy)
                })
                .collect())
        },
    ))?;
    reg.register(Invariant::absolute(
        "health-cap",
        Category::StateCorruption,
        |s: &GameState| Ok(overhealed(s)),
    ))?;
    reg.register(Invariant::absolute(
        "hand-limit",
        Category::RuleViolation,
        |s: &GameState| {
            Ok(s.players
                .iter()
                .filter(|p| p.hand.len() > MAX_HAND)
                .map(|p| {
                    Violation::new(
                        "hand-overflow",
                        Severity::Low,
                        format!("{} holds {} cards (limit {MAX_HAND})", p.name, p.hand.len()),
                    )
                    .identifying("player", p.name.as_str())
                    .detail("hand_size", p.hand.len())
                })
                .collect())
        },
    ))?;

    reg.register(Invariant::transitional(
        "turn-monotonic",
        Category::RuleViolation,
        |after: &GameState, before: &GameState, _: &GameAction| {
            Ok(turn_progression(before.turn, after.turn).into_iter().collect())
        },
    ))?;
    reg.register(Invariant::transitional(
        "card-conservation",
        Category::Conservation,
        |after: &GameState, before: &GameState, action: &GameAction| {
            Ok(before
                .players
                .iter()
                .zip(&after.players)
                .filter(|(b, a)| b.card_total() != a.card_total())
                .map(|(b, a)| {
                    Violation::new(
                        "card-count-changed",
                        Severity::High,
                        format!(
                            "{} owned {} cards before {} and {} after",
                            b.name,
                            b.card_total(),
                            action_label(action),
                            a.card_total()
                        ),
                    )
                    .identifying("player", b.name.as_str())
                    .identifying("action", action_label(action))
                    .detail("expected", b.card_total())
                    .detail("actual", a.card_total())
                })
                .collect())
        },
    ))?;
    reg.register(Invariant::transitional(
        "stunned-cannot-attack",
        Category::RuleViolation,
        |after: &GameState, before: &GameState, action: &GameAction| {
            let GameAction::Attack {
                player, attacker, ..
            } = *action
            else {
                return Ok(Vec::new());
            };
            let Some(minion) = before.players.get(player).and_then(|p| p.minion(attacker)) else {
                return Ok(Vec::new());
            };
            // A rejected attack leaves the attacker ready; a resolved one
            // exhausts it or kills it.
            let attacked = !minion.exhausted
                && after.players[player]
                    .minion(attacker)
                    .is_none_or(|m| m.exhausted);
            Ok(if minion.stunned && attacked {
                vec![
                    Violation::new(
                        "acted-while-stunned",
                        Severity::High,
                        format!("stunned {} attacked", minion.name),
                    )
                    .identifying("minion", minion.name.as_str())
                    .detail("attacker_id", minion.id),
                ]
            } else {
                Vec::new()
            })
        },
    ))?;
    reg.register(Invariant::transitional(
        "energy-accounting",
        Category::RuleViolation,
        |after: &GameState, before: &GameState, action: &GameAction| {
            Ok(energy_mismatch(after, before, action).into_iter().collect())
        },
    ))?;

    Ok(reg
        .with_hint(
            "zombie-entity",
            "Dead entities must leave the board in the same step that killed them; check the death-resolution pass.",
        )
        .with_hint(
            "duplicate-id",
            "Entity ids must come from a counter that advances on every summon.",
        )
        .with_hint(
            "energy-out-of-bounds",
            "Clamp energy refills to the turn's maximum and the maximum to the global cap.",
        )
        .with_hint(
            "health-above-max",
            "Heals must clamp to max health.",
        )
        .with_hint(
            "hand-overflow",
            "Draws past the hand limit must burn the card to the discard pile.",
        )
        .with_hint(
            "turn-decreased",
            "The turn counter must never move backwards; look for a state restore that rewinds it.",
        )
        .with_hint(
            "turn-skipped",
            "Ending a turn must advance the counter by exactly one.",
        )
        .with_hint(
            "card-count-changed",
            "Every card move between deck, hand, board and discard must be paired; look for a zone that drops cards.",
        )
        .with_hint(
            "acted-while-stunned",
            "The attack guard must reject stunned minions.",
        )
        .with_hint(
            "energy-mismatch",
            "Playing a card must deduct exactly its cost; check spell and minion paths separately.",
        ))
}

fn action_label(action: &GameAction) -> &'static str {
    match action {
        GameAction::PlayCard { .. } => "play_card",
        GameAction::Attack { .. } => "attack",
        GameAction::EndTurn { .. } => "end_turn",
    }
}

/// Dead minions still on the board, plus dead heroes while the game is live.
fn zombies(s: &GameState) -> Vec<Violation> {
    let mut out = Vec::new();
    for p in &s.players {
        for m in p.board.iter().filter(|m| m.hp <= 0) {
            out.push(
                Violation::new(
                    "zombie-entity",
                    Severity::High,
                    format!("{}'s {} is on the board with {} hp", p.name, m.name, m.hp),
                )
                .identifying("entity_type", "minion")
                .detail("owner", p.name.as_str())
                .detail("minion", m.name.as_str())
                .detail("entity_id", m.id)
                .detail("hp", m.hp),
            );
        }
        if p.hp <= 0 && s.phase == GamePhase::Main {
            out.push(
                Violation::new(
                    "zombie-entity",
                    Severity::High,
                    format!("hero {} has {} hp but the game continues", p.name, p.hp),
                )
                .identifying("entity_type", "hero")
                .detail("owner", p.name.as_str())
                .detail("hp", p.hp),
            );
        }
    }
    out
}

fn duplicate_ids(s: &GameState) -> Vec<Violation> {
    let mut seen: BTreeMap<u32, usize> = BTreeMap::new();
    for m in s.players.iter().flat_map(|p| &p.board) {
        *seen.entry(m.id).or_default() += 1;
    }
    seen.into_iter()
        .filter(|&(_, n)| n > 1)
        .map(|(id, n)| {
            Violation::new(
                "duplicate-id",
                Severity::Critical,
                format!("{n} minions share entity id {id}"),
            )
            .identifying("zone", "board")
            .detail("entity_id", id)
            .detail("count", n)
        })
        .collect()
}

fn overhealed(s: &GameState) -> Vec<Violation> {
    let mut out = Vec::new();
    for p in &s.players {
        if p.hp > p.max_hp {
            out.push(
                Violation::new(
                    "health-above-max",
                    Severity::Medium,
                    format!("hero {} has {}/{} hp", p.name, p.hp, p.max_hp),
                )
                .identifying("entity_type", "hero")
                .detail("hp", p.hp)
                .detail("max_hp", p.max_hp),
            );
        }
        for m in p.board.iter().filter(|m| m.hp > m.max_hp) {
            out.push(
                Violation::new(
                    "health-above-max",
                    Severity::Medium,
                    format!("{} has {}/{} hp", m.name, m.hp, m.max_hp),
                )
                .identifying("entity_type", "minion")
                .detail("minion", m.name.as_str())
                .detail("entity_id", m.id)
                .detail("hp", m.hp)
                .detail("max_hp", m.max_hp),
            );
        }
    }
    out
}

/// The turn counter may stay put or advance by one.
pub fn turn_progression(before: u32, after: u32) -> Option<Violation> {
    if after < before {
        Some(
            Violation::new(
                "turn-decreased",
                Severity::Critical,
                format!("turn went from {before} to {after}"),
            )
            .identifying("direction", "backwards")
            .detail("turn_before", before)
            .detail("turn_after", after),
        )
    } else if after > before.saturating_add(1) {
        Some(
            Violation::new(
                "turn-skipped",
                Severity::High,
                format!("turn jumped from {before} to {after}"),
            )
            .identifying("direction", "forwards")
            .detail("turn_before", before)
            .detail("turn_after", after),
        )
    } else {
        None
    }
}

/// Within a turn, playing a card costs exactly its price and attacking is free.
fn energy_mismatch(
    after: &GameState,
    before: &GameState,
    action: &GameAction,
) -> Option<Violation> {
    let player = action.player();
    let spent = match *action {
        GameAction::EndTurn { .. } => return None,
        GameAction::Attack { .. } => 0,
        GameAction::PlayCard { card_id, .. } => {
            before.players.get(player)?.hand_card(card_id)?.cost
        }
    };
    if after.active != before.active {
        return None;
    }
    let was = before.players.get(player)?.energy;
    let now = after.players.get(player)?.energy;
    let expected = was.saturating_sub(spent);
    (now != expected).then(|| {
        Violation::new(
            "energy-mismatch",
            Severity::Medium,
            format!(
                "{} had {was} energy, {} should cost {spent} but {now} remains",
                before.players[player].name,
                action_label(action)
            ),
        )
        .identifying("action", action_label(action))
        .detail("player", before.players[player].name.as_str())
        .detail("expected", expected)
        .detail("actual", now)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardgame::rules::Rules;
    use crate::cardgame::state::{Card, CardKind, Minion};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn game() -> GameState {
        Rules::default().new_game(&mut StdRng::seed_from_u64(3))
    }

    fn dead_minion(id: u32) -> Minion {
        Minion {
            id,
            name: "Raider".to_string(),
            attack: 3,
            hp: 0,
            max_hp: 1,
            exhausted: false,
            stunned: false,
            card: Card {
                id: 800,
                name: "Raider".to_string(),
                cost: 2,
                kind: CardKind::Minion { attack: 3, hp: 1 },
            },
        }
    }

    #[test]
    fn fresh_game_is_clean() {
        let reg = card_game_invariants().unwrap();
        let eval = reg.evaluate(&game(), None, None);
        assert!(!eval.has_violations(), "{:?}", eval.findings);
        assert!(eval.failures.is_empty());
    }

    #[test]
    fn dead_minion_on_board_is_one_high_zombie() {
        let reg = card_game_invariants().unwrap();
        let mut state = game();
        state.players[1].board.push(dead_minion(500));
        let eval = reg.evaluate(&state, None, None);
        let zombies: Vec<_> = eval
            .findings
            .iter()
            .filter(|f| f.violation.kind == "zombie-entity")
            .collect();
        assert_eq!(zombies.len(), 1);
        assert_eq!(zombies[0].violation.severity, Severity::High);
        assert_eq!(zombies[0].category, Category::StateCorruption);
        assert_eq!(zombies[0].violation.details["hp"], 0);
    }

    #[test]
    fn turn_progression_flags_backwards_and_skips() {
        let decreased = turn_progression(5, 4).unwrap();
        assert_eq!(decreased.kind, "turn-decreased");
        assert_eq!(decreased.severity, Severity::Critical);
        assert!(turn_progression(5, 5).is_none());
        assert!(turn_progression(5, 6).is_none());
        let skipped = turn_progression(5, 7).unwrap();
        assert_eq!(skipped.kind, "turn-skipped");
        assert_eq!(skipped.severity, Severity::High);
    }

    #[test]
    fn turn_monotonic_runs_as_transitional() {
        let reg = card_game_invariants().unwrap();
        let mut before = game();
        before.turn = 5;
        let mut after = before.clone();
        after.turn = 4;
        let action = GameAction::EndTurn { player: 0 };
        let eval = reg.evaluate(&after, Some(&before), Some(&action));
        let kinds: Vec<_> = eval.findings.iter().map(|f| f.violation.kind.as_str()).collect();
        assert_eq!(kinds, vec!["turn-decreased"]);
    }

    #[test]
    fn lost_card_breaks_conservation() {
        let reg = card_game_invariants().unwrap();
        let before = game();
        let mut after = before.clone();
        after.players[0].hand.pop();
        let action = GameAction::EndTurn { player: 0 };
        let eval = reg.evaluate(&after, Some(&before), Some(&action));
        assert!(
            eval.findings
                .iter()
                .any(|f| f.violation.kind == "card-count-changed"
                    && f.category == Category::Conservation)
        );
    }

    #[test]
    fn free_card_is_an_energy_mismatch() {
        let reg = card_game_invariants().unwrap();
        let mut before = game();
        before.players[0].energy = 5;
        before.players[0].max_energy = 5;
        before.players[0].hand.push(Card {
            id: 990,
            name: "Raider".to_string(),
            cost: 2,
            kind: CardKind::Minion { attack: 3, hp: 1 },
        });
        let mut after = before.clone();
        let card = after.players[0].hand.pop().unwrap();
        after.players[0].discard.push(card);
        let action = GameAction::PlayCard {
            player: 0,
            card_id: 990,
            target: None,
        };
        let eval = reg.evaluate(&after, Some(&before), Some(&action));
        let mismatch = eval
            .findings
            .iter()
            .find(|f| f.violation.kind == "energy-mismatch")
            .unwrap();
        assert_eq!(mismatch.violation.details["expected"], 3);
        assert_eq!(mismatch.violation.details["actual"], 5);
    }
}
