//! Initiative scheduling.
//!
//! Turn order, surprise, which combatants are eligible to act in a round,
//! and the ready/held-action reordering events that can shuffle an order
//! mid-round.

use crate::combatant::{Ability, Combatant, CombatantId, Faction, LifeStatus};
use crate::dice::{self, DiceRoller};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Flat initiative bonus granted by the Alert feat.
pub const ALERT_BONUS: i32 = 5;

const ALERT_TRAITS: &[&str] = &["Alert"];
const HALF_PROFICIENCY_TRAITS: &[&str] = &["Jack of All Trades", "Remarkable Athlete"];
const ADVANTAGE_TRAITS: &[&str] = &["Feral Instinct", "Advantage on Initiative"];

/// Surprise per combatant, only consulted in round 1.
pub type SurpriseMap = HashMap<CombatantId, bool>;

/// An event that reorders the initiative order for the rest of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    /// Act again right before the first remaining entry with initiative at
    /// or below `trigger`.
    Ready {
        combatant: CombatantId,
        trigger: i32,
    },
    /// Held action fires at an explicit slot.
    HeldActionTriggered {
        combatant: CombatantId,
        position: usize,
    },
}

impl OrderEvent {
    pub fn combatant(&self) -> CombatantId {
        match self {
            OrderEvent::Ready { combatant, .. } => *combatant,
            OrderEvent::HeldActionTriggered { combatant, .. } => *combatant,
        }
    }
}

fn has_any_trait(combatant: &Combatant, names: &[&str]) -> bool {
    names.iter().any(|name| combatant.has_trait(name))
}

/// Derive initiative modifiers from static traits.
///
/// The modifier is recomputed from scratch, so applying twice changes
/// nothing.
pub fn apply_modifiers(combatants: &mut [Combatant]) {
    for combatant in combatants.iter_mut() {
        let mut modifier = 0;
        if has_any_trait(combatant, ALERT_TRAITS) {
            modifier += ALERT_BONUS;
        }
        if has_any_trait(combatant, HALF_PROFICIENCY_TRAITS) {
            modifier += combatant.proficiency_bonus() / 2;
        }
        combatant.initiative_modifier = modifier;
        combatant.initiative_advantage = has_any_trait(combatant, ADVANTAGE_TRAITS);
    }
}

/// Roll `1d20 + DEX` for everyone who arrived without an initiative.
pub fn roll_initiative(combatants: &mut [Combatant], dice: &dyn DiceRoller) {
    for combatant in combatants.iter_mut().filter(|c| c.initiative.is_none()) {
        let expression = dice::d20_with(combatant.modifier(Ability::Dexterity));
        let roll = if combatant.initiative_advantage {
            dice.roll(&expression).max(dice.roll(&expression))
        } else {
            dice.roll(&expression)
        };
        tracing::debug!(combatant = %combatant.name, expression, roll, "rolled initiative");
        combatant.initiative = Some(roll);
    }
}

/// Initiative including trait modifiers.
pub fn effective_initiative(combatant: &Combatant) -> i32 {
    combatant.initiative.unwrap_or(0) + combatant.initiative_modifier
}

/// Stable sort: initiative desc, dexterity desc, advantage flag first.
pub fn sort(combatants: &mut [Combatant]) {
    combatants.sort_by(|a, b| {
        effective_initiative(b)
            .cmp(&effective_initiative(a))
            .then_with(|| b.ability_scores.dexterity.cmp(&a.ability_scores.dexterity))
            .then_with(|| b.initiative_advantage.cmp(&a.initiative_advantage))
    });
}

pub fn surprise_map(combatants: &[Combatant]) -> SurpriseMap {
    combatants
        .iter()
        .map(|c| (c.id, c.surprised && !has_any_trait(c, ALERT_TRAITS)))
        .collect()
}

/// Whether `combatant` gets a turn slot this round.
pub fn is_active(combatant: &Combatant, round: u32, surprise: &SurpriseMap) -> bool {
    let alive = match combatant.faction {
        Faction::MonsterSide => combatant.current_hp > 0 && combatant.status != LifeStatus::Dead,
        Faction::PlayerSide => {
            combatant.current_hp > 0
                || matches!(combatant.status, LifeStatus::Unconscious | LifeStatus::Stable)
        }
    };
    if !alive || combatant.status.is_terminal() {
        return false;
    }
    !(round == 1 && surprise.get(&combatant.id).copied().unwrap_or(false))
}

/// Ids of combatants eligible to act, in the order given.
pub fn active_set(combatants: &[Combatant], round: u32, surprise: &SurpriseMap) -> Vec<CombatantId> {
    combatants
        .iter()
        .filter(|c| is_active(c, round, surprise))
        .map(|c| c.id)
        .collect()
}

/// Where `event` places its combatant in `order` (which must not contain it).
pub fn insertion_slot(
    order: &[CombatantId],
    event: &OrderEvent,
    initiative_of: impl Fn(CombatantId) -> i32,
) -> usize {
    match event {
        OrderEvent::Ready { trigger, .. } => order
            .iter()
            .position(|c| initiative_of(*c) <= *trigger)
            .unwrap_or(order.len()),
        OrderEvent::HeldActionTriggered { position, .. } => (*position).min(order.len()),
    }
}

/// Apply queued reorder events to an order, in queue order.
///
/// `initiative_of` looks up the initiative used for ready triggers; ids it
/// does not know are treated as initiative 0.
pub fn apply_order_events(
    order: &[CombatantId],
    events: &[OrderEvent],
    initiative_of: impl Fn(CombatantId) -> i32,
) -> Vec<CombatantId> {
    let mut order = order.to_vec();
    for event in events {
        let id = event.combatant();
        let Some(current) = order.iter().position(|c| *c == id) else {
            tracing::debug!(combatant = %id, "order event for combatant not in order, skipped");
            continue;
        };
        order.remove(current);
        let slot = insertion_slot(&order, event, &initiative_of);
        order.insert(slot, id);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::AbilityScores;

    fn combatant(name: &str, faction: Faction, init: i32, dex: u8) -> Combatant {
        Combatant::new(name, faction, 10, 12)
            .with_initiative(init)
            .with_ability_scores(AbilityScores::new(10, dex, 10, 10, 10, 10))
    }

    fn names(combatants: &[Combatant]) -> Vec<&str> {
        combatants.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_sort_orders_by_initiative_then_dex() {
        let mut list = vec![
            combatant("Slow", Faction::PlayerSide, 5, 10),
            combatant("Quick", Faction::MonsterSide, 15, 10),
            combatant("Nimble", Faction::PlayerSide, 15, 18),
        ];
        sort(&mut list);
        assert_eq!(names(&list), vec!["Nimble", "Quick", "Slow"]);
    }

    #[test]
    fn test_sort_advantage_breaks_tie() {
        let mut a = combatant("A", Faction::PlayerSide, 12, 12);
        let mut b = combatant("B", Faction::PlayerSide, 12, 12);
        b.initiative_advantage = true;
        a.initiative_advantage = false;
        let mut list = vec![a, b];
        sort(&mut list);
        assert_eq!(names(&list), vec!["B", "A"]);
    }

    #[test]
    fn test_sort_stable_and_idempotent() {
        let mut list = vec![
            combatant("First", Faction::PlayerSide, 10, 10),
            combatant("Second", Faction::MonsterSide, 10, 10),
            combatant("Third", Faction::PlayerSide, 10, 10),
        ];
        sort(&mut list);
        assert_eq!(names(&list), vec!["First", "Second", "Third"]);
        let once = list.clone();
        sort(&mut list);
        assert_eq!(list, once);
    }

    #[test]
    fn test_apply_modifiers_idempotent() {
        let mut list = vec![
            combatant("Alert", Faction::PlayerSide, 10, 10).with_trait("Alert"),
            combatant("Bard", Faction::PlayerSide, 10, 10)
                .with_trait("Jack of All Trades")
                .with_level(5),
            combatant("Barbarian", Faction::PlayerSide, 10, 10).with_trait("Feral Instinct"),
        ];
        apply_modifiers(&mut list);
        apply_modifiers(&mut list);
        assert_eq!(list[0].initiative_modifier, ALERT_BONUS);
        assert_eq!(list[1].initiative_modifier, 1);
        assert!(list[2].initiative_advantage);
        assert_eq!(effective_initiative(&list[0]), 15);
    }

    #[test]
    fn test_roll_initiative_only_when_missing() {
        let mut list = vec![
            combatant("Preset", Faction::PlayerSide, 3, 10),
            Combatant::new("Rolls", Faction::MonsterSide, 7, 15)
                .with_ability_scores(AbilityScores::new(8, 14, 10, 10, 8, 8)),
        ];
        let dice = |expr: &str| {
            assert_eq!(expr, "1d20+2");
            14
        };
        roll_initiative(&mut list, &dice);
        assert_eq!(list[0].initiative, Some(3));
        assert_eq!(list[1].initiative, Some(14));
    }

    #[test]
    fn test_surprise_suppressed_by_alert() {
        let list = vec![
            combatant("Caught", Faction::PlayerSide, 10, 10).surprised(),
            combatant("Watchful", Faction::PlayerSide, 10, 10)
                .surprised()
                .with_trait("alert"),
            combatant("Ready", Faction::MonsterSide, 10, 10),
        ];
        let map = surprise_map(&list);
        assert!(map[&list[0].id]);
        assert!(!map[&list[1].id]);
        assert!(!map[&list[2].id]);

        let round_one = active_set(&list, 1, &map);
        assert_eq!(round_one, vec![list[1].id, list[2].id]);
        let round_two = active_set(&list, 2, &map);
        assert_eq!(round_two.len(), 3);
    }

    #[test]
    fn test_active_set_exclusions() {
        let mut dead_goblin = combatant("Goblin", Faction::MonsterSide, 10, 10);
        dead_goblin.current_hp = 0;
        let mut flagged_orc = combatant("Orc", Faction::MonsterSide, 10, 10);
        flagged_orc.status = LifeStatus::Dead;
        let mut downed = combatant("Cleric", Faction::PlayerSide, 10, 10);
        downed.current_hp = 0;
        downed.status = LifeStatus::Unconscious;
        let mut stable = combatant("Rogue", Faction::PlayerSide, 10, 10);
        stable.current_hp = 0;
        stable.status = LifeStatus::Stable;
        let mut gone = combatant("Wizard", Faction::PlayerSide, 10, 10);
        gone.current_hp = 0;

        let list = vec![dead_goblin, flagged_orc, downed, stable, gone];
        let active = active_set(&list, 2, &SurpriseMap::new());
        assert_eq!(active, vec![list[2].id, list[3].id]);
    }

    #[test]
    fn test_ready_reinserts_before_trigger() {
        let list = vec![
            combatant("A", Faction::PlayerSide, 20, 10),
            combatant("B", Faction::PlayerSide, 15, 10),
            combatant("C", Faction::MonsterSide, 10, 10),
            combatant("D", Faction::MonsterSide, 5, 10),
        ];
        let order: Vec<_> = list.iter().map(|c| c.id).collect();
        let init = |id: CombatantId| {
            list.iter()
                .find(|c| c.id == id)
                .map(effective_initiative)
                .unwrap_or(0)
        };

        let events = vec![OrderEvent::Ready {
            combatant: list[0].id,
            trigger: 10,
        }];
        let reordered = apply_order_events(&order, &events, init);
        assert_eq!(reordered, vec![list[1].id, list[0].id, list[2].id, list[3].id]);

        // Nothing at or below the trigger: goes last.
        let events = vec![OrderEvent::Ready {
            combatant: list[1].id,
            trigger: 1,
        }];
        let reordered = apply_order_events(&order, &events, init);
        assert_eq!(*reordered.last().unwrap(), list[1].id);
    }

    #[test]
    fn test_held_action_explicit_position() {
        let ids: Vec<_> = (0..4).map(|_| CombatantId::new()).collect();
        let events = vec![
            OrderEvent::HeldActionTriggered {
                combatant: ids[3],
                position: 0,
            },
            OrderEvent::HeldActionTriggered {
                combatant: ids[0],
                position: 99,
            },
        ];
        let reordered = apply_order_events(&ids, &events, |_| 0);
        assert_eq!(reordered, vec![ids[3], ids[1], ids[2], ids[0]]);
    }
}
