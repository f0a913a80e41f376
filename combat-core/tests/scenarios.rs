//! Rules-level scenarios: attacks, saves, dropping to 0 HP, and death saves.
//!
//! Everything here is deterministic: dice come from `ScriptedDice` and no
//! controller is involved.

use combat_core::combatant::{Ability, Combatant, DeathSaves, Faction, LifeStatus};
use combat_core::rules::{self, ActionResult, DeathSaveResult, EffectTag, RulesEngine};
use combat_core::testing::{assert_hp, assert_status, sample_encounter, ScriptedDice};
use combat_core::{ActionIntent, CombatState};

fn resolve_and_apply(
    state: &mut CombatState,
    actor: &str,
    intent: &ActionIntent,
    dice: &ScriptedDice,
) -> ActionResult {
    let engine = RulesEngine::new();
    let actor = state.find_target(actor).expect("actor exists").clone();
    let result = engine.resolve(intent, &actor, state, dice);
    rules::apply_result(state, &engine, actor.id, &result, dice);
    result
}

fn downed(name: &str) -> Combatant {
    let mut c = Combatant::new(name, Faction::PlayerSide, 12, 14);
    c.current_hp = 0;
    c.status = LifeStatus::Unconscious;
    c
}

// =============================================================================
// Scenario A: goblin goes first and hits
// =============================================================================

#[test]
fn test_goblin_acts_first_and_hits_fighter() {
    let mut state = sample_encounter();
    state.prepare(&ScriptedDice::constant(10));

    let first = state.current_actor().unwrap();
    assert_eq!(state.get(first).unwrap().name, "Goblin");

    // Natural 14 with the scimitar's +4 is 18 against AC 16; 5 damage.
    let dice = ScriptedDice::new([14, 5]);
    let intent = ActionIntent::new("slash at the fighter with my scimitar").with_target("Fighter");
    let result = resolve_and_apply(&mut state, "Goblin", &intent, &dice);

    assert!(result.success);
    assert_eq!(result.dice_rolls[0].result, 18);
    assert_eq!(result.damage, 5);
    assert_hp(&state, "Fighter", 15);
    assert_hp(&state, "Goblin", 7);
    assert_eq!(state.outcome(), None);
}

// =============================================================================
// Attack threshold
// =============================================================================

#[test]
fn test_attack_hits_exactly_at_armor_class() {
    for (armor_class, bonus) in [(16, 2), (18, 2), (12, 5)] {
        for natural in 2..=19 {
            let mut state = sample_encounter();
            state
                .combatants
                .iter_mut()
                .find(|c| c.name == "Fighter")
                .unwrap()
                .armor_class = armor_class;
            let dice = ScriptedDice::new([natural, 3]);
            let intent = ActionIntent::new("attack")
                .with_target("Fighter")
                .with_attack(bonus, "1d6");
            let result = resolve_and_apply(&mut state, "Goblin", &intent, &dice);

            let total = natural + bonus;
            assert_eq!(
                result.damage > 0,
                total >= armor_class,
                "total {total} vs AC {armor_class}"
            );
        }
    }
}

#[test]
fn test_attack_threshold_edges() {
    let cases = [
        // (AC, natural, hits): +2 bonus throughout.
        (16, 14, true),  // 16 vs 16
        (16, 13, false), // 15 vs 16
        (18, 15, false), // 17 vs 18
        (18, 16, true),  // 18 vs 18
    ];
    for (armor_class, natural, hits) in cases {
        let mut state = sample_encounter();
        state.combatants[0].armor_class = armor_class;
        let dice = ScriptedDice::new([natural, 4]);
        let intent = ActionIntent::new("strike")
            .with_target("Fighter")
            .with_attack(2, "1d6");
        let result = resolve_and_apply(&mut state, "Goblin", &intent, &dice);
        assert_eq!(result.success, hits, "natural {natural} vs AC {armor_class}");
    }
}

#[test]
fn test_natural_twenty_always_hits_and_doubles_dice() {
    let mut state = sample_encounter();
    state.combatants[0].armor_class = 30;
    let dice = ScriptedDice::new([20, 9]);
    let intent = ActionIntent::new("attack")
        .with_target("Fighter")
        .with_attack(0, "1d6+2");
    let result = resolve_and_apply(&mut state, "Goblin", &intent, &dice);

    assert!(result.is_critical());
    assert_eq!(result.dice_rolls[1].expression, "2d6+2");
    assert_hp(&state, "Fighter", 11);
}

#[test]
fn test_natural_one_always_misses() {
    let mut state = sample_encounter();
    state.combatants[0].armor_class = 1;
    let dice = ScriptedDice::new([1]);
    let intent = ActionIntent::new("attack")
        .with_target("Fighter")
        .with_attack(30, "1d6");
    let result = resolve_and_apply(&mut state, "Goblin", &intent, &dice);
    assert!(!result.success);
    assert_hp(&state, "Fighter", 20);
}

// =============================================================================
// Saving throws
// =============================================================================

#[test]
fn test_successful_save_halves_damage() {
    let state = sample_encounter();
    let engine = RulesEngine::new();
    let fighter = state.find_target("Fighter").unwrap().clone();
    let intent = ActionIntent::new("cast burning hands")
        .with_target("Goblin")
        .with_save(13, Ability::Dexterity, "3d6");

    for rolled in 1..=18 {
        // Save totals come back from the roller with the modifier applied.
        let failed = engine.resolve(&intent, &fighter, &state, &ScriptedDice::new([5, rolled]));
        let saved = engine.resolve(&intent, &fighter, &state, &ScriptedDice::new([15, rolled]));
        assert!(failed.has_effect(&EffectTag::SaveFailed));
        assert!(saved.has_effect(&EffectTag::SaveSucceeded));
        assert_eq!(failed.damage, rolled);
        assert_eq!(saved.damage, rolled / 2);
    }
}

#[test]
fn test_save_dc_met_exactly_succeeds() {
    let state = sample_encounter();
    let engine = RulesEngine::new();
    let fighter = state.find_target("Fighter").unwrap().clone();
    let intent = ActionIntent::new("cast thunderwave")
        .with_target("Goblin")
        .with_save(13, Ability::Constitution, "2d8");
    let result = engine.resolve(&intent, &fighter, &state, &ScriptedDice::new([13, 10]));
    assert!(result.has_effect(&EffectTag::SaveSucceeded));
    assert_eq!(result.damage, 5);
}

// =============================================================================
// Scenario B: dropping to 0 HP
// =============================================================================

#[test]
fn test_monster_at_zero_is_dead() {
    let mut goblin = Combatant::new("Goblin", Faction::MonsterSide, 7, 15);
    let note = rules::apply_damage(&mut goblin, 9, false);
    assert_eq!(goblin.current_hp, 0);
    assert_eq!(goblin.status, LifeStatus::Dead);
    assert!(note.unwrap().contains("slain"));
}

#[test]
fn test_player_at_zero_is_unconscious_with_fresh_death_saves() {
    let mut fighter = Combatant::new("Fighter", Faction::PlayerSide, 20, 16);
    fighter.death_saves = DeathSaves {
        successes: 2,
        failures: 1,
    };
    rules::apply_damage(&mut fighter, 25, false);
    assert_eq!(fighter.current_hp, 0);
    assert_eq!(fighter.status, LifeStatus::Unconscious);
    assert_eq!(fighter.death_saves, DeathSaves::default());
}

#[test]
fn test_killing_the_last_goblin_ends_combat() {
    let mut state = sample_encounter();
    let dice = ScriptedDice::new([15, 8]);
    let intent = ActionIntent::new("attack with my longsword").with_target("Goblin");
    resolve_and_apply(&mut state, "Fighter", &intent, &dice);
    assert_status(&state, "Goblin", LifeStatus::Dead);
    assert_eq!(state.outcome(), Some(combat_core::CombatOutcome::PlayersWin));
}

#[test]
fn test_damage_while_down_adds_failures() {
    let mut hero = downed("Hero");
    rules::apply_damage(&mut hero, 3, false);
    assert_eq!(hero.death_saves.failures, 1);
    rules::apply_damage(&mut hero, 3, true);
    assert_eq!(hero.status, LifeStatus::Dead);
}

#[test]
fn test_healing_wakes_downed_player() {
    let mut hero = downed("Hero");
    hero.death_saves.failures = 2;
    rules::apply_healing(&mut hero, 4);
    assert_eq!(hero.current_hp, 4);
    assert_eq!(hero.status, LifeStatus::Conscious);
    assert_eq!(hero.death_saves, DeathSaves::default());
}

// =============================================================================
// Scenario C: death saves
// =============================================================================

#[test]
fn test_three_failures_is_death() {
    let mut hero = downed("Hero");
    for _ in 0..2 {
        rules::apply_death_save(&mut hero, DeathSaveResult::Failure);
        assert_eq!(hero.status, LifeStatus::Unconscious);
    }
    rules::apply_death_save(&mut hero, DeathSaveResult::Failure);
    assert_eq!(hero.status, LifeStatus::Dead);
}

#[test]
fn test_three_successes_is_stable() {
    let mut hero = downed("Hero");
    for _ in 0..3 {
        rules::apply_death_save(&mut hero, DeathSaveResult::Success);
    }
    assert_eq!(hero.status, LifeStatus::Stable);
    assert_eq!(hero.current_hp, 0);
}

#[test]
fn test_natural_twenty_revives_regardless_of_counts() {
    let mut hero = downed("Hero");
    hero.death_saves = DeathSaves {
        successes: 1,
        failures: 2,
    };
    let engine = RulesEngine::new();
    let save = engine.death_save(&hero, &ScriptedDice::new([20]));
    assert_eq!(save.result, DeathSaveResult::Revived);

    rules::apply_death_save(&mut hero, save.result);
    assert_eq!(hero.current_hp, 1);
    assert_eq!(hero.status, LifeStatus::Conscious);
    assert_eq!(hero.death_saves, DeathSaves::default());
}

#[test]
fn test_death_save_roll_categories() {
    let engine = RulesEngine::new();
    let hero = downed("Hero");
    let category = |natural| engine.death_save(&hero, &ScriptedDice::new([natural])).result;
    assert_eq!(category(1), DeathSaveResult::CriticalFailure);
    assert_eq!(category(9), DeathSaveResult::Failure);
    assert_eq!(category(10), DeathSaveResult::Success);
    assert_eq!(category(19), DeathSaveResult::Success);
}

#[test]
fn test_critical_failure_counts_twice() {
    let mut hero = downed("Hero");
    rules::apply_death_save(&mut hero, DeathSaveResult::CriticalFailure);
    assert_eq!(hero.death_saves.failures, 2);
    rules::apply_death_save(&mut hero, DeathSaveResult::Failure);
    assert_eq!(hero.status, LifeStatus::Dead);
}
