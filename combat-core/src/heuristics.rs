//! Mechanics inference for intents that arrive without numbers.
//!
//! When neither the intent nor the combatant's catalog supplies an attack
//! bonus, damage dice, save DC, or healing dice, the rules engine asks a
//! [`MechanicsFallback`] to estimate one from the combatant's level or
//! challenge rating and ability scores.

use crate::combatant::{Ability, Combatant};
use crate::dice;

/// Estimates missing mechanical values for an actor.
pub trait MechanicsFallback: Send + Sync {
    fn attack_bonus(&self, actor: &Combatant) -> i32;
    fn damage_dice(&self, actor: &Combatant) -> String;
    fn save_dc(&self, actor: &Combatant) -> i32;
    fn healing_dice(&self, actor: &Combatant) -> String;
}

/// Flat base plus a step per tier of level or challenge rating, capped.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeHeuristic {
    pub max_attack_bonus: i32,
    pub max_save_dc: i32,
    pub max_damage_dice: u32,
    pub damage_die: u32,
    pub healing_die: u32,
}

impl Default for ChallengeHeuristic {
    fn default() -> Self {
        Self {
            max_attack_bonus: 14,
            max_save_dc: 22,
            max_damage_dice: 6,
            damage_die: 8,
            healing_die: 8,
        }
    }
}

impl ChallengeHeuristic {
    /// Level for players, challenge rating for monsters, 1 when unknown.
    fn tier(actor: &Combatant) -> u32 {
        match (actor.level, actor.challenge) {
            (Some(level), _) => level.max(1) as u32,
            (None, Some(cr)) if cr >= 1.0 => cr.floor() as u32,
            _ => 1,
        }
    }

    fn dice_count(actor: &Combatant, cap: u32) -> u32 {
        (1 + Self::tier(actor) / 4).min(cap)
    }

    fn physical_modifier(actor: &Combatant) -> i32 {
        actor
            .modifier(Ability::Strength)
            .max(actor.modifier(Ability::Dexterity))
    }

    fn mental_modifier(actor: &Combatant) -> i32 {
        [Ability::Intelligence, Ability::Wisdom, Ability::Charisma]
            .into_iter()
            .map(|a| actor.modifier(a))
            .max()
            .unwrap_or(0)
    }
}

impl MechanicsFallback for ChallengeHeuristic {
    fn attack_bonus(&self, actor: &Combatant) -> i32 {
        (actor.proficiency_bonus() + Self::physical_modifier(actor)).min(self.max_attack_bonus)
    }

    fn damage_dice(&self, actor: &Combatant) -> String {
        let count = Self::dice_count(actor, self.max_damage_dice);
        dice::with_modifier(
            &format!("{count}d{}", self.damage_die),
            Self::physical_modifier(actor).max(0),
        )
    }

    fn save_dc(&self, actor: &Combatant) -> i32 {
        (8 + actor.proficiency_bonus() + Self::mental_modifier(actor)).clamp(10, self.max_save_dc)
    }

    fn healing_dice(&self, actor: &Combatant) -> String {
        let count = Self::dice_count(actor, self.max_damage_dice);
        dice::with_modifier(
            &format!("{count}d{}", self.healing_die),
            actor.modifier(Ability::Wisdom).max(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{AbilityScores, Faction};

    #[test]
    fn test_low_level_estimates() {
        let fighter = Combatant::new("Fighter", Faction::PlayerSide, 12, 16)
            .with_level(1)
            .with_ability_scores(AbilityScores::new(16, 12, 14, 10, 12, 8));
        let h = ChallengeHeuristic::default();
        assert_eq!(h.attack_bonus(&fighter), 5);
        assert_eq!(h.damage_dice(&fighter), "1d8+3");
        assert_eq!(h.save_dc(&fighter), 11);
        assert_eq!(h.healing_dice(&fighter), "1d8+1");
    }

    #[test]
    fn test_scales_with_challenge() {
        let dragon = Combatant::new("Dragon", Faction::MonsterSide, 200, 19)
            .with_challenge(17.0)
            .with_ability_scores(AbilityScores::new(27, 10, 25, 16, 13, 21));
        let h = ChallengeHeuristic::default();
        assert_eq!(h.attack_bonus(&dragon), 14);
        assert_eq!(h.damage_dice(&dragon), "5d8+8");
        assert_eq!(h.save_dc(&dragon), 19);
    }

    #[test]
    fn test_caps_hold() {
        let h = ChallengeHeuristic {
            max_attack_bonus: 6,
            max_damage_dice: 2,
            ..ChallengeHeuristic::default()
        };
        let titan = Combatant::new("Titan", Faction::MonsterSide, 500, 25)
            .with_challenge(30.0)
            .with_ability_scores(AbilityScores::new(30, 10, 30, 10, 10, 10));
        assert_eq!(h.attack_bonus(&titan), 6);
        assert!(h.damage_dice(&titan).starts_with("2d8"));
    }

    #[test]
    fn test_fractional_challenge_is_tier_one() {
        let rat = Combatant::new("Rat", Faction::MonsterSide, 1, 10).with_challenge(0.125);
        let h = ChallengeHeuristic::default();
        assert_eq!(h.damage_dice(&rat), "1d8");
        assert_eq!(h.save_dc(&rat), 10);
    }
}
