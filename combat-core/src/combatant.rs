//! Combatant types.
//!
//! Contains everything that describes one encounter participant: identity,
//! faction, vitals, ability scores, conditions, death saves, and the
//! ability/action catalog the rules engine can draw hints from.

use crate::economy::ActionEconomy;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Cap on legendary actions, applied whenever the budget is read.
pub const MAX_LEGENDARY_ACTIONS: u32 = 10;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for combatants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombatantId(pub Uuid);

impl CombatantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CombatantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the encounter a combatant fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    PlayerSide,
    MonsterSide,
}

impl Faction {
    pub fn opposing(&self) -> Faction {
        match self {
            Faction::PlayerSide => Faction::MonsterSide,
            Faction::MonsterSide => Faction::PlayerSide,
        }
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    /// Lenient lookup used on oracle output ("dex", "Wisdom", "CON save").
    pub fn from_loose(s: &str) -> Option<Ability> {
        let s = s.trim().to_lowercase();
        let prefix = s.get(..3)?;
        match prefix {
            "str" => Some(Ability::Strength),
            "dex" => Some(Ability::Dexterity),
            "con" => Some(Ability::Constitution),
            "int" => Some(Ability::Intelligence),
            "wis" => Some(Ability::Wisdom),
            "cha" => Some(Ability::Charisma),
            _ => None,
        }
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Ability scores for a creature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        (self.get(ability) as i32 - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// D&D 5e conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Blinded,
    Charmed,
    Deafened,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
}

impl Condition {
    pub fn name(&self) -> &'static str {
        match self {
            Condition::Blinded => "Blinded",
            Condition::Charmed => "Charmed",
            Condition::Deafened => "Deafened",
            Condition::Frightened => "Frightened",
            Condition::Grappled => "Grappled",
            Condition::Incapacitated => "Incapacitated",
            Condition::Invisible => "Invisible",
            Condition::Paralyzed => "Paralyzed",
            Condition::Petrified => "Petrified",
            Condition::Poisoned => "Poisoned",
            Condition::Prone => "Prone",
            Condition::Restrained => "Restrained",
            Condition::Stunned => "Stunned",
            Condition::Unconscious => "Unconscious",
        }
    }

    pub fn all() -> [Condition; 14] {
        [
            Condition::Blinded,
            Condition::Charmed,
            Condition::Deafened,
            Condition::Frightened,
            Condition::Grappled,
            Condition::Incapacitated,
            Condition::Invisible,
            Condition::Paralyzed,
            Condition::Petrified,
            Condition::Poisoned,
            Condition::Prone,
            Condition::Restrained,
            Condition::Stunned,
            Condition::Unconscious,
        ]
    }

    /// Case-insensitive lookup; accepts "stun", "poison", "paralysis".
    pub fn from_loose(s: &str) -> Option<Condition> {
        let s = s.trim().to_lowercase();
        let prefix = s.get(..4)?;
        Condition::all()
            .into_iter()
            .find(|c| c.name().to_lowercase().starts_with(prefix))
    }

    pub fn is_incapacitating(&self) -> bool {
        matches!(
            self,
            Condition::Incapacitated
                | Condition::Paralyzed
                | Condition::Petrified
                | Condition::Stunned
                | Condition::Unconscious
        )
    }

    /// Attacks against a creature with this condition have advantage.
    pub fn grants_advantage_to_attackers(&self) -> bool {
        matches!(
            self,
            Condition::Blinded
                | Condition::Paralyzed
                | Condition::Petrified
                | Condition::Restrained
                | Condition::Stunned
                | Condition::Unconscious
        )
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A condition applied to a creature with tracking info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveCondition {
    pub condition: Condition,
    pub source: String,
    /// Rounds remaining; `None` lasts until removed.
    pub duration_rounds: Option<u32>,
}

impl ActiveCondition {
    pub fn new(condition: Condition, source: impl Into<String>) -> Self {
        Self {
            condition,
            source: source.into(),
            duration_rounds: None,
        }
    }

    pub fn with_duration(mut self, rounds: u32) -> Self {
        self.duration_rounds = Some(rounds);
        self
    }
}

// ============================================================================
// Life status and death saves
// ============================================================================

/// Where a combatant sits between fighting fit and out of the encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeStatus {
    #[default]
    Conscious,
    Unconscious,
    Stable,
    Dead,
    Fled,
}

impl LifeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifeStatus::Dead | LifeStatus::Fled)
    }
}

impl fmt::Display for LifeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifeStatus::Conscious => "conscious",
            LifeStatus::Unconscious => "unconscious",
            LifeStatus::Stable => "stable",
            LifeStatus::Dead => "dead",
            LifeStatus::Fled => "fled",
        };
        write!(f, "{s}")
    }
}

/// Death saving throws.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSaves {
    pub successes: u8,
    pub failures: u8,
}

impl DeathSaves {
    /// Returns true once the third success lands.
    pub fn add_success(&mut self) -> bool {
        self.successes = (self.successes + 1).min(3);
        self.successes >= 3
    }

    /// Returns true once the third failure lands.
    pub fn add_failures(&mut self, count: u8) -> bool {
        self.failures = (self.failures + count).min(3);
        self.failures >= 3
    }

    pub fn reset(&mut self) {
        self.successes = 0;
        self.failures = 0;
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// One entry in a combatant's ability/action catalog.
///
/// Hints here are used when the oracle names the ability but omits the
/// numbers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Stamped by the catalog hygiene pass.
    #[serde(default)]
    pub owner: Option<CombatantId>,
    #[serde(default)]
    pub attack_bonus: Option<i32>,
    #[serde(default)]
    pub damage_dice: Option<String>,
    #[serde(default)]
    pub save_dc: Option<i32>,
    #[serde(default)]
    pub save_ability: Option<Ability>,
    #[serde(default)]
    pub healing_dice: Option<String>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attack(mut self, bonus: i32, damage_dice: impl Into<String>) -> Self {
        self.attack_bonus = Some(bonus);
        self.damage_dice = Some(damage_dice.into());
        self
    }

    pub fn with_save(mut self, dc: i32, ability: Ability, damage_dice: impl Into<String>) -> Self {
        self.save_dc = Some(dc);
        self.save_ability = Some(ability);
        self.damage_dice = Some(damage_dice.into());
        self
    }

    pub fn with_healing(mut self, dice: impl Into<String>) -> Self {
        self.healing_dice = Some(dice.into());
        self
    }
}

/// Normalize whatever upstream sent for legendary actions into a count.
///
/// A list coerces to its length, an integer to itself (clamped), anything
/// else to 0.
pub fn coerce_legendary(value: &Value) -> u32 {
    let raw = match value {
        Value::Array(items) => items.len() as u64,
        Value::Number(n) => n.as_u64().unwrap_or(0),
        _ => 0,
    };
    raw.min(MAX_LEGENDARY_ACTIONS as u64) as u32
}

fn deserialize_legendary<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_legendary(&value))
}

// ============================================================================
// Combatant
// ============================================================================

/// One encounter participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    #[serde(default)]
    pub id: CombatantId,
    pub name: String,
    pub faction: Faction,
    pub current_hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
    #[serde(default)]
    pub ability_scores: AbilityScores,
    #[serde(default = "default_speed")]
    pub speed: u32,
    /// Character level (player side).
    #[serde(default)]
    pub level: Option<u8>,
    /// Challenge rating (monster side).
    #[serde(default)]
    pub challenge: Option<f32>,
    /// Pre-rolled initiative; rolled at encounter start when absent.
    #[serde(default)]
    pub initiative: Option<i32>,
    /// Derived from traits by the scheduler.
    #[serde(default)]
    pub initiative_modifier: i32,
    #[serde(default)]
    pub initiative_advantage: bool,
    #[serde(default)]
    pub traits: Vec<String>,
    /// Caller-declared surprise for round 1.
    #[serde(default)]
    pub surprised: bool,
    #[serde(default)]
    pub status: LifeStatus,
    #[serde(default)]
    pub conditions: Vec<ActiveCondition>,
    /// Name of the spell being concentrated on.
    #[serde(default)]
    pub concentration: Option<String>,
    #[serde(default)]
    pub death_saves: DeathSaves,
    #[serde(default)]
    pub dodging: bool,
    #[serde(default, deserialize_with = "deserialize_legendary")]
    pub legendary_actions: u32,
    #[serde(default)]
    pub economy: ActionEconomy,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

fn default_speed() -> u32 {
    30
}

impl Combatant {
    pub fn new(name: impl Into<String>, faction: Faction, max_hp: i32, armor_class: i32) -> Self {
        Self {
            id: CombatantId::new(),
            name: name.into(),
            faction,
            current_hp: max_hp,
            max_hp,
            armor_class,
            ability_scores: AbilityScores::default(),
            speed: default_speed(),
            level: None,
            challenge: None,
            initiative: None,
            initiative_modifier: 0,
            initiative_advantage: false,
            traits: Vec::new(),
            surprised: false,
            status: LifeStatus::Conscious,
            conditions: Vec::new(),
            concentration: None,
            death_saves: DeathSaves::default(),
            dodging: false,
            legendary_actions: 0,
            economy: ActionEconomy::default(),
            catalog: Vec::new(),
        }
    }

    pub fn with_ability_scores(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = scores;
        self
    }

    pub fn with_initiative(mut self, initiative: i32) -> Self {
        self.initiative = Some(initiative);
        self
    }

    pub fn with_speed(mut self, speed: u32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_challenge(mut self, challenge: f32) -> Self {
        self.challenge = Some(challenge);
        self
    }

    pub fn with_trait(mut self, name: impl Into<String>) -> Self {
        self.traits.push(name.into());
        self
    }

    pub fn with_legendary_actions(mut self, raw: &Value) -> Self {
        self.legendary_actions = coerce_legendary(raw);
        self
    }

    pub fn with_catalog_entry(mut self, entry: CatalogEntry) -> Self {
        self.catalog.push(entry);
        self
    }

    pub fn surprised(mut self) -> Self {
        self.surprised = true;
        self
    }

    pub fn is_monster(&self) -> bool {
        self.faction == Faction::MonsterSide
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        self.ability_scores.modifier(ability)
    }

    /// Proficiency bonus from level (players) or challenge rating (monsters).
    pub fn proficiency_bonus(&self) -> i32 {
        let tier = match (self.level, self.challenge) {
            (Some(level), _) => level.max(1) as i32,
            (None, Some(cr)) => (cr.floor() as i32).max(1),
            (None, None) => 1,
        };
        2 + (tier - 1) / 4
    }

    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    pub fn has_condition(&self, condition: Condition) -> bool {
        self.conditions.iter().any(|c| c.condition == condition)
    }

    pub fn add_condition(&mut self, condition: ActiveCondition) {
        self.conditions.retain(|c| c.condition != condition.condition);
        self.conditions.push(condition);
    }

    pub fn remove_condition(&mut self, condition: Condition) {
        self.conditions.retain(|c| c.condition != condition);
    }

    /// True when a condition or being downed stops the combatant acting.
    pub fn is_incapacitated(&self) -> bool {
        self.status != LifeStatus::Conscious
            || self.conditions.iter().any(|c| c.condition.is_incapacitating())
    }

    pub fn can_act(&self) -> bool {
        !self.is_incapacitated()
    }

    pub fn can_react(&self) -> bool {
        !self.is_incapacitated()
    }

    /// Still counts toward its side for the end-of-combat check.
    pub fn is_eligible(&self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.faction {
            Faction::MonsterSide => self.current_hp > 0,
            Faction::PlayerSide => {
                self.current_hp > 0
                    || matches!(self.status, LifeStatus::Unconscious | LifeStatus::Stable)
            }
        }
    }

    pub fn catalog_entry(&self, action_text: &str) -> Option<&CatalogEntry> {
        let text = action_text.to_lowercase();
        self.catalog
            .iter()
            .filter(|e| !e.name.is_empty())
            .find(|e| text.contains(&e.name.to_lowercase()))
    }

    /// Bring `status` in line with HP for combatants that arrived at 0 HP
    /// still marked conscious.
    pub fn normalize_status(&mut self) {
        if self.current_hp > 0 || self.status != LifeStatus::Conscious {
            return;
        }
        self.current_hp = 0;
        if self.is_monster() {
            self.status = LifeStatus::Dead;
        } else {
            self.status = LifeStatus::Unconscious;
            self.death_saves.reset();
        }
    }

    /// Tick down condition durations; returns the ones that expired.
    pub fn tick_conditions(&mut self) -> Vec<Condition> {
        let mut expired = Vec::new();
        for active in &mut self.conditions {
            if let Some(rounds) = active.duration_rounds.as_mut() {
                *rounds = rounds.saturating_sub(1);
                if *rounds == 0 {
                    expired.push(active.condition);
                }
            }
        }
        self.conditions.retain(|c| c.duration_rounds != Some(0));
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ability_modifier() {
        let scores = AbilityScores::new(16, 14, 10, 9, 8, 3);
        assert_eq!(scores.modifier(Ability::Strength), 3);
        assert_eq!(scores.modifier(Ability::Dexterity), 2);
        assert_eq!(scores.modifier(Ability::Constitution), 0);
        assert_eq!(scores.modifier(Ability::Intelligence), -1);
        assert_eq!(scores.modifier(Ability::Wisdom), -1);
        assert_eq!(scores.modifier(Ability::Charisma), -4);
    }

    #[test]
    fn test_loose_lookups() {
        assert_eq!(Ability::from_loose("dex"), Some(Ability::Dexterity));
        assert_eq!(Ability::from_loose("Wisdom save"), Some(Ability::Wisdom));
        assert_eq!(Ability::from_loose("xx"), None);
        assert_eq!(Condition::from_loose("poison"), Some(Condition::Poisoned));
        assert_eq!(Condition::from_loose("Stunned"), Some(Condition::Stunned));
        assert_eq!(Condition::from_loose("on fire"), None);
    }

    #[test]
    fn test_coerce_legendary() {
        assert_eq!(coerce_legendary(&json!(3)), 3);
        assert_eq!(coerce_legendary(&json!(["Tail", "Wing", "Bite"])), 3);
        assert_eq!(coerce_legendary(&json!("three")), 0);
        assert_eq!(coerce_legendary(&json!(2.5)), 0);
        assert_eq!(coerce_legendary(&json!(-1)), 0);
        assert_eq!(coerce_legendary(&json!(null)), 0);
        assert_eq!(coerce_legendary(&json!(99)), MAX_LEGENDARY_ACTIONS);
    }

    #[test]
    fn test_deserialize_malformed_legendary() {
        let raw = json!({
            "name": "Young Dragon",
            "faction": "monster_side",
            "current_hp": 100,
            "max_hp": 100,
            "armor_class": 18,
            "legendary_actions": ["Detect", "Tail Attack"]
        });
        let dragon: Combatant = serde_json::from_value(raw).unwrap();
        assert_eq!(dragon.legendary_actions, 2);
        assert_eq!(dragon.speed, 30);
        assert_eq!(dragon.status, LifeStatus::Conscious);
    }

    #[test]
    fn test_proficiency_bonus() {
        let c = Combatant::new("A", Faction::PlayerSide, 10, 10);
        assert_eq!(c.proficiency_bonus(), 2);
        assert_eq!(c.clone().with_level(5).proficiency_bonus(), 3);
        assert_eq!(c.clone().with_level(17).proficiency_bonus(), 6);
        assert_eq!(c.with_challenge(0.25).proficiency_bonus(), 2);
    }

    #[test]
    fn test_eligibility() {
        let mut hero = Combatant::new("Hero", Faction::PlayerSide, 10, 10);
        hero.current_hp = 0;
        hero.status = LifeStatus::Unconscious;
        assert!(hero.is_eligible());
        hero.status = LifeStatus::Dead;
        assert!(!hero.is_eligible());

        let mut goblin = Combatant::new("Goblin", Faction::MonsterSide, 7, 15);
        goblin.current_hp = 0;
        assert!(!goblin.is_eligible());
    }

    #[test]
    fn test_incapacitation() {
        let mut c = Combatant::new("A", Faction::PlayerSide, 10, 10);
        assert!(c.can_act());
        c.add_condition(ActiveCondition::new(Condition::Stunned, "Monk"));
        assert!(!c.can_act());
        assert!(!c.can_react());
        c.remove_condition(Condition::Stunned);
        c.add_condition(ActiveCondition::new(Condition::Poisoned, "Dart"));
        assert!(c.can_act());
    }

    #[test]
    fn test_tick_conditions() {
        let mut c = Combatant::new("A", Faction::PlayerSide, 10, 10);
        c.add_condition(ActiveCondition::new(Condition::Poisoned, "Dart").with_duration(1));
        c.add_condition(ActiveCondition::new(Condition::Prone, "Shove"));
        let expired = c.tick_conditions();
        assert_eq!(expired, vec![Condition::Poisoned]);
        assert!(c.has_condition(Condition::Prone));
        assert!(!c.has_condition(Condition::Poisoned));
    }

    #[test]
    fn test_death_saves_cap() {
        let mut saves = DeathSaves::default();
        assert!(!saves.add_failures(2));
        assert!(saves.add_failures(2));
        assert_eq!(saves.failures, 3);
        saves.reset();
        assert_eq!(saves, DeathSaves::default());
    }
}
