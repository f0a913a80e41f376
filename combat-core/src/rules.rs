//! Rules engine: intents in, mechanical outcomes out.
//!
//! Resolution runs in two halves:
//! 1. [`RulesEngine::resolve`] turns an [`ActionIntent`] into an
//!    [`ActionResult`] against a read-only view of the encounter. It rolls
//!    every die through the injected [`DiceRoller`] and never mutates state.
//! 2. [`apply_result`] merges a result into the [`CombatState`]: hit points,
//!    life status, death saves, conditions, dodging, concentration, and
//!    readied actions.
//!
//! Keeping the halves apart means outcomes can be checked deterministically
//! without touching a live encounter.

use crate::combatant::{
    Ability, ActiveCondition, Combatant, CombatantId, Condition, LifeStatus,
};
use crate::dice::{self, Advantage, DiceError, DiceExpression, DiceRoller};
use crate::heuristics::{ChallengeHeuristic, MechanicsFallback};
use crate::initiative::OrderEvent;
use crate::intent::ActionIntent;
use crate::state::CombatState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Lowest DC a concentration save can have.
const MIN_CONCENTRATION_DC: i32 = 10;

/// A death save at or above this counts as a success.
const DEATH_SAVE_DC: i32 = 10;

/// Error type for resolution. Never escapes `resolve`; a failed resolution
/// becomes a zero-effect result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("no target named {0:?}")]
    UnknownTarget(String),
    #[error("{0} needs a target")]
    MissingTarget(&'static str),
    #[error("bad dice {expression:?}: {source}")]
    InvalidDice {
        expression: String,
        #[source]
        source: DiceError,
    },
}

/// One recorded roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub expression: String,
    pub result: i32,
    pub purpose: String,
}

impl DiceRoll {
    pub fn new(expression: impl Into<String>, result: i32, purpose: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            result,
            purpose: purpose.into(),
        }
    }
}

/// Effects attached to a result beyond plain damage and healing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectTag {
    /// The actor takes the Dodge action.
    Dodge,
    /// A natural 20 on an attack.
    Critical,
    /// Applied to the result's target.
    ApplyCondition {
        condition: Condition,
        duration_rounds: Option<u32>,
    },
    /// The actor starts concentrating on a spell.
    Concentrating { spell: String },
    /// The actor readies an action for the given initiative count.
    Ready { trigger: i32 },
    Moved {
        destination: Option<String>,
        feet: Option<u32>,
    },
    /// The target made its saving throw.
    SaveSucceeded,
    SaveFailed,
}

/// The outcome of resolving an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub damage: i32,
    pub healing: i32,
    pub target: Option<CombatantId>,
    pub dice_rolls: Vec<DiceRoll>,
    pub narrative: String,
    pub effects: Vec<EffectTag>,
}

impl ActionResult {
    /// A successful result with no mechanical effect yet.
    pub fn new(narrative: impl Into<String>) -> Self {
        Self {
            success: true,
            damage: 0,
            healing: 0,
            target: None,
            dice_rolls: Vec::new(),
            narrative: narrative.into(),
            effects: Vec::new(),
        }
    }

    /// A failed result that changes nothing.
    pub fn no_effect(narrative: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::new(narrative)
        }
    }

    pub fn with_target(mut self, target: CombatantId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_effect(mut self, effect: EffectTag) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_rolls(mut self, rolls: impl IntoIterator<Item = DiceRoll>) -> Self {
        self.dice_rolls.extend(rolls);
        self
    }

    pub fn has_effect(&self, effect: &EffectTag) -> bool {
        self.effects.contains(effect)
    }

    pub fn is_critical(&self) -> bool {
        self.has_effect(&EffectTag::Critical)
    }
}

/// Coarse category of an action, from its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Attack,
    Spell,
    Heal,
    Movement,
    Dodge,
    Ready,
    Other,
}

const CLASSIFIERS: &[(ActionKind, &[&str])] = &[
    (
        ActionKind::Attack,
        &["attack", "strike", "slash", "stab", "shoot", "fire"],
    ),
    (ActionKind::Spell, &["cast", "spell", "magic"]),
    (ActionKind::Heal, &["heal", "cure", "restore"]),
    (
        ActionKind::Movement,
        &["move", "position", "approach", "retreat"],
    ),
    (ActionKind::Dodge, &["dodge"]),
    (ActionKind::Ready, &["ready", "hold"]),
];

impl ActionKind {
    /// First matching keyword group wins. Whole words are tried before
    /// keywords buried inside longer words ("fireball", "counterattack"),
    /// so "cast fireball" is still a spell.
    pub fn classify(action_text: &str) -> ActionKind {
        let lowered = action_text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        first_group(|kw: &str| words.iter().any(|w| word_matches(w, kw)))
            .or_else(|| first_group(|kw: &str| lowered.contains(kw)))
            .unwrap_or(ActionKind::Other)
    }
}

fn first_group(matches: impl Fn(&str) -> bool) -> Option<ActionKind> {
    CLASSIFIERS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| matches(kw)))
        .map(|(kind, _)| *kind)
}

/// `word` is `keyword` or a plain inflection of it ("strikes", "healing",
/// "dodging", "magical").
fn word_matches(word: &str, keyword: &str) -> bool {
    const SUFFIXES: &[&str] = &["", "s", "es", "ing", "ed", "d", "er", "al", "ic"];
    if let Some(rest) = word.strip_prefix(keyword) {
        return SUFFIXES.contains(&rest);
    }
    keyword
        .strip_suffix('e')
        .and_then(|stem| word.strip_prefix(stem))
        .is_some_and(|rest| rest == "ing")
}

/// Outcome of a saving throw made outside an action, such as concentration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub roll: DiceRoll,
    pub dc: i32,
    pub success: bool,
}

/// Result category of a death save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathSaveResult {
    /// Natural 20: back on their feet with 1 HP.
    Revived,
    Success,
    Failure,
    /// Natural 1: counts as two failures.
    CriticalFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSave {
    pub roll: DiceRoll,
    pub result: DeathSaveResult,
}

// ============================================================================
// Rules engine
// ============================================================================

/// Resolves intents into results.
#[derive(Clone)]
pub struct RulesEngine {
    fallback: Arc<dyn MechanicsFallback>,
}

impl Default for RulesEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RulesEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesEngine").finish_non_exhaustive()
    }
}

impl RulesEngine {
    pub fn new() -> Self {
        Self::with_fallback(ChallengeHeuristic::default())
    }

    /// Use a different strategy for missing attack/damage/save/healing hints.
    pub fn with_fallback(fallback: impl MechanicsFallback + 'static) -> Self {
        Self {
            fallback: Arc::new(fallback),
        }
    }

    /// Resolve an intent for `actor`.
    ///
    /// Never fails: unknown targets and malformed dice produce a
    /// zero-effect result with an explanatory narrative.
    pub fn resolve(
        &self,
        intent: &ActionIntent,
        actor: &Combatant,
        world: &CombatState,
        dice: &dyn DiceRoller,
    ) -> ActionResult {
        match self.try_resolve(intent, actor, world, dice) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(actor = %actor.name, action = %intent.action, error = %e, "resolution failed");
                ActionResult::no_effect(format!(
                    "{} tries to {}, but it comes to nothing ({e}).",
                    actor.name, intent.action
                ))
            }
        }
    }

    fn try_resolve(
        &self,
        intent: &ActionIntent,
        actor: &Combatant,
        world: &CombatState,
        dice: &dyn DiceRoller,
    ) -> Result<ActionResult, RulesError> {
        match ActionKind::classify(&intent.action) {
            ActionKind::Attack => self.resolve_attack(intent, actor, world, dice),
            ActionKind::Spell => self.resolve_spell(intent, actor, world, dice),
            ActionKind::Heal => self.resolve_heal(intent, actor, world, dice),
            ActionKind::Movement => Ok(resolve_movement(intent, actor)),
            ActionKind::Dodge => Ok(ActionResult::new(format!(
                "{} takes the Dodge action, watching for incoming blows.",
                actor.name
            ))
            .with_effect(EffectTag::Dodge)),
            ActionKind::Ready => Ok(resolve_ready(intent, actor)),
            ActionKind::Other => Ok(ActionResult::new(format!(
                "{} {}.",
                actor.name, intent.action
            ))),
        }
    }

    fn target<'w>(
        &self,
        intent: &ActionIntent,
        world: &'w CombatState,
    ) -> Result<Option<&'w Combatant>, RulesError> {
        match intent.target.as_deref() {
            None => Ok(None),
            Some(name) => world
                .find_target(name)
                .map(Some)
                .ok_or_else(|| RulesError::UnknownTarget(name.to_string())),
        }
    }

    fn resolve_attack(
        &self,
        intent: &ActionIntent,
        actor: &Combatant,
        world: &CombatState,
        dice: &dyn DiceRoller,
    ) -> Result<ActionResult, RulesError> {
        let target = self
            .target(intent, world)?
            .ok_or(RulesError::MissingTarget("an attack"))?;
        let entry = actor.catalog_entry(&intent.action);

        let bonus = intent
            .attack_bonus
            .or_else(|| entry.and_then(|e| e.attack_bonus))
            .unwrap_or_else(|| self.fallback.attack_bonus(actor));
        let damage_notation = intent
            .damage_dice
            .clone()
            .or_else(|| entry.and_then(|e| e.damage_dice.clone()))
            .unwrap_or_else(|| self.fallback.damage_dice(actor));
        let damage_expr = parse_dice(&damage_notation)?;

        let advantage = attack_advantage(actor, target);
        let d20 = dice::roll_d20(dice, advantage);
        let total = d20.kept + bonus;
        let critical = d20.is_natural_20();
        let hits = !d20.is_natural_1() && (critical || total >= target.armor_class);

        let mut rolls = vec![DiceRoll::new(
            dice::d20_with(bonus),
            total,
            attack_purpose(target, advantage),
        )];

        if !hits {
            let narrative = if d20.is_natural_1() {
                format!(
                    "{} attacks {} and fumbles badly (natural 1).",
                    actor.name, target.name
                )
            } else {
                format!(
                    "{} attacks {} but misses ({} vs AC {}).",
                    actor.name, target.name, total, target.armor_class
                )
            };
            return Ok(ActionResult::no_effect(narrative)
                .with_target(target.id)
                .with_rolls(rolls));
        }

        let damage_expr = if critical {
            damage_expr.doubled()
        } else {
            damage_expr
        };
        let damage = dice.roll(&damage_expr.original).max(0);
        rolls.push(DiceRoll::new(
            damage_expr.original.clone(),
            damage,
            format!("damage to {}", target.name),
        ));

        let mut result = ActionResult::new(if critical {
            format!(
                "{} lands a critical hit on {} for {} damage!",
                actor.name, target.name, damage
            )
        } else {
            format!(
                "{} hits {} ({} vs AC {}) for {} damage.",
                actor.name, target.name, total, target.armor_class, damage
            )
        })
        .with_target(target.id)
        .with_rolls(rolls);
        result.damage = damage;
        if critical {
            result = result.with_effect(EffectTag::Critical);
        }
        Ok(result)
    }

    fn resolve_spell(
        &self,
        intent: &ActionIntent,
        actor: &Combatant,
        world: &CombatState,
        dice: &dyn DiceRoller,
    ) -> Result<ActionResult, RulesError> {
        let entry = actor.catalog_entry(&intent.action);
        let damage_hint = intent
            .damage_dice
            .clone()
            .or_else(|| entry.and_then(|e| e.damage_dice.clone()));
        let healing_hint =
            intent.healing_dice.is_some() || entry.is_some_and(|e| e.healing_dice.is_some());
        let save_hint = intent.save_dc.is_some() || entry.is_some_and(|e| e.save_dc.is_some());
        if healing_hint && damage_hint.is_none() && !save_hint {
            return self.resolve_heal(intent, actor, world, dice);
        }

        let Some(target) = self.target(intent, world)? else {
            return Ok(with_concentration(
                ActionResult::new(format!(
                    "{} casts {}, and the spell washes over the battlefield.",
                    actor.name, intent.action
                )),
                intent,
            ));
        };

        let dc = intent
            .save_dc
            .or_else(|| entry.and_then(|e| e.save_dc))
            .unwrap_or_else(|| self.fallback.save_dc(actor));
        let ability = intent
            .save_ability
            .or_else(|| entry.and_then(|e| e.save_ability))
            .unwrap_or(Ability::Dexterity);
        let damage_notation = damage_hint.or_else(|| {
            intent
                .condition
                .is_none()
                .then(|| self.fallback.damage_dice(actor))
        });
        let damage_expr = damage_notation.as_deref().map(parse_dice).transpose()?;

        let save_expr = dice::d20_with(target.modifier(ability));
        let save_total = dice.roll(&save_expr);
        let saved = save_total >= dc;
        let mut rolls = vec![DiceRoll::new(
            save_expr,
            save_total,
            format!("{} {} save vs DC {}", target.name, ability.abbreviation(), dc),
        )];

        let full_damage = match &damage_expr {
            Some(expr) => {
                let rolled = dice.roll(&expr.original).max(0);
                rolls.push(DiceRoll::new(
                    expr.original.clone(),
                    rolled,
                    format!("spell damage to {}", target.name),
                ));
                rolled
            }
            None => 0,
        };
        let damage = if saved { full_damage / 2 } else { full_damage };

        let mut narrative = format!(
            "{} casts {} at {}, who {} the {} save ({} vs DC {})",
            actor.name,
            intent.action,
            target.name,
            if saved { "makes" } else { "fails" },
            ability.abbreviation(),
            save_total,
            dc
        );
        if damage > 0 {
            narrative.push_str(&format!(" and takes {damage} damage"));
        }
        narrative.push('.');

        let mut result = ActionResult::new(narrative)
            .with_target(target.id)
            .with_rolls(rolls)
            .with_effect(if saved {
                EffectTag::SaveSucceeded
            } else {
                EffectTag::SaveFailed
            });
        result.damage = damage;
        if !saved {
            if let Some(condition) = intent.condition {
                result = result.with_effect(EffectTag::ApplyCondition {
                    condition,
                    duration_rounds: intent.condition_duration,
                });
            }
        }
        Ok(with_concentration(result, intent))
    }

    fn resolve_heal(
        &self,
        intent: &ActionIntent,
        actor: &Combatant,
        world: &CombatState,
        dice: &dyn DiceRoller,
    ) -> Result<ActionResult, RulesError> {
        let target = self.target(intent, world)?.unwrap_or(actor);
        let notation = intent
            .healing_dice
            .clone()
            .or_else(|| actor.catalog_entry(&intent.action).and_then(|e| e.healing_dice.clone()))
            .unwrap_or_else(|| self.fallback.healing_dice(actor));
        let expr = parse_dice(&notation)?;
        let healing = dice.roll(&expr.original).max(0);

        let who = if target.id == actor.id {
            "themselves".to_string()
        } else {
            target.name.clone()
        };
        let mut result = ActionResult::new(format!(
            "{} heals {} for {} hit points.",
            actor.name, who, healing
        ))
        .with_target(target.id)
        .with_rolls([DiceRoll::new(
            expr.original.clone(),
            healing,
            format!("healing for {}", target.name),
        )]);
        result.healing = healing;
        Ok(with_concentration(result, intent))
    }

    /// Constitution save to keep concentrating after taking damage.
    ///
    /// `None` when the combatant is not concentrating on anything.
    pub fn concentration_check(
        &self,
        combatant: &Combatant,
        damage: i32,
        dice: &dyn DiceRoller,
    ) -> Option<SaveOutcome> {
        let spell = combatant.concentration.as_deref()?;
        let dc = MIN_CONCENTRATION_DC.max(damage / 2);
        let expression = dice::d20_with(combatant.modifier(Ability::Constitution));
        let total = dice.roll(&expression);
        Some(SaveOutcome {
            roll: DiceRoll::new(
                expression,
                total,
                format!("{} concentration on {spell} (DC {dc})", combatant.name),
            ),
            dc,
            success: total >= dc,
        })
    }

    /// Roll a death save for a downed combatant.
    pub fn death_save(&self, combatant: &Combatant, dice: &dyn DiceRoller) -> DeathSave {
        let natural = dice.roll("1d20");
        let result = match natural {
            20 => DeathSaveResult::Revived,
            1 => DeathSaveResult::CriticalFailure,
            n if n >= DEATH_SAVE_DC => DeathSaveResult::Success,
            _ => DeathSaveResult::Failure,
        };
        DeathSave {
            roll: DiceRoll::new("1d20", natural, format!("{} death save", combatant.name)),
            result,
        }
    }
}

fn parse_dice(notation: &str) -> Result<DiceExpression, RulesError> {
    DiceExpression::parse(notation).map_err(|source| RulesError::InvalidDice {
        expression: notation.to_string(),
        source,
    })
}

/// Conditions on the attacker that impose disadvantage on its attacks.
fn hampers_attacks(condition: Condition) -> bool {
    matches!(
        condition,
        Condition::Blinded
            | Condition::Frightened
            | Condition::Poisoned
            | Condition::Prone
            | Condition::Restrained
    )
}

fn attack_advantage(attacker: &Combatant, target: &Combatant) -> Advantage {
    let mut advantage = Advantage::Normal;
    if target.dodging && target.can_act() {
        advantage = advantage.combine(Advantage::Disadvantage);
    }
    if target.is_incapacitated()
        || target
            .conditions
            .iter()
            .any(|c| c.condition.grants_advantage_to_attackers())
    {
        advantage = advantage.combine(Advantage::Advantage);
    }
    if attacker.conditions.iter().any(|c| hampers_attacks(c.condition)) {
        advantage = advantage.combine(Advantage::Disadvantage);
    }
    advantage
}

fn attack_purpose(target: &Combatant, advantage: Advantage) -> String {
    let base = format!("attack vs {} (AC {})", target.name, target.armor_class);
    match advantage {
        Advantage::Normal => base,
        Advantage::Advantage => format!("{base} with advantage"),
        Advantage::Disadvantage => format!("{base} with disadvantage"),
    }
}

fn with_concentration(result: ActionResult, intent: &ActionIntent) -> ActionResult {
    if intent.concentration == Some(true) {
        result.with_effect(EffectTag::Concentrating {
            spell: intent.action.clone(),
        })
    } else {
        result
    }
}

fn resolve_movement(intent: &ActionIntent, actor: &Combatant) -> ActionResult {
    let narrative = match (&intent.destination, intent.distance_feet) {
        (Some(dest), Some(feet)) => format!("{} moves {feet} feet to {dest}.", actor.name),
        (Some(dest), None) => format!("{} moves to {dest}.", actor.name),
        (None, Some(feet)) => format!("{} moves {feet} feet.", actor.name),
        (None, None) => format!("{} {}.", actor.name, intent.action),
    };
    ActionResult::new(narrative).with_effect(EffectTag::Moved {
        destination: intent.destination.clone(),
        feet: intent.distance_feet,
    })
}

fn resolve_ready(intent: &ActionIntent, actor: &Combatant) -> ActionResult {
    match intent.trigger_initiative {
        Some(trigger) => ActionResult::new(format!(
            "{} readies an action, waiting for initiative {trigger}.",
            actor.name
        ))
        .with_effect(EffectTag::Ready { trigger }),
        None => ActionResult::new(format!("{} holds their action.", actor.name)),
    }
}

// ============================================================================
// Applying results
// ============================================================================

/// Merge a resolved result into the encounter.
///
/// Returns extra narrative lines for consequences such as a combatant
/// falling or losing concentration.
pub fn apply_result(
    state: &mut CombatState,
    engine: &RulesEngine,
    actor_id: CombatantId,
    result: &ActionResult,
    dice: &dyn DiceRoller,
) -> Vec<String> {
    let mut notes = Vec::new();
    let actor_name = state
        .get(actor_id)
        .map(|c| c.name.clone())
        .unwrap_or_default();

    if result.damage > 0 {
        if let Some(target) = result.target.and_then(|id| state.get_mut(id)) {
            notes.extend(apply_damage(target, result.damage, result.is_critical()));
            if let Some(check) = engine.concentration_check(target, result.damage, dice) {
                if !check.success {
                    let spell = target.concentration.take().unwrap_or_default();
                    notes.push(format!("{} loses concentration on {spell}.", target.name));
                }
            }
        }
    }

    if result.healing > 0 {
        let target_id = result.target.unwrap_or(actor_id);
        if let Some(target) = state.get_mut(target_id) {
            notes.extend(apply_healing(target, result.healing));
        }
    }

    for effect in &result.effects {
        match effect {
            EffectTag::Dodge => {
                if let Some(actor) = state.get_mut(actor_id) {
                    actor.dodging = true;
                }
            }
            EffectTag::ApplyCondition {
                condition,
                duration_rounds,
            } => {
                let target_id = result.target.unwrap_or(actor_id);
                if let Some(target) = state.get_mut(target_id) {
                    if target.status.is_terminal() {
                        continue;
                    }
                    let mut active = ActiveCondition::new(*condition, actor_name.clone());
                    if let Some(rounds) = duration_rounds {
                        active = active.with_duration(*rounds);
                    }
                    target.add_condition(active);
                    notes.push(format!("{} is now {}.", target.name, condition.name().to_lowercase()));
                }
            }
            EffectTag::Concentrating { spell } => {
                if let Some(actor) = state.get_mut(actor_id) {
                    actor.concentration = Some(spell.clone());
                }
            }
            EffectTag::Ready { trigger } => {
                state.queue_order_event(OrderEvent::Ready {
                    combatant: actor_id,
                    trigger: *trigger,
                });
            }
            EffectTag::Critical
            | EffectTag::Moved { .. }
            | EffectTag::SaveSucceeded
            | EffectTag::SaveFailed => {}
        }
    }
    notes
}

/// Reduce HP (never below 0) and update life status.
pub fn apply_damage(target: &mut Combatant, damage: i32, critical: bool) -> Option<String> {
    if target.status.is_terminal() || damage <= 0 {
        return None;
    }
    let was_down = matches!(target.status, LifeStatus::Unconscious | LifeStatus::Stable);
    target.current_hp = (target.current_hp - damage).max(0);
    if target.current_hp > 0 {
        return None;
    }

    if target.is_monster() {
        target.status = LifeStatus::Dead;
        target.concentration = None;
        return Some(format!("{} is slain.", target.name));
    }

    if was_down {
        target.status = LifeStatus::Unconscious;
        let failures = if critical { 2 } else { 1 };
        if target.death_saves.add_failures(failures) {
            target.status = LifeStatus::Dead;
            return Some(format!("{} succumbs to their wounds.", target.name));
        }
        return Some(format!(
            "{} takes damage while down ({} death save failures).",
            target.name, target.death_saves.failures
        ));
    }

    target.status = LifeStatus::Unconscious;
    target.death_saves.reset();
    target.concentration = None;
    Some(format!("{} falls unconscious!", target.name))
}

/// Restore HP up to the maximum; a downed combatant gets back up.
pub fn apply_healing(target: &mut Combatant, amount: i32) -> Option<String> {
    if target.status.is_terminal() || amount <= 0 {
        return None;
    }
    target.current_hp = (target.current_hp + amount).min(target.max_hp);
    let was_down = matches!(target.status, LifeStatus::Unconscious | LifeStatus::Stable);
    if was_down && target.current_hp > 0 {
        target.status = LifeStatus::Conscious;
        target.death_saves.reset();
        return Some(format!("{} regains consciousness.", target.name));
    }
    None
}

/// Apply a rolled death save. Returns the narrative.
pub fn apply_death_save(combatant: &mut Combatant, result: DeathSaveResult) -> String {
    match result {
        DeathSaveResult::Revived => {
            combatant.current_hp = 1;
            combatant.status = LifeStatus::Conscious;
            combatant.death_saves.reset();
            format!("{} rolls a natural 20 and surges back to their feet!", combatant.name)
        }
        DeathSaveResult::Success => {
            if combatant.death_saves.add_success() {
                combatant.status = LifeStatus::Stable;
                combatant.death_saves.reset();
                format!("{} stabilizes.", combatant.name)
            } else {
                format!(
                    "{} succeeds on a death save ({} of 3).",
                    combatant.name, combatant.death_saves.successes
                )
            }
        }
        DeathSaveResult::Failure | DeathSaveResult::CriticalFailure => {
            let count = if result == DeathSaveResult::CriticalFailure {
                2
            } else {
                1
            };
            if combatant.death_saves.add_failures(count) {
                combatant.status = LifeStatus::Dead;
                format!("{} fails their final death save and dies.", combatant.name)
            } else {
                format!(
                    "{} fails a death save ({} of 3).",
                    combatant.name, combatant.death_saves.failures
                )
            }
        }
    }
}
