//! Action intents.
//!
//! An intent is what a combatant wants to do this turn, as reported by the
//! decision oracle: free-form action text plus whatever mechanical hints the
//! oracle chose to include. The rules engine turns it into an outcome.

use crate::combatant::{Ability, Condition};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Action text used whenever a usable intent cannot be recovered.
pub const NEUTRAL_ACTION: &str = "takes a cautious, defensive action";

lazy_static! {
    static ref FIRST_INTEGER: Regex = Regex::new(r"[-+]?\d+").expect("valid regex");
}

/// Validation failures for a decoded record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("record has no action field")]
    MissingAction,
    #[error("action field is empty")]
    EmptyAction,
    #[error("action field must be a string, got {0}")]
    ActionNotString(String),
}

/// A validated action intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionIntent {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_bonus: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_dice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_dc: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_ability: Option<Ability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healing_dice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Status condition applied on a failed save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_duration: Option<u32>,
    /// Feet of movement for movement actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_feet: Option<u32>,
    /// Initiative count a readied action waits for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_initiative: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentration: Option<bool>,
    /// Fields the oracle sent that we do not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActionIntent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: None,
            explanation: None,
            attack_bonus: None,
            damage_dice: None,
            damage_type: None,
            save_dc: None,
            save_ability: None,
            healing_dice: None,
            destination: None,
            condition: None,
            condition_duration: None,
            distance_feet: None,
            trigger_initiative: None,
            concentration: None,
            extra: Map::new(),
        }
    }

    /// The fallback intent: defensive, no target.
    pub fn neutral() -> Self {
        Self::new(NEUTRAL_ACTION)
    }

    pub fn is_neutral(&self) -> bool {
        self.action == NEUTRAL_ACTION && self.target.is_none()
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
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

    pub fn with_condition(mut self, condition: Condition, duration_rounds: Option<u32>) -> Self {
        self.condition = Some(condition);
        self.condition_duration = duration_rounds;
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>, feet: Option<u32>) -> Self {
        self.destination = Some(destination.into());
        self.distance_feet = feet;
        self
    }

    pub fn with_trigger(mut self, initiative: i32) -> Self {
        self.trigger_initiative = Some(initiative);
        self
    }

    pub fn with_concentration(mut self) -> Self {
        self.concentration = Some(true);
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Recognized field names and the aliases oracles tend to use for them.
const FIELDS: &[(&str, &[&str])] = &[
    ("action", &["action", "action_text", "act"]),
    ("target", &["target", "target_name", "target_id"]),
    ("explanation", &["explanation", "reason", "reasoning", "rationale"]),
    ("attack_bonus", &["attack_bonus", "to_hit", "attack_modifier"]),
    ("damage_dice", &["damage_dice", "damage", "damage_roll"]),
    ("damage_type", &["damage_type"]),
    ("save_dc", &["save_dc", "dc", "spell_dc"]),
    ("save_ability", &["save_ability", "save", "saving_throw"]),
    ("healing_dice", &["healing_dice", "healing", "heal_dice"]),
    ("destination", &["destination", "position", "move_to"]),
    ("condition", &["condition", "status", "status_effect"]),
    ("condition_duration", &["condition_duration", "duration", "duration_rounds"]),
    ("distance_feet", &["distance_feet", "distance", "movement"]),
    ("trigger_initiative", &["trigger_initiative", "trigger", "ready_trigger"]),
    ("concentration", &["concentration", "requires_concentration"]),
];

fn canonical(key: &str) -> Option<&'static str> {
    let key = key.trim().to_lowercase().replace([' ', '-'], "_");
    FIELDS
        .iter()
        .find(|(_, aliases)| aliases.contains(&key.as_str()))
        .map(|(name, _)| *name)
}

/// Turn a decoded record into a typed intent.
///
/// Only `action` is mandatory. Optional fields that cannot be coerced to
/// their type are kept verbatim in `extra` instead of failing the record.
pub fn validate(record: &Map<String, Value>) -> Result<ActionIntent, ValidationError> {
    let action_value = record
        .iter()
        .find(|(k, _)| canonical(k) == Some("action"))
        .map(|(_, v)| v)
        .ok_or(ValidationError::MissingAction)?;
    let action = match action_value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return Err(ValidationError::MissingAction),
        other => return Err(ValidationError::ActionNotString(type_name(other).to_string())),
    };
    if action.is_empty() {
        return Err(ValidationError::EmptyAction);
    }

    let mut intent = ActionIntent::new(action);
    for (key, value) in record {
        let accepted = match canonical(key) {
            Some("action") => true,
            Some("target") => set(&mut intent.target, coerce_string(value)),
            Some("explanation") => set(&mut intent.explanation, coerce_string(value)),
            Some("attack_bonus") => set(&mut intent.attack_bonus, coerce_i32(value)),
            Some("damage_dice") => set(&mut intent.damage_dice, coerce_dice(value)),
            Some("damage_type") => set(&mut intent.damage_type, coerce_string(value)),
            Some("save_dc") => set(&mut intent.save_dc, coerce_i32(value)),
            Some("save_ability") => set(
                &mut intent.save_ability,
                coerce_string(value).and_then(|s| Ability::from_loose(&s)),
            ),
            Some("healing_dice") => set(&mut intent.healing_dice, coerce_dice(value)),
            Some("destination") => set(&mut intent.destination, coerce_string(value)),
            Some("condition") => set(
                &mut intent.condition,
                coerce_string(value).and_then(|s| Condition::from_loose(&s)),
            ),
            Some("condition_duration") => {
                set(&mut intent.condition_duration, coerce_u32(value))
            }
            Some("distance_feet") => set(&mut intent.distance_feet, coerce_u32(value)),
            Some("trigger_initiative") => set(&mut intent.trigger_initiative, coerce_i32(value)),
            Some("concentration") => set(&mut intent.concentration, coerce_bool(value)),
            _ => false,
        };
        if !accepted && !value.is_null() {
            intent.extra.insert(key.clone(), value.clone());
        }
    }
    Ok(intent)
}

/// Fill `slot` once; later aliases for the same field do not overwrite it.
fn set<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(v) => {
            if slot.is_none() {
                *slot = Some(v);
            }
            true
        }
        None => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            let lowered = s.to_lowercase();
            if s.is_empty() || matches!(lowered.as_str(), "none" | "null" | "n/a") {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integers, floats, and strings such as `"+5"` or `"DC 15"`.
pub fn coerce_i32(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.trim_start_matches('+').parse::<i32>() {
                return Some(n);
            }
            if let Ok(f) = s.parse::<f64>() {
                return Some(f.round() as i32);
            }
            FIRST_INTEGER
                .find(s)
                .and_then(|m| m.as_str().trim_start_matches('+').parse().ok())
        }
        _ => None,
    }
}

fn coerce_u32(value: &Value) -> Option<u32> {
    coerce_i32(value).and_then(|n| u32::try_from(n).ok())
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Dice notation, or a bare number treated as a flat amount.
fn coerce_dice(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_i64().filter(|n| *n > 0).map(|n| n.to_string()),
        other => coerce_string(other),
    }
}
