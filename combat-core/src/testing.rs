//! Testing utilities for the combat engine.
//!
//! This module provides tools for deterministic tests:
//! - `ScriptedDice` returns queued rolls instead of random ones
//! - `ScriptedOracle` replays canned decision text
//! - `RecordingObserver` collects every notification
//! - Sample combatants and assertion helpers

use crate::combatant::{AbilityScores, CatalogEntry, Combatant, Faction, LifeStatus};
use crate::controller::{lock, CombatObserver, DecisionOracle, OracleError, Phase, Situation};
use crate::dice::DiceRoller;
use crate::intent::ActionIntent;
use crate::state::{CombatState, CombatSummary};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Dice
// ============================================================================

/// A dice roller that returns scripted values.
///
/// Queued values are handed out in order regardless of expression. Once the
/// queue is empty, a per-expression default is used if one matches, then
/// the global fallback.
pub struct ScriptedDice {
    queue: Mutex<VecDeque<i32>>,
    defaults: HashMap<String, i32>,
    fallback: i32,
    /// Every expression rolled, in order.
    history: Mutex<Vec<String>>,
}

impl ScriptedDice {
    pub fn new(values: impl IntoIterator<Item = i32>) -> Self {
        Self {
            queue: Mutex::new(values.into_iter().collect()),
            defaults: HashMap::new(),
            fallback: 10,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Every roll answers `value`.
    pub fn constant(value: i32) -> Self {
        Self::new([]).with_fallback(value)
    }

    pub fn with_fallback(mut self, value: i32) -> Self {
        self.fallback = value;
        self
    }

    /// Answer `value` for `expression` once the queue runs dry.
    pub fn with_default(mut self, expression: &str, value: i32) -> Self {
        self.defaults.insert(expression.to_lowercase(), value);
        self
    }

    pub fn push(&self, value: i32) {
        lock(&self.queue).push_back(value);
    }

    pub fn remaining(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }
}

impl DiceRoller for ScriptedDice {
    fn roll(&self, expression: &str) -> i32 {
        lock(&self.history).push(expression.to_string());
        if let Some(value) = lock(&self.queue).pop_front() {
            return value;
        }
        self.defaults
            .get(&expression.to_lowercase())
            .copied()
            .unwrap_or(self.fallback)
    }
}

// ============================================================================
// Oracle
// ============================================================================

/// An oracle that replays scripted decision text.
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<String>>,
    /// When the script runs out: `Exhausted` if true, the neutral intent
    /// otherwise.
    exhaust: bool,
    delay: Option<Duration>,
    seen: Mutex<Vec<Situation>>,
}

impl ScriptedOracle {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            exhaust: false,
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Build from intents, serialized as clean JSON.
    pub fn from_intents(intents: impl IntoIterator<Item = ActionIntent>) -> Self {
        Self::new(
            intents
                .into_iter()
                .map(|i| serde_json::to_string(&i).unwrap_or_default()),
        )
    }

    /// Fail with `Exhausted` once the script is used up.
    pub fn exhausting(mut self) -> Self {
        self.exhaust = true;
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: impl Into<String>) {
        lock(&self.responses).push_back(response.into());
    }

    /// Situations received so far.
    pub fn situations(&self) -> Vec<Situation> {
        lock(&self.seen).clone()
    }

    /// Names of the actors asked about, in order.
    pub fn actors(&self) -> Vec<String> {
        lock(&self.seen)
            .iter()
            .map(|s| s.actor.view.name.clone())
            .collect()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, situation: &Situation) -> Result<String, OracleError> {
        lock(&self.seen).push(situation.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = lock(&self.responses).pop_front();
        match next {
            Some(text) => Ok(text),
            None if self.exhaust => Err(OracleError::Exhausted),
            None => serde_json::to_string(&ActionIntent::neutral())
                .map_err(|e| OracleError::Failed(e.to_string())),
        }
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Records every notification for later inspection.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(Phase, Option<String>)>>,
    snapshots: Mutex<Vec<CombatState>>,
    summary: Mutex<Option<CombatSummary>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> Vec<Phase> {
        lock(&self.events).iter().map(|(p, _)| *p).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|(_, e)| e.clone())
            .collect()
    }

    pub fn count(&self, phase: Phase) -> usize {
        lock(&self.events).iter().filter(|(p, _)| *p == phase).count()
    }

    pub fn last_snapshot(&self) -> Option<CombatState> {
        lock(&self.snapshots).last().cloned()
    }

    pub fn summary(&self) -> Option<CombatSummary> {
        lock(&self.summary).clone()
    }
}

impl CombatObserver for RecordingObserver {
    fn notify(&self, snapshot: &CombatState, phase: Phase, error: Option<&str>) {
        lock(&self.events).push((phase, error.map(str::to_string)));
        lock(&self.snapshots).push(snapshot.clone());
    }

    fn summary(&self, summary: &CombatSummary) {
        *lock(&self.summary) = Some(summary.clone());
    }
}

// ============================================================================
// Sample combatants
// ============================================================================

/// Level 1 fighter: 20 HP, AC 16, initiative 10, longsword.
pub fn sample_fighter(name: impl Into<String>) -> Combatant {
    Combatant::new(name, Faction::PlayerSide, 20, 16)
        .with_ability_scores(AbilityScores::new(16, 12, 14, 10, 12, 8))
        .with_level(1)
        .with_initiative(10)
        .with_catalog_entry(CatalogEntry::new("Longsword").with_attack(5, "1d8+3"))
}

/// Goblin: 7 HP, AC 15, initiative 15, scimitar.
pub fn sample_goblin(name: impl Into<String>) -> Combatant {
    Combatant::new(name, Faction::MonsterSide, 7, 15)
        .with_ability_scores(AbilityScores::new(8, 14, 10, 10, 8, 8))
        .with_challenge(0.25)
        .with_initiative(15)
        .with_catalog_entry(CatalogEntry::new("Scimitar").with_attack(4, "1d6+2"))
}

/// One fighter against one goblin.
pub fn sample_encounter() -> CombatState {
    CombatState::new(vec![sample_fighter("Fighter"), sample_goblin("Goblin")])
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert a named combatant's HP.
#[track_caller]
pub fn assert_hp(state: &CombatState, name: &str, expected: i32) {
    let combatant = state
        .find_target(name)
        .unwrap_or_else(|| panic!("Expected combatant '{name}' to exist"));
    assert_eq!(
        combatant.current_hp, expected,
        "Expected {name} to have {expected} HP, got {}",
        combatant.current_hp
    );
}

/// Assert a named combatant's life status.
#[track_caller]
pub fn assert_status(state: &CombatState, name: &str, expected: LifeStatus) {
    let combatant = state
        .find_target(name)
        .unwrap_or_else(|| panic!("Expected combatant '{name}' to exist"));
    assert_eq!(
        combatant.status, expected,
        "Expected {name} to be {expected}, got {}",
        combatant.status
    );
}
