//! The decision oracle seam.
//!
//! The controller hands the oracle a serializable [`Situation`] and gets raw
//! text back. What produces the text (a language model, a scripted test
//! double, a human at a prompt) is the host's business. Timeouts and retries
//! are composed around the oracle at controller construction.

use super::diagnostics::Diagnostics;
use crate::combatant::{
    CatalogEntry, Combatant, CombatantId, Condition, DeathSaves, Faction, LifeStatus,
};
use crate::economy::{self, Availability};
use crate::intent::ActionIntent;
use crate::state::CombatState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from an oracle call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("oracle failed: {0}")]
    Failed(String),
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle has nothing more to say")]
    Exhausted,
}

/// Produces raw decision text for a combatant's turn.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, situation: &Situation) -> Result<String, OracleError>;
}

#[async_trait]
impl<O: DecisionOracle + ?Sized> DecisionOracle for Arc<O> {
    async fn decide(&self, situation: &Situation) -> Result<String, OracleError> {
        (**self).decide(situation).await
    }
}

// ============================================================================
// Situation
// ============================================================================

/// What the oracle is told about one combatant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantView {
    pub id: CombatantId,
    pub name: String,
    pub faction: Faction,
    pub current_hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
    pub status: LifeStatus,
    pub conditions: Vec<Condition>,
    pub dodging: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentration: Option<String>,
}

impl From<&Combatant> for CombatantView {
    fn from(c: &Combatant) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            faction: c.faction,
            current_hp: c.current_hp,
            max_hp: c.max_hp,
            armor_class: c.armor_class,
            status: c.status,
            conditions: c.conditions.iter().map(|a| a.condition).collect(),
            dodging: c.dodging,
            concentration: c.concentration.clone(),
        }
    }
}

/// The acting combatant's view, with its own resources and catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorView {
    #[serde(flatten)]
    pub view: CombatantView,
    pub speed: u32,
    pub death_saves: DeathSaves,
    pub traits: Vec<String>,
    pub available: Availability,
    pub catalog: Vec<CatalogEntry>,
}

/// Serialized input for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Situation {
    pub round: u32,
    pub actor: ActorView,
    /// Same side as the actor, excluding the actor and anyone out of the fight.
    pub allies: Vec<CombatantView>,
    pub enemies: Vec<CombatantView>,
}

impl Situation {
    pub fn new(state: &CombatState, actor: &Combatant) -> Self {
        let others = state
            .combatants
            .iter()
            .filter(|c| c.id != actor.id && c.is_eligible());
        let (allies, enemies): (Vec<&Combatant>, Vec<&Combatant>) =
            others.partition(|c| c.faction == actor.faction);
        Self {
            round: state.round,
            actor: ActorView {
                view: CombatantView::from(actor),
                speed: actor.speed,
                death_saves: actor.death_saves,
                traits: actor.traits.clone(),
                available: economy::availability(actor),
                catalog: actor.catalog.clone(),
            },
            allies: allies.into_iter().map(CombatantView::from).collect(),
            enemies: enemies.into_iter().map(CombatantView::from).collect(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ============================================================================
// Wrappers
// ============================================================================

/// Retries failed calls up to `retries` extra times.
pub struct RetryingOracle {
    inner: Arc<dyn DecisionOracle>,
    retries: u32,
}

impl RetryingOracle {
    pub fn new(inner: Arc<dyn DecisionOracle>, retries: u32) -> Self {
        Self { inner, retries }
    }
}

#[async_trait]
impl DecisionOracle for RetryingOracle {
    async fn decide(&self, situation: &Situation) -> Result<String, OracleError> {
        let mut attempt = 0;
        loop {
            match self.inner.decide(situation).await {
                Ok(text) => return Ok(text),
                Err(OracleError::Exhausted) => return Err(OracleError::Exhausted),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, actor = %situation.actor.view.name, "retrying oracle call");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Caps wall-clock time per call; on expiry answers with the neutral intent.
pub struct TimeoutOracle {
    inner: Arc<dyn DecisionOracle>,
    timeout: Duration,
    diagnostics: Option<Arc<Diagnostics>>,
}

impl TimeoutOracle {
    pub fn new(inner: Arc<dyn DecisionOracle>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }
}

#[async_trait]
impl DecisionOracle for TimeoutOracle {
    async fn decide(&self, situation: &Situation) -> Result<String, OracleError> {
        match tokio::time::timeout(self.timeout, self.inner.decide(situation)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    actor = %situation.actor.view.name,
                    timeout = ?self.timeout,
                    "oracle timed out, using neutral intent"
                );
                if let Some(diagnostics) = &self.diagnostics {
                    diagnostics.record_timeout();
                }
                serde_json::to_string(&ActionIntent::neutral())
                    .map_err(|_| OracleError::Timeout(self.timeout))
            }
        }
    }
}

/// Times the decision step and records it.
pub struct TimedStep {
    diagnostics: Arc<Diagnostics>,
}

impl TimedStep {
    pub fn new(diagnostics: Arc<Diagnostics>) -> Self {
        Self { diagnostics }
    }

    pub async fn run<F, T>(&self, step: F) -> Result<T, OracleError>
    where
        F: Future<Output = Result<T, OracleError>>,
    {
        let _guard = self.diagnostics.call_started();
        let started = Instant::now();
        let result = step.await;
        self.diagnostics
            .record_call(started.elapsed(), result.is_ok());
        result
    }
}
