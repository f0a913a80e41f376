//! Tactical combat resolution engine.
//!
//! This crate provides:
//! - D&D 5e-style combat mechanics (attacks, saves, healing, death saves)
//! - Initiative, surprise, and the per-turn action economy
//! - A tolerant decoder for free-form decision text
//! - A background controller that asks a decision oracle what each
//!   combatant does and resolves it turn by turn
//!
//! # Quick Start
//!
//! ```ignore
//! use combat_core::{ChannelObserver, CombatState, Controller, Mode, RandomDice};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state: CombatState = serde_json::from_str(&std::fs::read_to_string("encounter.json")?)?;
//!     let controller = Controller::new(MyOracle::default());
//!     let (observer, mut events) = ChannelObserver::channel();
//!
//!     controller.start(&state, Arc::new(RandomDice::new()), Arc::new(observer), Mode::Continuous)?;
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event.phase());
//!     }
//!     println!("{:?}", controller.summary());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod combatant;
pub mod controller;
pub mod decoder;
pub mod dice;
pub mod economy;
pub mod heuristics;
pub mod initiative;
pub mod intent;
pub mod rules;
pub mod state;
pub mod testing;

// Primary public API
pub use combatant::{
    Ability, AbilityScores, ActiveCondition, CatalogEntry, Combatant, CombatantId, Condition,
    DeathSaves, Faction, LifeStatus,
};
pub use controller::{
    ChannelObserver, CombatEvent, CombatObserver, Controller, ControllerConfig, DecisionOracle,
    Diagnostics, Mode, OracleError, Phase, Situation, StartError,
};
pub use decoder::{decode, decode_intent, try_decode_intent, IntentError};
pub use dice::{Advantage, DiceExpression, DiceRoller, RandomDice};
pub use heuristics::{ChallengeHeuristic, MechanicsFallback};
pub use intent::{ActionIntent, ValidationError};
pub use rules::{ActionKind, ActionResult, DiceRoll, EffectTag, RulesEngine};
pub use state::{CombatOutcome, CombatState, CombatSummary, TurnLogEntry};
pub use testing::{RecordingObserver, ScriptedDice, ScriptedOracle};
