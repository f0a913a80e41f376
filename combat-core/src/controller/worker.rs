//! The background turn loop.

use super::diagnostics::Diagnostics;
use super::observer::{self, CombatObserver, Phase};
use super::oracle::{DecisionOracle, Situation, TimedStep};
use super::{lock, ControllerConfig, Mode, Shared};
use crate::catalog;
use crate::combatant::{Combatant, CombatantId, LifeStatus};
use crate::decoder;
use crate::dice::DiceRoller;
use crate::economy::{self, ResourceKind};
use crate::initiative;
use crate::intent::{ActionIntent, NEUTRAL_ACTION};
use crate::rules::{self, ActionKind, RulesEngine};
use crate::state::{CombatOutcome, CombatState, TurnLogEntry};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub(super) struct Worker {
    pub state: CombatState,
    pub dice: Arc<dyn DiceRoller>,
    pub observer: Arc<dyn CombatObserver>,
    pub oracle: Arc<dyn DecisionOracle>,
    pub engine: RulesEngine,
    pub timed: TimedStep,
    pub diagnostics: Arc<Diagnostics>,
    pub config: ControllerConfig,
    pub shared: Arc<Shared>,
    pub generation: u64,
}

/// Clears the running flag when the worker exits, however it exits, unless
/// a newer run has taken over.
struct RunningGuard {
    shared: Arc<Shared>,
    generation: u64,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut flags = lock(&self.shared.flags);
        if flags.generation == self.generation {
            flags.running = false;
            flags.paused = false;
            flags.stop_requested = false;
        }
    }
}

impl Worker {
    pub async fn run(mut self) {
        let _running = RunningGuard {
            shared: self.shared.clone(),
            generation: self.generation,
        };

        let outcome = match AssertUnwindSafe(self.run_loop()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(error = %message, "combat worker panicked");
                self.publish(Phase::Error, Some(&message));
                CombatOutcome::Stopped
            }
        };
        self.finish(outcome);
    }

    async fn run_loop(&mut self) -> CombatOutcome {
        self.prepare();

        loop {
            if self.stop_requested() {
                self.publish(Phase::Stopped, None);
                return CombatOutcome::Stopped;
            }
            if let Some(outcome) = self.state.outcome() {
                return outcome;
            }
            if self.state.round > self.config.max_rounds {
                tracing::warn!(max_rounds = self.config.max_rounds, "round ceiling reached");
                return CombatOutcome::RoundLimit;
            }

            let Some(actor_id) = self.state.current_actor() else {
                // Nobody may act this round, e.g. everyone surprised.
                self.state.end_round();
                self.publish(Phase::RoundComplete, None);
                continue;
            };

            let trigger = self.state.is_trigger_slot();
            if trigger && self.takes_turn(actor_id) {
                self.state.release_readied(actor_id);
            }
            let acted = !trigger && self.takes_turn(actor_id);
            if acted {
                self.run_turn(actor_id).await;
                self.publish(Phase::TurnComplete, None);
                if let Some(outcome) = self.state.outcome() {
                    return outcome;
                }
            }

            if self.state.advance() {
                tracing::debug!(round = self.state.round, "round complete");
                self.publish(Phase::RoundComplete, None);
            }

            if !acted {
                continue;
            }
            match self.mode() {
                Mode::Step => self.pause().await,
                Mode::Continuous => tokio::time::sleep(self.config.turn_delay).await,
            }
        }
    }

    /// Catalog hygiene, initiative, and ledgers, before the first turn.
    fn prepare(&mut self) {
        catalog::tag_owners(&mut self.state);
        let dropped = catalog::retain_owned(&mut self.state);
        self.state.prepare(&*self.dice);

        let order: Vec<&str> = self
            .state
            .initiative_order
            .iter()
            .filter_map(|id| self.state.get(*id))
            .map(|c| c.name.as_str())
            .collect();
        tracing::info!(?order, dropped_catalog_entries = dropped, "initiative rolled");
    }

    /// Re-checked at the slot, since the actor may have dropped since the
    /// order was derived.
    fn takes_turn(&self, id: CombatantId) -> bool {
        self.state
            .get(id)
            .is_some_and(|c| initiative::is_active(c, self.state.round, &self.state.surprise))
    }

    async fn run_turn(&mut self, actor_id: CombatantId) {
        let turn = AssertUnwindSafe(self.take_turn(actor_id)).catch_unwind().await;
        if let Err(panic) = turn {
            let message = panic_message(&*panic);
            self.diagnostics.record_turn_panic();
            tracing::error!(error = %message, "turn panicked, logging a no-op");
            self.publish(Phase::Error, Some(&message));

            let name = self
                .state
                .get(actor_id)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            self.state.turn_log.push(TurnLogEntry {
                round: self.state.round,
                actor_name: name.clone(),
                action_text: NEUTRAL_ACTION.to_string(),
                dice_rolls: Vec::new(),
                narrative: format!("{name} hesitates, and the moment passes."),
            });
        }
    }

    async fn take_turn(&mut self, actor_id: CombatantId) {
        self.state.begin_turn(actor_id);
        let Some(actor) = self.state.get(actor_id).cloned() else {
            return;
        };

        let entry = match actor.status {
            LifeStatus::Unconscious if !actor.is_monster() => self.death_save_turn(&actor),
            LifeStatus::Stable => self.log_entry(
                &actor,
                "rests",
                format!("{} lies stable but unconscious.", actor.name),
            ),
            _ if !actor.can_act() => {
                let conditions: Vec<String> = actor
                    .conditions
                    .iter()
                    .filter(|a| a.condition.is_incapacitating())
                    .map(|a| a.condition.name().to_lowercase())
                    .collect();
                self.log_entry(
                    &actor,
                    "loses the turn",
                    format!("{} is {} and cannot act.", actor.name, conditions.join(" and ")),
                )
            }
            _ => self.action_turn(&actor).await,
        };

        tracing::info!(
            round = entry.round,
            actor = %entry.actor_name,
            action = %entry.action_text,
            narrative = %entry.narrative,
            "turn resolved"
        );
        self.state.turn_log.push(entry);
    }

    fn death_save_turn(&mut self, actor: &Combatant) -> TurnLogEntry {
        let save = self.engine.death_save(actor, &*self.dice);
        let narrative = match self.state.get_mut(actor.id) {
            Some(combatant) => rules::apply_death_save(combatant, save.result),
            None => String::new(),
        };
        let mut entry = self.log_entry(actor, "death saving throw", narrative);
        entry.dice_rolls.push(save.roll);
        entry
    }

    async fn action_turn(&mut self, actor: &Combatant) -> TurnLogEntry {
        let intent = self.decide(actor).await;
        let kind = ActionKind::classify(&intent.action);

        if let Err(reason) = self.spend(actor.id, kind, &intent) {
            tracing::debug!(actor = %actor.name, action = %intent.action, "{reason}");
            return self.log_entry(actor, &intent.action, reason);
        }

        let Some(actor) = self.state.get(actor.id).cloned() else {
            return self.log_entry(actor, &intent.action, String::new());
        };
        let result = self.engine.resolve(&intent, &actor, &self.state, &*self.dice);
        let notes = rules::apply_result(&mut self.state, &self.engine, actor.id, &result, &*self.dice);

        let mut narrative = result.narrative.clone();
        for note in notes {
            narrative.push(' ');
            narrative.push_str(&note);
        }
        let mut entry = self.log_entry(&actor, &intent.action, narrative);
        entry.dice_rolls = result.dice_rolls;
        entry
    }

    /// Ask the oracle and decode its answer, degrading to the neutral intent.
    async fn decide(&self, actor: &Combatant) -> ActionIntent {
        let situation = Situation::new(&self.state, actor);
        let raw = match self.timed.run(self.oracle.decide(&situation)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(actor = %actor.name, error = %e, "oracle failed, using neutral intent");
                return ActionIntent::neutral();
            }
        };
        match decoder::try_decode_intent(&raw) {
            Ok(intent) => intent,
            Err(e) => {
                self.diagnostics.record_decode_fallback();
                tracing::warn!(actor = %actor.name, error = %e, "undecodable decision, using neutral intent");
                ActionIntent::neutral()
            }
        }
    }

    /// Charge the turn's resource for `kind`.
    ///
    /// Movement is clamped to what is left; everything else costs the
    /// action.
    fn spend(&mut self, id: CombatantId, kind: ActionKind, intent: &ActionIntent) -> Result<(), String> {
        let Some(combatant) = self.state.get_mut(id) else {
            return Err("The actor is no longer in the encounter.".to_string());
        };
        match kind {
            ActionKind::Movement => {
                let feet = intent
                    .distance_feet
                    .unwrap_or(0)
                    .min(combatant.economy.movement_remaining());
                if feet > 0 && !economy::consume(combatant, ResourceKind::Movement, feet) {
                    return Err(format!("{} cannot move any further this turn.", combatant.name));
                }
                Ok(())
            }
            _ => {
                if economy::consume(combatant, ResourceKind::Action, 1) {
                    Ok(())
                } else {
                    Err(format!("{} has no action left this turn.", combatant.name))
                }
            }
        }
    }

    fn log_entry(&self, actor: &Combatant, action: &str, narrative: String) -> TurnLogEntry {
        TurnLogEntry {
            round: self.state.round,
            actor_name: actor.name.clone(),
            action_text: action.to_string(),
            dice_rolls: Vec::new(),
            narrative,
        }
    }

    fn publish(&self, phase: Phase, error: Option<&str>) {
        observer::publish(&*self.observer, &self.state, phase, error);
    }

    fn stop_requested(&self) -> bool {
        let flags = lock(&self.shared.flags);
        flags.stop_requested || flags.generation != self.generation
    }

    fn mode(&self) -> Mode {
        lock(&self.shared.flags).mode
    }

    /// Step mode: hold until resumed, stopped, or superseded.
    async fn pause(&self) {
        {
            let mut flags = lock(&self.shared.flags);
            if flags.stop_requested || flags.generation != self.generation {
                return;
            }
            flags.paused = true;
        }
        self.publish(Phase::Paused, None);

        loop {
            // Registered before the flags are read so a resume in between
            // is not lost.
            let resumed = self.shared.resume.notified();
            {
                let flags = lock(&self.shared.flags);
                let superseded = flags.generation != self.generation;
                if !flags.paused || flags.stop_requested || superseded {
                    return;
                }
            }
            resumed.await;
        }
    }

    fn finish(&self, outcome: CombatOutcome) {
        let narrative = match outcome {
            CombatOutcome::PlayersWin => "The party stands victorious.".to_string(),
            CombatOutcome::MonstersWin => "The monsters overwhelm the party.".to_string(),
            CombatOutcome::Mutual => "No one is left standing on either side.".to_string(),
            CombatOutcome::RoundLimit => format!(
                "The fight drags on past {} rounds and is called off (anomaly: round ceiling reached).",
                self.config.max_rounds
            ),
            CombatOutcome::Stopped => "Combat was stopped before either side prevailed.".to_string(),
        };
        let mut summary = self.state.summary(outcome, narrative);
        if outcome == CombatOutcome::RoundLimit {
            summary.rounds_elapsed = self.config.max_rounds;
        }
        tracing::info!(?outcome, rounds = summary.rounds_elapsed, turns = summary.turn_log.len(), "encounter finished");

        {
            let flags = lock(&self.shared.flags);
            if flags.generation != self.generation {
                return;
            }
            *lock(&self.shared.summary) = Some(summary.clone());
        }
        if outcome != CombatOutcome::Stopped {
            observer::publish_summary(&*self.observer, &summary);
            self.publish(Phase::CombatEnded, None);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
