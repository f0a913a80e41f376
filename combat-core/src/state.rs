//! The combat state aggregate.
//!
//! One `CombatState` holds everything a running encounter mutates: the
//! combatants, the round counter, the turn cursor into the derived
//! initiative order, surprise, queued reorder events, and the turn log.

use crate::combatant::{Combatant, CombatantId, Faction};
use crate::dice::DiceRoller;
use crate::economy::{self, ResourceKind};
use crate::initiative::{self, OrderEvent, SurpriseMap};
use crate::rules::DiceRoll;
use serde::{Deserialize, Serialize};

/// One resolved turn, kept for the end-of-combat summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnLogEntry {
    pub round: u32,
    pub actor_name: String,
    pub action_text: String,
    pub dice_rolls: Vec<DiceRoll>,
    pub narrative: String,
}

/// Why an encounter finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatOutcome {
    PlayersWin,
    MonstersWin,
    /// Both sides emptied out together.
    Mutual,
    /// Hit the round ceiling.
    RoundLimit,
    Stopped,
}

/// Delivered once combat is over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatSummary {
    pub outcome: CombatOutcome,
    pub narrative: String,
    pub final_combatants: Vec<Combatant>,
    pub turn_log: Vec<TurnLogEntry>,
    pub rounds_elapsed: u32,
}

/// Full encounter state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatState {
    pub round: u32,
    /// Kept sorted by initiative once the encounter is prepared.
    pub combatants: Vec<Combatant>,
    pub turn_index: usize,
    #[serde(default)]
    pub surprise: SurpriseMap,
    #[serde(default)]
    pub initiative_order: Vec<CombatantId>,
    #[serde(default)]
    pub order_events: Vec<OrderEvent>,
    #[serde(default)]
    pub turn_log: Vec<TurnLogEntry>,
}

impl CombatState {
    pub fn new(combatants: Vec<Combatant>) -> Self {
        Self {
            round: 1,
            combatants,
            turn_index: 0,
            surprise: SurpriseMap::new(),
            initiative_order: Vec::new(),
            order_events: Vec::new(),
            turn_log: Vec::new(),
        }
    }

    pub fn add_combatant(&mut self, combatant: Combatant) {
        self.combatants.push(combatant);
    }

    pub fn get(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: CombatantId) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| c.id == id)
    }

    /// Resolve a target reference from oracle output.
    ///
    /// Tries the id, then an exact name, then a unique partial name match.
    pub fn find_target(&self, reference: &str) -> Option<&Combatant> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if let Some(c) = self.combatants.iter().find(|c| c.id.to_string() == reference) {
            return Some(c);
        }
        if let Some(c) = self
            .combatants
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(reference))
        {
            return Some(c);
        }
        let needle = reference.to_lowercase();
        let mut partial = self.combatants.iter().filter(|c| {
            let name = c.name.to_lowercase();
            name.contains(&needle) || needle.contains(&name)
        });
        match (partial.next(), partial.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    pub fn eligible(&self, faction: Faction) -> impl Iterator<Item = &Combatant> {
        self.combatants
            .iter()
            .filter(move |c| c.faction == faction && c.is_eligible())
    }

    /// `Some` once one side (or both) has no one left standing.
    pub fn outcome(&self) -> Option<CombatOutcome> {
        let players = self.eligible(Faction::PlayerSide).count();
        let monsters = self.eligible(Faction::MonsterSide).count();
        match (players, monsters) {
            (0, 0) => Some(CombatOutcome::Mutual),
            (_, 0) => Some(CombatOutcome::PlayersWin),
            (0, _) => Some(CombatOutcome::MonstersWin),
            _ => None,
        }
    }

    /// Normalize life status, roll missing initiative, apply trait
    /// modifiers, sort, compute surprise, reset every ledger, and derive the
    /// round-1 order.
    pub fn prepare(&mut self, dice: &dyn DiceRoller) {
        for combatant in &mut self.combatants {
            combatant.normalize_status();
        }
        initiative::apply_modifiers(&mut self.combatants);
        initiative::roll_initiative(&mut self.combatants, dice);
        initiative::sort(&mut self.combatants);
        self.surprise = initiative::surprise_map(&self.combatants);
        for combatant in &mut self.combatants {
            economy::reset(combatant);
        }
        self.round = self.round.max(1);
        self.turn_index = 0;
        self.derive_order();
    }

    /// Recompute the order from the active set plus queued events.
    pub fn derive_order(&mut self) {
        let base = initiative::active_set(&self.combatants, self.round, &self.surprise);
        let combatants = &self.combatants;
        self.initiative_order = initiative::apply_order_events(&base, &self.order_events, |id| {
            combatants
                .iter()
                .find(|c| c.id == id)
                .map(initiative::effective_initiative)
                .unwrap_or(0)
        });
    }

    /// Queue a reorder event for the rest of this round.
    ///
    /// Only the part of the order after the cursor moves. A combatant who
    /// has not acted yet is moved. A combatant readying on its own turn has
    /// already spent that turn, so it gains a trigger slot later in the
    /// round (see [`CombatState::is_trigger_slot`]) instead of a second
    /// turn. Each combatant gets at most one reorder per round; combatants
    /// who already acted are left alone.
    pub fn queue_order_event(&mut self, event: OrderEvent) {
        let id = event.combatant();
        if self.order_events.iter().any(|e| e.combatant() == id) {
            tracing::debug!(combatant = %id, "combatant already reordered this round, ignored");
            return;
        }
        let split = (self.turn_index + 1).min(self.initiative_order.len());
        let (acted, upcoming) = self.initiative_order.split_at(split);
        let is_current = self.current_actor() == Some(id);
        if !is_current && !upcoming.contains(&id) {
            tracing::debug!(combatant = %id, "order event for a combatant who already acted, ignored");
            return;
        }

        let combatants = &self.combatants;
        let initiative_of = |cid: CombatantId| {
            combatants
                .iter()
                .find(|c| c.id == cid)
                .map(initiative::effective_initiative)
                .unwrap_or(0)
        };
        let upcoming = if is_current {
            let mut upcoming = upcoming.to_vec();
            let slot = initiative::insertion_slot(&upcoming, &event, initiative_of);
            upcoming.insert(slot, id);
            upcoming
        } else {
            initiative::apply_order_events(upcoming, std::slice::from_ref(&event), initiative_of)
        };

        let mut order = acted.to_vec();
        order.extend(upcoming);
        self.initiative_order = order;
        self.order_events.push(event);
    }

    pub fn current_actor(&self) -> Option<CombatantId> {
        self.initiative_order.get(self.turn_index).copied()
    }

    /// Whether the cursor sits on a readied trigger slot: the combatant
    /// there already took its turn earlier this round.
    pub fn is_trigger_slot(&self) -> bool {
        match self.current_actor() {
            Some(id) => self.initiative_order[..self.turn_index].contains(&id),
            None => false,
        }
    }

    /// Fire the readied action of `id` at its trigger slot.
    ///
    /// This is not a turn: nothing is refreshed and no new log entry is
    /// written. The reaction pays for it, and the note goes onto the
    /// combatant's entry for this round. Returns whether it fired.
    pub fn release_readied(&mut self, id: CombatantId) -> bool {
        let round = self.round;
        let Some(combatant) = self.get_mut(id) else {
            return false;
        };
        let name = combatant.name.clone();
        let fired = economy::consume(combatant, ResourceKind::Reaction, 1);
        let note = if fired {
            format!("{name} acts on the readied trigger.")
        } else {
            format!("{name} cannot react, and the readied action is lost.")
        };
        tracing::debug!(combatant = %name, fired, "readied trigger reached");
        if let Some(entry) = self
            .turn_log
            .iter_mut()
            .rev()
            .find(|e| e.round == round && e.actor_name == name)
        {
            entry.narrative.push(' ');
            entry.narrative.push_str(&note);
        }
        fired
    }

    /// Start-of-turn refresh for `id`. The reaction is left as it is.
    pub fn begin_turn(&mut self, id: CombatantId) {
        if let Some(combatant) = self.get_mut(id) {
            economy::refresh_turn(combatant);
            economy::reset_legendary(combatant);
            combatant.dodging = false;
        }
    }

    /// Move the cursor on. Returns true when the move wrapped into a new
    /// round (end-of-round bookkeeping has run).
    pub fn advance(&mut self) -> bool {
        self.turn_index += 1;
        if self.turn_index < self.initiative_order.len() {
            return false;
        }
        self.end_round();
        true
    }

    /// Reaction reset, condition decrement, event clear, next round's order.
    pub fn end_round(&mut self) {
        for combatant in &mut self.combatants {
            let expired = combatant.tick_conditions();
            for condition in expired {
                tracing::debug!(combatant = %combatant.name, %condition, "condition expired");
            }
        }
        economy::reset_reactions(self.combatants.iter_mut());
        self.order_events.clear();
        self.round += 1;
        self.turn_index = 0;
        self.derive_order();
    }

    pub fn summary(&self, outcome: CombatOutcome, narrative: impl Into<String>) -> CombatSummary {
        CombatSummary {
            outcome,
            narrative: narrative.into(),
            final_combatants: self.combatants.clone(),
            turn_log: self.turn_log.clone(),
            rounds_elapsed: self.round,
        }
    }
}
