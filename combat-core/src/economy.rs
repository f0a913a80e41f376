//! Action economy ledger.
//!
//! Tracks the per-turn resources each combatant may spend: action, bonus
//! action, reaction, movement, one free object interaction, and (monsters
//! only) legendary actions.
//!
//! Reactions refresh once per round for everyone; everything else refreshes
//! at the start of the owner's own turn.

use crate::combatant::{Combatant, MAX_LEGENDARY_ACTIONS};
use serde::{Deserialize, Serialize};

/// A spendable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Action,
    BonusAction,
    Reaction,
    /// Measured in feet.
    Movement,
    FreeInteraction,
    Legendary,
}

/// Per-combatant ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEconomy {
    pub action: bool,
    pub bonus_action: bool,
    pub reaction: bool,
    pub movement_budget: u32,
    pub movement_used: u32,
    pub free_interactions: u32,
    pub legendary_budget: u32,
    pub legendary_used: u32,
}

impl Default for ActionEconomy {
    fn default() -> Self {
        Self {
            action: true,
            bonus_action: true,
            reaction: true,
            movement_budget: 0,
            movement_used: 0,
            free_interactions: 1,
            legendary_budget: 0,
            legendary_used: 0,
        }
    }
}

impl ActionEconomy {
    /// Legendary budget, re-clamped on every read.
    pub fn legendary_budget(&self) -> u32 {
        self.legendary_budget.min(MAX_LEGENDARY_ACTIONS)
    }

    pub fn movement_remaining(&self) -> u32 {
        self.movement_budget.saturating_sub(self.movement_used)
    }

    pub fn legendary_remaining(&self) -> u32 {
        self.legendary_budget().saturating_sub(self.legendary_used)
    }

    fn try_spend(&mut self, kind: ResourceKind, amount: u32) -> bool {
        match kind {
            ResourceKind::Action => take_flag(&mut self.action),
            ResourceKind::BonusAction => take_flag(&mut self.bonus_action),
            ResourceKind::Reaction => take_flag(&mut self.reaction),
            ResourceKind::Movement => {
                match self.movement_used.checked_add(amount) {
                    Some(total) if total <= self.movement_budget => {
                        self.movement_used = total;
                        true
                    }
                    _ => false,
                }
            }
            ResourceKind::FreeInteraction => {
                if self.free_interactions >= amount.max(1) {
                    self.free_interactions -= amount.max(1);
                    true
                } else {
                    false
                }
            }
            ResourceKind::Legendary => {
                let budget = self.legendary_budget();
                match self.legendary_used.checked_add(amount) {
                    Some(total) if total <= budget => {
                        self.legendary_used = total;
                        true
                    }
                    _ => false,
                }
            }
        }
    }
}

fn take_flag(flag: &mut bool) -> bool {
    std::mem::replace(flag, false)
}

/// What a combatant can still do this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub action: bool,
    pub bonus_action: bool,
    pub reaction: bool,
    pub movement_remaining: u32,
    pub free_interactions: u32,
    pub legendary_remaining: u32,
}

/// Refresh everything for the start of `combatant`'s turn.
pub fn reset(combatant: &mut Combatant) {
    let legendary_budget = if combatant.is_monster() {
        combatant.legendary_actions.min(MAX_LEGENDARY_ACTIONS)
    } else {
        0
    };
    combatant.economy = ActionEconomy {
        action: true,
        bonus_action: true,
        reaction: true,
        movement_budget: combatant.speed,
        movement_used: 0,
        free_interactions: 1,
        legendary_budget,
        legendary_used: 0,
    };
}

/// Start-of-turn refresh. Like [`reset`], except a reaction spent earlier
/// in the round stays spent until [`reset_reactions`].
pub fn refresh_turn(combatant: &mut Combatant) {
    let reaction = combatant.economy.reaction;
    reset(combatant);
    combatant.economy.reaction = reaction;
}

/// Spend `amount` of `kind`. All-or-nothing: a failed spend changes nothing.
///
/// `amount` only matters for movement (feet), legendary actions (cost) and
/// free interactions; the action flags are single-use.
pub fn consume(combatant: &mut Combatant, kind: ResourceKind, amount: u32) -> bool {
    let gated = match kind {
        ResourceKind::Action | ResourceKind::BonusAction | ResourceKind::Movement => {
            !combatant.can_act()
        }
        ResourceKind::Reaction | ResourceKind::Legendary => !combatant.can_react(),
        ResourceKind::FreeInteraction => !combatant.can_act(),
    };
    if gated {
        return false;
    }
    combatant.economy.try_spend(kind, amount)
}

/// Round-start refresh of every combatant's reaction.
pub fn reset_reactions<'a>(combatants: impl IntoIterator<Item = &'a mut Combatant>) {
    for combatant in combatants {
        combatant.economy.reaction = true;
    }
}

/// Zero legendary usage at the owner's turn start; nothing else moves.
pub fn reset_legendary(combatant: &mut Combatant) {
    combatant.economy.legendary_used = 0;
}

/// Remaining resources, with incapacitation applied on top of the ledger.
pub fn availability(combatant: &Combatant) -> Availability {
    let economy = &combatant.economy;
    let can_act = combatant.can_act();
    let can_react = combatant.can_react();
    Availability {
        action: can_act && economy.action,
        bonus_action: can_act && economy.bonus_action,
        reaction: can_react && economy.reaction,
        movement_remaining: if can_act {
            economy.movement_remaining()
        } else {
            0
        },
        free_interactions: economy.free_interactions,
        legendary_remaining: economy.legendary_remaining(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{ActiveCondition, Condition, Faction};
    use serde_json::json;

    fn fighter() -> Combatant {
        Combatant::new("Fighter", Faction::PlayerSide, 20, 16).with_speed(30)
    }

    #[test]
    fn test_reset_makes_everything_available() {
        let mut c = fighter();
        c.economy.action = false;
        c.economy.movement_used = 25;
        reset(&mut c);
        let avail = availability(&c);
        assert!(avail.action);
        assert!(avail.bonus_action);
        assert!(avail.reaction);
        assert_eq!(avail.movement_remaining, 30);
        assert_eq!(avail.free_interactions, 1);
    }

    #[test]
    fn test_movement_no_partial_effect() {
        let mut c = fighter();
        reset(&mut c);
        assert!(consume(&mut c, ResourceKind::Movement, 20));
        assert!(!consume(&mut c, ResourceKind::Movement, 15));
        assert_eq!(c.economy.movement_used, 20);
        assert!(consume(&mut c, ResourceKind::Movement, 10));
        assert_eq!(c.economy.movement_used, 30);
        assert!(!consume(&mut c, ResourceKind::Movement, 1));
    }

    #[test]
    fn test_action_is_single_use() {
        let mut c = fighter();
        reset(&mut c);
        assert!(consume(&mut c, ResourceKind::Action, 1));
        assert!(!consume(&mut c, ResourceKind::Action, 1));
        assert!(consume(&mut c, ResourceKind::BonusAction, 1));
        assert!(consume(&mut c, ResourceKind::FreeInteraction, 1));
        assert!(!consume(&mut c, ResourceKind::FreeInteraction, 1));
    }

    #[test]
    fn test_reaction_survives_turn_reset_of_others() {
        let mut a = fighter();
        let mut b = fighter();
        reset(&mut a);
        reset(&mut b);
        assert!(consume(&mut a, ResourceKind::Reaction, 1));

        // Another combatant's turn starting leaves a's reaction spent.
        reset(&mut b);
        reset_legendary(&mut a);
        assert!(!availability(&a).reaction);

        reset_reactions([&mut a, &mut b]);
        assert!(availability(&a).reaction);
    }

    #[test]
    fn test_own_turn_start_keeps_spent_reaction() {
        let mut c = fighter();
        reset(&mut c);
        assert!(consume(&mut c, ResourceKind::Reaction, 1));
        assert!(consume(&mut c, ResourceKind::Action, 1));
        assert!(consume(&mut c, ResourceKind::Movement, 30));

        refresh_turn(&mut c);
        let avail = availability(&c);
        assert!(!avail.reaction);
        assert!(avail.action);
        assert_eq!(avail.movement_remaining, 30);

        reset_reactions([&mut c]);
        assert!(availability(&c).reaction);
    }

    #[test]
    fn test_legendary_budget() {
        let mut dragon = Combatant::new("Dragon", Faction::MonsterSide, 100, 18)
            .with_legendary_actions(&json!(["Detect", "Tail", "Wing"]));
        reset(&mut dragon);
        assert_eq!(availability(&dragon).legendary_remaining, 3);
        assert!(consume(&mut dragon, ResourceKind::Legendary, 2));
        assert!(!consume(&mut dragon, ResourceKind::Legendary, 2));
        assert_eq!(dragon.economy.legendary_used, 2);
        reset_legendary(&mut dragon);
        assert_eq!(availability(&dragon).legendary_remaining, 3);
    }

    #[test]
    fn test_legendary_clamped_on_read() {
        let mut dragon = Combatant::new("Dragon", Faction::MonsterSide, 100, 18);
        dragon.economy.legendary_budget = 500;
        assert_eq!(dragon.economy.legendary_budget(), MAX_LEGENDARY_ACTIONS);
        dragon.economy.legendary_used = 600;
        assert_eq!(dragon.economy.legendary_remaining(), 0);
    }

    #[test]
    fn test_players_get_no_legendary_budget() {
        let mut c = fighter().with_legendary_actions(&json!(3));
        reset(&mut c);
        assert_eq!(c.economy.legendary_budget, 0);
    }

    #[test]
    fn test_incapacitated_reads_unavailable() {
        let mut c = fighter();
        reset(&mut c);
        c.add_condition(ActiveCondition::new(Condition::Paralyzed, "Hold Person"));
        let avail = availability(&c);
        assert!(!avail.action);
        assert!(!avail.bonus_action);
        assert!(!avail.reaction);
        assert!(c.economy.action);
        assert!(!consume(&mut c, ResourceKind::Action, 1));
        assert!(c.economy.action);
    }
}
