//! Ability catalog hygiene.
//!
//! Catalog entries arrive from outside and can be mis-assigned: a monster's
//! breath weapon copied onto a player, say. Before an encounter starts,
//! unowned entries are stamped with their holder and entries owned by
//! someone else are dropped.

use crate::state::CombatState;

/// Stamp every unowned entry with the id of the combatant holding it.
pub fn tag_owners(state: &mut CombatState) {
    for combatant in &mut state.combatants {
        let id = combatant.id;
        for entry in combatant.catalog.iter_mut().filter(|e| e.owner.is_none()) {
            entry.owner = Some(id);
        }
    }
}

/// Drop entries whose owner is not the combatant holding them.
///
/// Returns how many entries were removed.
pub fn retain_owned(state: &mut CombatState) -> usize {
    let mut removed = 0;
    for combatant in &mut state.combatants {
        let id = combatant.id;
        let name = &combatant.name;
        let before = combatant.catalog.len();
        combatant.catalog.retain(|entry| {
            let owned = entry.owner.map_or(true, |owner| owner == id);
            if !owned {
                tracing::warn!(
                    combatant = %name,
                    entry = %entry.name,
                    "dropping catalog entry owned by another combatant"
                );
            }
            owned
        });
        removed += before - combatant.catalog.len();
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{CatalogEntry, Combatant, CombatantId, Faction};

    #[test]
    fn test_tag_then_retain() {
        let mut stray = CatalogEntry::new("Fire Breath");
        stray.owner = Some(CombatantId::new());
        let mut state = CombatState::new(vec![
            Combatant::new("Fighter", Faction::PlayerSide, 20, 16)
                .with_catalog_entry(CatalogEntry::new("Longsword").with_attack(5, "1d8+3"))
                .with_catalog_entry(stray),
            Combatant::new("Goblin", Faction::MonsterSide, 7, 15)
                .with_catalog_entry(CatalogEntry::new("Scimitar")),
        ]);

        tag_owners(&mut state);
        let fighter_id = state.combatants[0].id;
        assert_eq!(state.combatants[0].catalog[0].owner, Some(fighter_id));
        assert_eq!(state.combatants[1].catalog[0].owner, Some(state.combatants[1].id));

        assert_eq!(retain_owned(&mut state), 1);
        let names: Vec<&str> = state.combatants[0]
            .catalog
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["Longsword"]);
        assert_eq!(retain_owned(&mut state), 0);
    }
}
