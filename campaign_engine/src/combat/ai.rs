//! Turn selection for combatants the player does not control.

use tracing::debug;

use campaign_rules::Combatant;

use super::{CombatAction, TurnReport};
use crate::error::{EngineError, EngineResult};
use crate::state::GameState;

/// Upper bound on turns driven by one [`GameState::run_ai_turns`] call.
const MAX_AUTOMATED_TURNS: usize = 1_000;

impl GameState {
    /// True when an encounter is waiting on a player decision.
    pub fn is_player_turn(&self) -> bool {
        self.active_encounter
            .as_ref()
            .and_then(|encounter| encounter.active())
            .is_some_and(|p| p.combatant.is_player() && self.pc.is_conscious())
    }

    /// What the active combatant would do on its own: attack the weakest
    /// opponent still standing, ties broken by id. Passes when nobody is in reach.
    pub fn choose_ai_action(&self) -> EngineResult<CombatAction> {
        let encounter = self
            .active_encounter
            .as_ref()
            .ok_or_else(|| EngineError::invalid_action("no encounter in progress"))?;
        let actor = encounter
            .active()
            .ok_or_else(|| EngineError::invalid_action("nobody is acting"))?;
        if !self.combatant(&actor.combatant).is_some_and(|c| c.is_conscious()) {
            return Ok(CombatAction::Pass);
        }

        let target = encounter
            .side(actor.side.opposing())
            .filter(|p| !p.fled)
            .filter_map(|p| {
                let hp = self
                    .combatant(&p.combatant)
                    .filter(|c| c.is_alive())?
                    .current_hit_points();
                Some((hp, &p.combatant))
            })
            .min_by(|(hp_a, a), (hp_b, b)| hp_a.cmp(hp_b).then_with(|| a.id.cmp(&b.id)))
            .map(|(_, combatant)| combatant.clone());

        Ok(match target {
            Some(target) => CombatAction::attack(target),
            None => CombatAction::Pass,
        })
    }

    /// Play every turn that does not need the player, stopping when it is the
    /// player's move or the encounter resolves. An incapacitated player passes.
    pub fn run_ai_turns(&mut self) -> EngineResult<Vec<TurnReport>> {
        let mut reports = Vec::new();
        for _ in 0..MAX_AUTOMATED_TURNS {
            let Some(actor) = self
                .active_encounter
                .as_ref()
                .and_then(|encounter| encounter.active())
                .map(|p| p.combatant.clone())
            else {
                break;
            };
            let action = if actor.is_player() {
                if self.pc.is_conscious() {
                    break;
                }
                CombatAction::Pass
            } else {
                self.choose_ai_action()?
            };
            debug!(%actor, ?action, "automated turn");
            let report = self.submit_action(action)?;
            let resolved = report.resolution.is_some();
            reports.push(report);
            if resolved {
                break;
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::{CombatantRef, EncounterSetup, Side};
    use crate::content::seed;
    use campaign_rules::{EncounterTableId, LocationId};

    fn in_fight() -> GameState {
        let mut state = seed::starter_state(7).unwrap();
        state.pc = state.pc.clone().with_level(20);
        state
            .begin_encounter(
                EncounterSetup::new(EncounterTableId::new("spore-wolf-pack").unwrap())
                    .at(LocationId::new("whisperwood").unwrap()),
            )
            .unwrap();
        state
    }

    #[test]
    fn test_run_ai_turns_stops_at_player() {
        let mut state = in_fight();
        state.run_ai_turns().unwrap();

        assert!(state.is_player_turn());
        let actor = state.active_encounter().unwrap().active().unwrap();
        assert!(actor.combatant.is_player());
    }

    #[test]
    fn test_ai_targets_weakest_opponent() {
        let mut state = in_fight();
        state.run_ai_turns().unwrap();

        // The player's only opponents are wolves; hurt one so it is the weakest.
        state.creature_instances.get_mut("spore-wolf-2").unwrap().apply_damage(5);
        let encounter = state.active_encounter().unwrap().clone();
        let wolves: Vec<&CombatantRef> = encounter.side(Side::Hostile).map(|p| &p.combatant).collect();
        assert_eq!(wolves.len(), 2);

        let action = state.choose_ai_action().unwrap();
        assert_eq!(
            action,
            CombatAction::attack(CombatantRef::creature(
                &campaign_rules::CreatureId::new("spore-wolf-2").unwrap()
            ))
        );
    }

    #[test]
    fn test_choose_without_encounter() {
        let state = seed::starter_state(7).unwrap();
        assert!(state.choose_ai_action().is_err());
        assert!(!state.is_player_turn());
    }
}
