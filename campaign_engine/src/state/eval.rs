//! Condition evaluation against the live world.

use campaign_rules::{Condition, FlagValue};

use super::GameState;
use crate::error::{EngineError, EngineResult};

impl GameState {
    /// Evaluate a predicate. Pure: nothing in the state changes.
    ///
    /// `All` and `Any` short-circuit left to right, so an unknown reference
    /// behind an already-decided branch is never looked at.
    pub fn evaluate(&self, condition: &Condition) -> EngineResult<bool> {
        match condition {
            Condition::Flag { key, cmp, value } => {
                let unset = match value {
                    FlagValue::Int(_) | FlagValue::Float(_) => FlagValue::Int(0),
                    _ => FlagValue::Bool(false),
                };
                let current = self.flags.get(key).unwrap_or(&unset);
                Ok(cmp.compare_flags(current, value))
            }
            Condition::Reputation {
                faction_id,
                cmp,
                value,
            } => {
                if !self.factions.contains_key(faction_id) {
                    return Err(EngineError::unknown("faction", faction_id));
                }
                Ok(cmp.compare(self.reputation(faction_id.as_str()), *value))
            }
            Condition::Relationship { npc_id, cmp, value } => {
                let npc = self
                    .npcs
                    .get(npc_id)
                    .ok_or_else(|| EngineError::unknown("npc", npc_id))?;
                Ok(cmp.compare(npc.disposition, *value))
            }
            Condition::QuestStage {
                quest_id,
                cmp,
                stage,
            } => {
                let quest = self
                    .quests
                    .get(quest_id)
                    .ok_or_else(|| EngineError::unknown("quest", quest_id))?;
                Ok(cmp.compare(quest.stage, *stage))
            }
            Condition::QuestStatus { quest_id, status } => {
                let quest = self
                    .quests
                    .get(quest_id)
                    .ok_or_else(|| EngineError::unknown("quest", quest_id))?;
                Ok(quest.status == *status)
            }
            Condition::Ability { ability, at_least } => {
                Ok(self.pc.ability_score(*ability) >= *at_least)
            }
            Condition::Skill { skill, at_least } => Ok(self.pc.skill_modifier(*skill) >= *at_least),
            Condition::Level { at_least } => Ok(self.pc.level() >= *at_least),
            Condition::HasItem { item_id, quantity } => {
                if !self.items.contains_key(item_id) {
                    return Err(EngineError::unknown("item", item_id));
                }
                Ok(self.pc.inventory.quantity_of(item_id.as_str()) >= *quantity)
            }
            Condition::Visited { location_id } => {
                if !self.locations.contains_key(location_id) {
                    return Err(EngineError::unknown("location", location_id));
                }
                Ok(self.visited.contains(location_id))
            }
            Condition::AtLocation { location_id } => {
                if !self.locations.contains_key(location_id) {
                    return Err(EngineError::unknown("location", location_id));
                }
                Ok(&self.current_location == location_id)
            }
            Condition::All { conditions } => {
                for condition in conditions {
                    if !self.evaluate(condition)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any { conditions } => {
                for condition in conditions {
                    if self.evaluate(condition)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not { condition } => Ok(!self.evaluate(condition)?),
        }
    }

    /// True when every condition holds. An empty list holds.
    pub fn evaluate_all(&self, conditions: &[Condition]) -> EngineResult<bool> {
        for condition in conditions {
            if !self.evaluate(condition)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::content::seed;
    use crate::error::EngineError;
    use campaign_rules::{
        Ability, Comparator, Condition, FactionId, FlagValue, ItemId, LocationId, NpcId, QuestId,
        QuestStatus,
    };

    fn unknown_faction() -> Condition {
        Condition::Reputation {
            faction_id: FactionId::new("spore-cult").unwrap(),
            cmp: Comparator::Ge,
            value: 0,
        }
    }

    #[test]
    fn test_missing_flag_reads_false() {
        let state = seed::starter_state(1).unwrap();
        assert!(state.evaluate(&Condition::flag_is("never-set", false)).unwrap());
        assert!(!state.evaluate(&Condition::flag_is("never-set", true)).unwrap());
        assert!(state
            .evaluate(&Condition::Flag {
                key: "artifact-clues".into(),
                cmp: Comparator::Lt,
                value: FlagValue::Int(1),
            })
            .unwrap());
    }

    #[test]
    fn test_missing_flag_reads_zero_against_numbers() {
        let state = seed::starter_state(1).unwrap();
        let never_set = |cmp, value| Condition::Flag {
            key: "omen-count".into(),
            cmp,
            value,
        };
        assert!(state.evaluate(&never_set(Comparator::Eq, FlagValue::Int(0))).unwrap());
        assert!(state.evaluate(&never_set(Comparator::Lt, FlagValue::Int(1))).unwrap());
        assert!(!state.evaluate(&never_set(Comparator::Ne, FlagValue::Int(0))).unwrap());
        assert!(state.evaluate(&never_set(Comparator::Le, FlagValue::Float(0.5))).unwrap());
        assert!(!state
            .evaluate(&never_set(Comparator::Eq, FlagValue::Text("".into())))
            .unwrap());
    }

    #[test]
    fn test_world_lookups() {
        let state = seed::starter_state(1).unwrap();
        let silverthorn = LocationId::new("silverthorn").unwrap();
        let whisperwood = LocationId::new("whisperwood").unwrap();

        assert!(state
            .evaluate(&Condition::AtLocation {
                location_id: silverthorn.clone()
            })
            .unwrap());
        assert!(state
            .evaluate(&Condition::Visited {
                location_id: silverthorn
            })
            .unwrap());
        assert!(!state
            .evaluate(&Condition::Visited {
                location_id: whisperwood
            })
            .unwrap());
        assert!(state
            .evaluate(&Condition::HasItem {
                item_id: ItemId::new("forest-tonic").unwrap(),
                quantity: 2,
            })
            .unwrap());
        assert!(state
            .evaluate(&Condition::Ability {
                ability: Ability::Wisdom,
                at_least: 14,
            })
            .unwrap());
        assert!(state
            .evaluate(&Condition::QuestStatus {
                quest_id: QuestId::new("wolf-cull").unwrap(),
                status: QuestStatus::NotStarted,
            })
            .unwrap());
        assert!(state
            .evaluate(&Condition::Relationship {
                npc_id: NpcId::new("scout-aodhan").unwrap(),
                cmp: Comparator::Ge,
                value: 0,
            })
            .unwrap());
    }

    #[test]
    fn test_unknown_reference_is_an_error() {
        let state = seed::starter_state(1).unwrap();
        let err = state.evaluate(&unknown_faction()).unwrap_err();
        assert!(matches!(err, EngineError::ConditionEvaluation { .. }));
        assert!(err.to_string().contains("spore-cult"));

        let err = state
            .evaluate(&Condition::not(Condition::Visited {
                location_id: LocationId::new("moonfall").unwrap(),
            }))
            .unwrap_err();
        assert!(matches!(err, EngineError::ConditionEvaluation { .. }));
    }

    #[test]
    fn test_short_circuit_skips_unknown_references() {
        let state = seed::starter_state(1).unwrap();

        let all = Condition::all(vec![Condition::flag_is("never-set", true), unknown_faction()]);
        assert_eq!(state.evaluate(&all), Ok(false));

        let any = Condition::any(vec![Condition::flag_is("never-set", false), unknown_faction()]);
        assert_eq!(state.evaluate(&any), Ok(true));

        let all = Condition::all(vec![Condition::flag_is("never-set", false), unknown_faction()]);
        assert!(state.evaluate(&all).is_err());
    }

    #[test]
    fn test_evaluate_all_of_nothing_holds() {
        let state = seed::starter_state(1).unwrap();
        assert_eq!(state.evaluate_all(&[]), Ok(true));
    }
}
