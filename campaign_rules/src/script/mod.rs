//! The condition and effect vocabulary shared by quests, dialogue, travel, and combat.
//!
//! Authored content compiles down to these closed variants. Evaluation and
//! application live in the engine; this module only defines the shapes and
//! how they compare.

mod dialogue;

pub use dialogue::*;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::entities::{
    Ability, EncounterTableId, FactionId, ItemId, LocationId, NpcId, QuestId, Skill,
    StatusEffectId,
};
use crate::world::QuestStatus;

/// Value stored in a world flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FlagValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            FlagValue::Int(v) => Some(*v as f64),
            FlagValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Ordering between numbers, or between strings. Mixed kinds do not compare.
    pub fn partial_compare(&self, other: &FlagValue) -> Option<Ordering> {
        match (self, other) {
            (FlagValue::Int(a), FlagValue::Int(b)) => Some(a.cmp(b)),
            (FlagValue::Text(a), FlagValue::Text(b)) => Some(a.cmp(b)),
            (FlagValue::Bool(a), FlagValue::Bool(b)) => Some(a.cmp(b)),
            _ => self.as_number()?.partial_cmp(&other.as_number()?),
        }
    }

    /// NaN and infinities have no JSON form, so they cannot be saved.
    pub fn is_storable(&self) -> bool {
        match self {
            FlagValue::Float(v) => v.is_finite(),
            _ => true,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::Int(v) => *v != 0,
            FlagValue::Float(v) => *v != 0.0,
            FlagValue::Text(s) => !s.is_empty(),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Int(value)
    }
}

impl From<f64> for FlagValue {
    fn from(value: f64) -> Self {
        FlagValue::Float(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Text(value.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::Text(value)
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(v) => write!(f, "{v}"),
            FlagValue::Int(v) => write!(f, "{v}"),
            FlagValue::Float(v) => write!(f, "{v}"),
            FlagValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Comparison operator used by conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Comparator {
    #[default]
    #[serde(rename = "==", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "ne")]
    Ne,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "ge")]
    Ge,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "le")]
    Le,
}

impl Comparator {
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparator::Eq => ordering == Ordering::Equal,
            Comparator::Ne => ordering != Ordering::Equal,
            Comparator::Gt => ordering == Ordering::Greater,
            Comparator::Ge => ordering != Ordering::Less,
            Comparator::Lt => ordering == Ordering::Less,
            Comparator::Le => ordering != Ordering::Greater,
        }
    }

    pub fn compare<T: Ord>(&self, lhs: T, rhs: T) -> bool {
        self.holds(lhs.cmp(&rhs))
    }

    /// Flag comparison. Values of different kinds are only ever "not equal".
    pub fn compare_flags(&self, lhs: &FlagValue, rhs: &FlagValue) -> bool {
        match lhs.partial_compare(rhs) {
            Some(ordering) => self.holds(ordering),
            None => *self == Comparator::Ne,
        }
    }
}

fn ge() -> Comparator {
    Comparator::Ge
}

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

/// A predicate over world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Missing flags read as `0` when compared with a number and as `false` otherwise.
    Flag {
        key: String,
        #[serde(default)]
        cmp: Comparator,
        value: FlagValue,
    },
    Reputation {
        faction_id: FactionId,
        #[serde(default = "ge")]
        cmp: Comparator,
        value: i32,
    },
    /// Disposition of an NPC toward the player.
    Relationship {
        npc_id: NpcId,
        #[serde(default = "ge")]
        cmp: Comparator,
        value: i32,
    },
    /// Stage index of a quest.
    QuestStage {
        quest_id: QuestId,
        #[serde(default)]
        cmp: Comparator,
        stage: u32,
    },
    QuestStatus {
        quest_id: QuestId,
        status: QuestStatus,
    },
    /// Effective ability score of the player.
    Ability {
        ability: Ability,
        at_least: i32,
    },
    /// Skill modifier of the player.
    Skill {
        skill: Skill,
        at_least: i32,
    },
    Level {
        at_least: u32,
    },
    HasItem {
        item_id: ItemId,
        #[serde(default = "one")]
        quantity: u32,
    },
    Visited {
        location_id: LocationId,
    },
    AtLocation {
        location_id: LocationId,
    },
    All {
        conditions: Vec<Condition>,
    },
    Any {
        conditions: Vec<Condition>,
    },
    Not {
        condition: Box<Condition>,
    },
}

impl Condition {
    pub fn flag_is(key: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        Condition::Flag {
            key: key.into(),
            cmp: Comparator::Eq,
            value: value.into(),
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::All { conditions }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Any { conditions }
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Not {
            condition: Box::new(condition),
        }
    }

    /// Visit every id this condition refers to.
    pub fn visit_refs<'a>(&'a self, visit: &mut dyn FnMut(ContentRef<'a>)) {
        match self {
            Condition::Flag { .. } | Condition::Ability { .. } | Condition::Skill { .. } => {}
            Condition::Level { .. } => {}
            Condition::Reputation { faction_id, .. } => visit(ContentRef::Faction(faction_id)),
            Condition::Relationship { npc_id, .. } => visit(ContentRef::Npc(npc_id)),
            Condition::QuestStage { quest_id, .. } | Condition::QuestStatus { quest_id, .. } => {
                visit(ContentRef::Quest(quest_id))
            }
            Condition::HasItem { item_id, .. } => visit(ContentRef::Item(item_id)),
            Condition::Visited { location_id } | Condition::AtLocation { location_id } => {
                visit(ContentRef::Location(location_id))
            }
            Condition::All { conditions } | Condition::Any { conditions } => {
                for condition in conditions {
                    condition.visit_refs(visit);
                }
            }
            Condition::Not { condition } => condition.visit_refs(visit),
        }
    }

    /// Visit every flag comparison as `(key, value)`.
    pub fn visit_flags<'a>(&'a self, visit: &mut dyn FnMut(&'a str, &'a FlagValue)) {
        match self {
            Condition::Flag { key, value, .. } => visit(key, value),
            Condition::All { conditions } | Condition::Any { conditions } => {
                for condition in conditions {
                    condition.visit_flags(visit);
                }
            }
            Condition::Not { condition } => condition.visit_flags(visit),
            _ => {}
        }
    }
}

/// Who a targeted effect lands on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRef {
    #[default]
    Player,
    Npc(NpcId),
}

/// A mutation of world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    SetFlag {
        key: String,
        value: FlagValue,
    },
    AdjustReputation {
        faction_id: FactionId,
        delta: i32,
    },
    AdjustRelationship {
        npc_id: NpcId,
        delta: i32,
    },
    StartQuest {
        quest_id: QuestId,
    },
    /// Resolve the current stage along its success or failure branch.
    AdvanceQuestStage {
        quest_id: QuestId,
        #[serde(default = "yes")]
        success: bool,
    },
    GrantItem {
        item_id: ItemId,
        #[serde(default = "one")]
        quantity: u32,
    },
    RemoveItem {
        item_id: ItemId,
        #[serde(default = "one")]
        quantity: u32,
    },
    GrantXp {
        amount: u32,
    },
    AdvanceClock {
        minutes: u32,
    },
    /// Start combat from an encounter table entry.
    StartEncounter {
        /// Defaults to the current location.
        #[serde(default)]
        location_id: Option<LocationId>,
        entry_id: EncounterTableId,
        /// Ends the encounter early once it holds.
        #[serde(default)]
        objective: Option<Condition>,
        #[serde(default)]
        on_resolved: Vec<Effect>,
    },
    ApplyStatusEffect {
        #[serde(default)]
        target: TargetRef,
        effect_id: StatusEffectId,
    },
    TriggerDialogueNode {
        npc_id: NpcId,
        node_id: String,
    },
}

impl Effect {
    pub fn set_flag(key: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        Effect::SetFlag {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Visit every id this effect refers to, including nested conditions.
    pub fn visit_refs<'a>(&'a self, visit: &mut dyn FnMut(ContentRef<'a>)) {
        match self {
            Effect::SetFlag { .. } | Effect::GrantXp { .. } | Effect::AdvanceClock { .. } => {}
            Effect::AdjustReputation { faction_id, .. } => visit(ContentRef::Faction(faction_id)),
            Effect::AdjustRelationship { npc_id, .. } => visit(ContentRef::Npc(npc_id)),
            Effect::StartQuest { quest_id } | Effect::AdvanceQuestStage { quest_id, .. } => {
                visit(ContentRef::Quest(quest_id))
            }
            Effect::GrantItem { item_id, .. } | Effect::RemoveItem { item_id, .. } => {
                visit(ContentRef::Item(item_id))
            }
            Effect::StartEncounter {
                location_id,
                entry_id,
                objective,
                on_resolved,
            } => {
                if let Some(location_id) = location_id {
                    visit(ContentRef::Location(location_id));
                }
                visit(ContentRef::EncounterEntry(location_id.as_ref(), entry_id));
                if let Some(objective) = objective {
                    objective.visit_refs(visit);
                }
                for effect in on_resolved {
                    effect.visit_refs(visit);
                }
            }
            Effect::ApplyStatusEffect { target, effect_id } => {
                if let TargetRef::Npc(npc_id) = target {
                    visit(ContentRef::Npc(npc_id));
                }
                visit(ContentRef::StatusEffect(effect_id));
            }
            Effect::TriggerDialogueNode { npc_id, node_id } => {
                visit(ContentRef::DialogueNode(npc_id, node_id))
            }
        }
    }

    /// Visit every flag this effect writes or, through a nested objective, reads.
    pub fn visit_flags<'a>(&'a self, visit: &mut dyn FnMut(&'a str, &'a FlagValue)) {
        match self {
            Effect::SetFlag { key, value } => visit(key, value),
            Effect::StartEncounter {
                objective,
                on_resolved,
                ..
            } => {
                if let Some(objective) = objective {
                    objective.visit_flags(visit);
                }
                for effect in on_resolved {
                    effect.visit_flags(visit);
                }
            }
            _ => {}
        }
    }
}

/// A reference from scripted content to some other record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRef<'a> {
    Faction(&'a FactionId),
    Npc(&'a NpcId),
    Quest(&'a QuestId),
    Item(&'a ItemId),
    Location(&'a LocationId),
    StatusEffect(&'a StatusEffectId),
    /// Entry in a specific location's table, or in any table when no location is named.
    EncounterEntry(Option<&'a LocationId>, &'a EncounterTableId),
    DialogueNode(&'a NpcId, &'a str),
}

/// How an encounter ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterOutcome {
    Victory,
    Defeat,
    Fled,
    ObjectiveMet,
}

impl EncounterOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncounterOutcome::Victory => "victory",
            EncounterOutcome::Defeat => "defeat",
            EncounterOutcome::Fled => "fled",
            EncounterOutcome::ObjectiveMet => "objective_met",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_value_untagged_serde() {
        let values: Vec<FlagValue> = serde_json::from_str(r#"[true, 3, 2.5, "open"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                FlagValue::Bool(true),
                FlagValue::Int(3),
                FlagValue::Float(2.5),
                FlagValue::Text("open".into()),
            ]
        );
    }

    #[test]
    fn test_non_finite_flags_are_not_storable() {
        assert!(FlagValue::Float(0.5).is_storable());
        assert!(FlagValue::Text("nan".into()).is_storable());
        assert!(!FlagValue::Float(f64::NAN).is_storable());
        assert!(!FlagValue::Float(f64::NEG_INFINITY).is_storable());

        let effect = Effect::StartEncounter {
            location_id: None,
            entry_id: "spore-wolf-pack".parse().unwrap(),
            objective: Some(Condition::not(Condition::flag_is("morale", f64::INFINITY))),
            on_resolved: vec![Effect::set_flag("pack-routed", true)],
        };
        let mut seen = Vec::new();
        effect.visit_flags(&mut |key, value| seen.push((key, value.is_storable())));
        assert_eq!(seen, vec![("morale", false), ("pack-routed", true)]);
    }

    #[test]
    fn test_comparator_on_flags() {
        assert!(Comparator::Ge.compare_flags(&FlagValue::Int(3), &FlagValue::Float(2.5)));
        assert!(Comparator::Eq.compare_flags(&FlagValue::Int(2), &FlagValue::Float(2.0)));
        assert!(!Comparator::Eq.compare_flags(&FlagValue::Bool(true), &FlagValue::Int(1)));
        assert!(Comparator::Ne.compare_flags(&FlagValue::Bool(true), &FlagValue::Int(1)));
        assert!(!Comparator::Gt.compare_flags(&FlagValue::Text("a".into()), &FlagValue::Int(1)));
    }

    #[test]
    fn test_condition_tagged_serde() {
        let json = r#"{
            "kind": "all",
            "conditions": [
                { "kind": "flag", "key": "gate-open", "value": true },
                { "kind": "reputation", "faction_id": "silver-wardens", "value": 10 },
                { "kind": "not", "condition": { "kind": "visited", "location_id": "whisperwood" } }
            ]
        }"#;
        let condition: Condition = serde_json::from_str(json).unwrap();
        match &condition {
            Condition::All { conditions } => {
                assert_eq!(conditions.len(), 3);
                assert!(matches!(
                    conditions[1],
                    Condition::Reputation { cmp: Comparator::Ge, value: 10, .. }
                ));
            }
            other => panic!("unexpected condition {other:?}"),
        }

        let mut refs = Vec::new();
        condition.visit_refs(&mut |r| refs.push(format!("{r:?}")));
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_effect_defaults() {
        let effect: Effect =
            serde_json::from_str(r#"{ "kind": "grant_item", "item_id": "healing-draught" }"#).unwrap();
        assert!(matches!(effect, Effect::GrantItem { quantity: 1, .. }));

        let effect: Effect = serde_json::from_str(
            r#"{ "kind": "apply_status_effect", "effect_id": "blessed" }"#,
        )
        .unwrap();
        assert!(matches!(
            effect,
            Effect::ApplyStatusEffect { target: TargetRef::Player, .. }
        ));
    }
}
