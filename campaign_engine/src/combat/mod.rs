//! Turn-based encounters.
//!
//! An encounter moves through `Forming → RollingInitiative → TurnActive →
//! ResolvingAction → CheckingEnd` and loops back to `TurnActive` until it
//! reaches `Resolved`. Combatants are never copied into the encounter; it
//! holds references and the records stay in [`GameState`](crate::GameState).

mod ai;
mod resolver;

pub use resolver::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use campaign_rules::{
    Condition, CreatureId, Effect, EncounterOutcome, EncounterTableId, EntityType, ItemId,
    LocationId, NpcId, PlayerId, StatusEffectId,
};

/// Unique identifier for an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncounterId(pub Uuid);

impl fmt::Display for EncounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Party,
    Hostile,
}

impl Side {
    pub fn opposing(self) -> Side {
        match self {
            Side::Party => Side::Hostile,
            Side::Hostile => Side::Party,
        }
    }
}

/// Points at the record that fights: the player, an NPC's combat block, or a spawned creature.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CombatantRef {
    pub kind: EntityType,
    pub id: String,
}

impl CombatantRef {
    pub fn player(id: &PlayerId) -> Self {
        Self {
            kind: EntityType::Player,
            id: id.to_string(),
        }
    }

    pub fn npc(id: &NpcId) -> Self {
        Self {
            kind: EntityType::Npc,
            id: id.to_string(),
        }
    }

    pub fn creature(id: &CreatureId) -> Self {
        Self {
            kind: EntityType::Creature,
            id: id.to_string(),
        }
    }

    pub fn is_player(&self) -> bool {
        self.kind == EntityType::Player
    }
}

impl fmt::Display for CombatantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            EntityType::Player => "player",
            EntityType::Npc => "npc",
            EntityType::Creature => "creature",
            _ => "other",
        };
        write!(f, "{kind}:{}", self.id)
    }
}

/// A combatant's seat at the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub combatant: CombatantRef,
    pub side: Side,
    /// Rolled total.
    pub initiative: i32,
    /// Initiative modifier, kept for tie-breaks.
    pub modifier: i32,
    #[serde(default)]
    pub fled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatPhase {
    Forming,
    RollingInitiative,
    TurnActive,
    ResolvingAction,
    CheckingEnd,
    Resolved(EncounterOutcome),
}

/// What happened during a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CombatEvent {
    Initiative {
        roll: u32,
        total: i32,
    },
    Attack {
        target: CombatantRef,
        attack: String,
        roll: u32,
        total: i32,
        target_armor_class: i32,
        hit: bool,
        critical: bool,
        damage: i32,
        target_down: bool,
    },
    StatusApplied {
        target: CombatantRef,
        effect_id: StatusEffectId,
        stacks: u32,
    },
    Consumable {
        item_id: ItemId,
        target: CombatantRef,
    },
    Defend,
    Fled,
    Passed,
    /// Turn-based effects that ran out at the actor's turn boundary.
    StatusExpired {
        effect_ids: Vec<StatusEffectId>,
    },
    Dispelled {
        target: CombatantRef,
        effect_ids: Vec<StatusEffectId>,
    },
    /// The actor was incapacitated and lost the turn.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatLogEntry {
    pub round: u32,
    pub actor: CombatantRef,
    pub event: CombatEvent,
}

/// A live or finished encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterState {
    pub id: EncounterId,
    pub location_id: LocationId,
    pub entry_id: EncounterTableId,
    pub phase: CombatPhase,
    /// In initiative order once rolled.
    pub participants: Vec<Participant>,
    pub active_index: usize,
    pub round: u32,
    #[serde(default)]
    pub objective: Option<Condition>,
    #[serde(default)]
    pub on_resolved: Vec<Effect>,
    #[serde(default)]
    pub log: Vec<CombatLogEntry>,
}

impl EncounterState {
    /// Whose turn it is.
    pub fn active(&self) -> Option<&Participant> {
        self.participants.get(self.active_index)
    }

    pub fn participant(&self, combatant: &CombatantRef) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.combatant == combatant)
    }

    pub fn outcome(&self) -> Option<EncounterOutcome> {
        match self.phase {
            CombatPhase::Resolved(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn side(&self, side: Side) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(move |p| p.side == side)
    }
}

/// A choice for the active combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CombatAction {
    /// `attack` indexes the actor's attacks; the first one when absent.
    Attack {
        target: CombatantRef,
        #[serde(default)]
        attack: Option<usize>,
    },
    /// Targets the actor when no target is given.
    UseConsumable {
        item_id: ItemId,
        #[serde(default)]
        target: Option<CombatantRef>,
    },
    Defend,
    Flee,
    Pass,
}

impl CombatAction {
    pub fn attack(target: CombatantRef) -> Self {
        CombatAction::Attack {
            target,
            attack: None,
        }
    }

    pub fn use_item(item_id: ItemId) -> Self {
        CombatAction::UseConsumable {
            item_id,
            target: None,
        }
    }
}

/// How to start an encounter.
#[derive(Debug, Clone, PartialEq)]
pub struct EncounterSetup {
    /// Defaults to the current location.
    pub location_id: Option<LocationId>,
    pub entry_id: EncounterTableId,
    pub objective: Option<Condition>,
    pub on_resolved: Vec<Effect>,
}

impl EncounterSetup {
    pub fn new(entry_id: EncounterTableId) -> Self {
        Self {
            location_id: None,
            entry_id,
            objective: None,
            on_resolved: Vec::new(),
        }
    }

    pub fn at(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_objective(mut self, objective: Condition) -> Self {
        self.objective = Some(objective);
        self
    }

    pub fn on_resolved(mut self, effect: Effect) -> Self {
        self.on_resolved.push(effect);
        self
    }
}

/// Everything one submitted action caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub actor: CombatantRef,
    pub round: u32,
    pub events: Vec<CombatEvent>,
    /// Set when this turn ended the encounter.
    pub resolution: Option<EncounterSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterSummary {
    pub id: EncounterId,
    pub outcome: EncounterOutcome,
    pub rounds: u32,
    pub xp_awarded: u32,
    /// Hostiles that died.
    pub defeated: Vec<CombatantRef>,
}
