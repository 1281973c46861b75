//! Locations, the travel graph edges between them, and their encounter tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{TimeOfDay, TimeWindow};
use crate::entities::{CreatureId, EncounterTableId, FactionId, LocationId, NpcId};
use crate::script::Condition;

/// How dangerous a location is to pass through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerLevel {
    Safe,
    #[default]
    Low,
    Medium,
    High,
}

/// A directed travel edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub to: LocationId,
    /// Minutes added to the world clock by the trip.
    #[serde(default)]
    pub travel_minutes: u32,
    /// Edge is closed unless this holds.
    #[serde(default)]
    pub condition: Option<Condition>,
}

impl Connection {
    pub fn new(to: LocationId, travel_minutes: u32) -> Self {
        Self {
            to,
            travel_minutes,
            condition: None,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Creatures spawned together by an encounter entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnGroup {
    pub creature_id: CreatureId,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

/// One row of a location's encounter table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterEntry {
    pub id: EncounterTableId,
    /// Weighted entries always fire when the table is rolled; see [`EncounterTable`].
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub window: TimeWindow,
    /// Extra gate, usually on flags.
    #[serde(default)]
    pub requires: Option<Condition>,
    #[serde(default)]
    pub spawns: Vec<SpawnGroup>,
    /// NPCs that join the fight on the hostile side.
    #[serde(default)]
    pub hostile_npcs: Vec<NpcId>,
}

impl EncounterEntry {
    pub fn new(id: EncounterTableId) -> Self {
        Self {
            id,
            weight: None,
            window: TimeWindow::Any,
            requires: None,
            spawns: Vec::new(),
            hostile_npcs: Vec::new(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn in_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn spawning(mut self, creature_id: CreatureId, count: u32) -> Self {
        self.spawns.push(SpawnGroup { creature_id, count });
        self
    }

    /// Selection weight; unweighted rows count once.
    pub fn effective_weight(&self) -> u32 {
        self.weight.unwrap_or(1).max(1)
    }
}

/// Helpers over a slice of encounter rows.
pub trait EncounterTable {
    /// Rows open at this time of day, before condition gating.
    fn open_at(&self, time_of_day: TimeOfDay) -> Vec<&EncounterEntry>;

    /// Whether any row carries an explicit weight.
    fn is_weighted(&self) -> bool;
}

impl EncounterTable for [EncounterEntry] {
    fn open_at(&self, time_of_day: TimeOfDay) -> Vec<&EncounterEntry> {
        self.iter().filter(|e| e.window.admits(time_of_day)).collect()
    }

    fn is_weighted(&self) -> bool {
        self.iter().any(|e| e.weight.is_some())
    }
}

/// A place in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub biome: String,
    #[serde(default)]
    pub population: u32,
    #[serde(default)]
    pub controlled_by: Option<FactionId>,
    #[serde(default)]
    pub danger: DangerLevel,
    #[serde(default)]
    pub points_of_interest: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub encounters: Vec<EncounterEntry>,
}

impl Location {
    pub fn new(id: LocationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            biome: String::new(),
            population: 0,
            controlled_by: None,
            danger: DangerLevel::Low,
            points_of_interest: Vec::new(),
            tags: BTreeSet::new(),
            connections: Vec::new(),
            encounters: Vec::new(),
        }
    }

    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn with_encounter(mut self, entry: EncounterEntry) -> Self {
        self.encounters.push(entry);
        self
    }

    /// The edge leading to `to`, if any.
    pub fn connection_to(&self, to: &LocationId) -> Option<&Connection> {
        self.connections.iter().find(|c| &c.to == to)
    }

    pub fn entry(&self, id: &EncounterTableId) -> Option<&EncounterEntry> {
        self.encounters.iter().find(|e| &e.id == id)
    }
}
