//! Content packs: authored records loaded from TOML or JSON and validated
//! into a fresh [`GameState`].
//!
//! Every id must be unique within its kind and every cross-reference must
//! resolve. Either failure is fatal; nothing is partially loaded.

pub mod seed;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use tracing::info;

use campaign_rules::{
    is_kebab_case, ConsumableEffect, ContentRef, Creature, Difficulty, Faction, FlagValue, Item,
    ItemKind, Location, LocationId, Npc, PlayerCharacter, Quest, StatusEffect,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::state::{ensure_storable_flags, GameState, PartyRoster};

/// Authored content for one campaign.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentPack {
    pub player: Option<PlayerCharacter>,
    pub start_location: Option<LocationId>,
    pub timestamp: String,
    pub difficulty: Difficulty,
    pub flags: BTreeMap<String, FlagValue>,
    pub locations: Vec<Location>,
    pub factions: Vec<Faction>,
    pub npcs: Vec<Npc>,
    pub creatures: Vec<Creature>,
    pub items: Vec<Item>,
    pub status_effects: Vec<StatusEffect>,
    pub quests: Vec<Quest>,
    /// Companions travelling with the player from the start.
    pub party: PartyRoster,
}

impl ContentPack {
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        serde_json::from_str(raw).map_err(|e| EngineError::validation(format!("content: {e}")))
    }

    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        toml::from_str(raw).map_err(|e| EngineError::validation(format!("content: {e}")))
    }

    /// Load a pack, picking the format by file extension. Anything but `.toml` is read as JSON.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::validation(format!("{}: {e}", path.display())))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&raw),
            _ => Self::from_json_str(&raw),
        }
    }

    /// Check ids and references without keeping the resulting state.
    pub fn validate(&self) -> EngineResult<()> {
        self.clone().into_state(0, EngineConfig::default()).map(|_| ())
    }

    /// Build the initial world from this pack.
    pub fn into_state(self, seed: u64, config: EngineConfig) -> EngineResult<GameState> {
        config.validate()?;
        let pc = self
            .player
            .ok_or_else(|| EngineError::validation("content pack has no player"))?;
        let start = self
            .start_location
            .ok_or_else(|| EngineError::validation("content pack has no start location"))?;

        let mut state = GameState::new(pc, start, seed, config);
        state.timestamp = self.timestamp;
        state.difficulty = self.difficulty;
        state.flags = self.flags;
        state.locations = index("location", self.locations, |l| &l.id)?;
        state.factions = index("faction", self.factions, |f| &f.id)?;
        state.npcs = index("npc", self.npcs, |n| &n.id)?;
        state.creatures = index("creature", self.creatures, |c| &c.id)?;
        state.items = index("item", self.items, |i| &i.id)?;
        state.status_effects = index("status effect", self.status_effects, |s| &s.id)?;
        state.quests = index("quest", self.quests, |q| &q.id)?;
        state.party = self.party;

        References { state: &state }.check_all()?;

        state.recompute_all();
        state.refresh_quests()?;
        info!(
            seed,
            locations = state.locations.len(),
            npcs = state.npcs.len(),
            quests = state.quests.len(),
            "content loaded"
        );
        Ok(state)
    }
}

fn index<K, T>(kind: &str, records: Vec<T>, key: impl Fn(&T) -> &K) -> EngineResult<BTreeMap<K, T>>
where
    K: Ord + Clone + Display,
{
    let mut map = BTreeMap::new();
    for record in records {
        let id = key(&record).clone();
        if map.contains_key(&id) {
            return Err(EngineError::validation(format!("duplicate {kind} id '{id}'")));
        }
        map.insert(id, record);
    }
    Ok(map)
}

fn in_owner(owner: &str, err: EngineError) -> EngineError {
    match err {
        EngineError::Validation(msg) => EngineError::validation(format!("{owner}: {msg}")),
        other => other,
    }
}

/// Cross-reference checks over a freshly indexed state.
struct References<'a> {
    state: &'a GameState,
}

impl<'a> References<'a> {
    fn check_all(&self) -> EngineResult<()> {
        let state = self.state;
        self.resolve(ContentRef::Location(&state.current_location), "start location")?;
        if state.flags.keys().any(|key| key.is_empty()) {
            return Err(EngineError::validation("flag keys cannot be empty"));
        }
        ensure_storable_flags(state.flags.iter().map(|(key, value)| (key.as_str(), value)))?;

        self.check_player()?;
        for location in state.locations.values() {
            self.check_location(location)?;
        }
        for faction in state.factions.values() {
            let owner = format!("faction '{}'", faction.id);
            for location_id in &faction.territory {
                self.resolve(ContentRef::Location(location_id), &owner)?;
            }
            for other in faction.relationships.keys() {
                self.resolve(ContentRef::Faction(other), &owner)?;
            }
            for quest_id in &faction.quests {
                self.resolve(ContentRef::Quest(quest_id), &owner)?;
            }
        }
        for npc in state.npcs.values() {
            self.check_npc(npc)?;
        }
        for creature in state.creatures.values() {
            self.check_creature(creature, &format!("creature '{}'", creature.id))?;
        }
        for item in state.items.values() {
            self.check_item(item)?;
        }
        for effect in state.status_effects.values() {
            if let Some(condition) = &effect.dispel_when {
                let owner = format!("status effect '{}'", effect.id);
                self.conditions(std::slice::from_ref(condition), &owner)?;
            }
        }
        for quest in state.quests.values() {
            self.check_quest(quest)?;
        }
        self.check_party()
    }

    fn check_party(&self) -> EngineResult<()> {
        let party = &self.state.party;
        if let Some(reason) = party.shape_error() {
            return Err(EngineError::validation(format!("party: {reason}")));
        }
        for npc_id in party.active.iter().chain(party.reserve.iter()) {
            self.resolve(ContentRef::Npc(npc_id), "party")?;
        }
        Ok(())
    }

    fn check_player(&self) -> EngineResult<()> {
        let pc = &self.state.pc;
        let owner = format!("player '{}'", pc.id);
        for entry in pc.inventory.iter() {
            self.resolve(ContentRef::Item(&entry.item_id), &owner)?;
        }
        for item in pc.equipment().values() {
            self.check_item(item)?;
        }
        for faction_id in pc.reputation.keys() {
            self.resolve(ContentRef::Faction(faction_id), &owner)?;
        }
        Ok(())
    }

    fn check_location(&self, location: &Location) -> EngineResult<()> {
        let owner = format!("location '{}'", location.id);
        if let Some(faction_id) = &location.controlled_by {
            self.resolve(ContentRef::Faction(faction_id), &owner)?;
        }
        for connection in &location.connections {
            self.resolve(ContentRef::Location(&connection.to), &owner)?;
            if let Some(condition) = &connection.condition {
                self.conditions(std::slice::from_ref(condition), &owner)?;
            }
        }
        let mut seen = Vec::new();
        for entry in &location.encounters {
            if seen.contains(&&entry.id) {
                return Err(EngineError::validation(format!(
                    "{owner}: duplicate encounter entry '{}'",
                    entry.id
                )));
            }
            seen.push(&entry.id);
            if let Some(condition) = &entry.requires {
                self.conditions(std::slice::from_ref(condition), &owner)?;
            }
            for group in &entry.spawns {
                if !self.state.creatures.contains_key(&group.creature_id) {
                    return Err(EngineError::validation(format!(
                        "{owner}: unknown creature '{}'",
                        group.creature_id
                    )));
                }
            }
            for npc_id in &entry.hostile_npcs {
                let npc = self.state.npcs.get(npc_id).ok_or_else(|| {
                    EngineError::validation(format!("{owner}: unknown npc '{npc_id}'"))
                })?;
                if npc.stat_block.is_none() {
                    return Err(EngineError::validation(format!(
                        "{owner}: npc '{npc_id}' cannot fight without a stat block"
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_npc(&self, npc: &Npc) -> EngineResult<()> {
        let owner = format!("npc '{}'", npc.id);
        if let Some(faction_id) = &npc.faction_id {
            self.resolve(ContentRef::Faction(faction_id), &owner)?;
        }
        for entry in &npc.schedule {
            if entry.start_hour > 23 || entry.end_hour > 24 {
                return Err(EngineError::validation(format!(
                    "{owner}: schedule hours out of range"
                )));
            }
            self.resolve(ContentRef::Location(&entry.location_id), &owner)?;
        }
        for quest_id in &npc.quest_hooks {
            self.resolve(ContentRef::Quest(quest_id), &owner)?;
        }
        if let Some(block) = &npc.stat_block {
            self.check_creature(block, &owner)?;
        }
        for (key, node) in &npc.dialogue {
            if key != &node.id || !is_kebab_case(&node.id) {
                return Err(EngineError::validation(format!(
                    "{owner}: malformed dialogue node id '{key}'"
                )));
            }
            self.effects(&node.on_enter, &owner)?;
            for choice in &node.choices {
                if !is_kebab_case(&choice.id) {
                    return Err(EngineError::validation(format!(
                        "{owner}: malformed choice id '{}'",
                        choice.id
                    )));
                }
                if let Some(condition) = &choice.condition {
                    self.conditions(std::slice::from_ref(condition), &owner)?;
                }
                self.effects(&choice.effects, &owner)?;
                self.effects(&choice.failure_effects, &owner)?;
                for next in choice.next.iter().chain(choice.failure_next.iter()) {
                    if !npc.dialogue.contains_key(next) {
                        return Err(EngineError::validation(format!(
                            "{owner}: choice '{}' leads to unknown node '{next}'",
                            choice.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_creature(&self, creature: &Creature, owner: &str) -> EngineResult<()> {
        for action in &creature.actions {
            for effect_id in &action.on_hit {
                self.resolve(ContentRef::StatusEffect(effect_id), owner)?;
            }
        }
        Ok(())
    }

    fn check_item(&self, item: &Item) -> EngineResult<()> {
        let owner = format!("item '{}'", item.id);
        match &item.kind {
            ItemKind::Generic => {}
            ItemKind::Equipment(equipment) => {
                if let Some(attack) = &equipment.attack {
                    for effect_id in &attack.on_hit {
                        self.resolve(ContentRef::StatusEffect(effect_id), &owner)?;
                    }
                }
            }
            ItemKind::Consumable(consumable) => {
                if let ConsumableEffect::ApplyStatus(effect_id) = &consumable.effect {
                    self.resolve(ContentRef::StatusEffect(effect_id), &owner)?;
                }
            }
        }
        Ok(())
    }

    fn check_quest(&self, quest: &Quest) -> EngineResult<()> {
        let owner = format!("quest '{}'", quest.id);
        if quest.stages.is_empty() {
            return Err(EngineError::validation(format!("{owner}: has no stages")));
        }
        for dependency in &quest.dependencies {
            if dependency.quest_id == quest.id {
                return Err(EngineError::validation(format!("{owner}: depends on itself")));
            }
            self.resolve(ContentRef::Quest(&dependency.quest_id), &owner)?;
        }
        for faction_id in &quest.related_factions {
            self.resolve(ContentRef::Faction(faction_id), &owner)?;
        }
        for npc_id in &quest.related_npcs {
            self.resolve(ContentRef::Npc(npc_id), &owner)?;
        }
        if let Some(condition) = &quest.triggers {
            self.conditions(std::slice::from_ref(condition), &owner)?;
        }
        if let Some(condition) = &quest.fail_conditions {
            self.conditions(std::slice::from_ref(condition), &owner)?;
        }
        self.effects(&quest.rewards, &owner)?;
        for stage in &quest.stages {
            if !is_kebab_case(&stage.id) {
                return Err(EngineError::validation(format!(
                    "{owner}: malformed stage id '{}'",
                    stage.id
                )));
            }
            if quest.stages.iter().filter(|s| s.id == stage.id).count() > 1 {
                return Err(EngineError::validation(format!(
                    "{owner}: duplicate stage id '{}'",
                    stage.id
                )));
            }
            for next in stage.success_next.iter().chain(stage.failure_next.iter()) {
                if quest.stage_index(next).is_none() {
                    return Err(EngineError::validation(format!(
                        "{owner}: stage '{}' leads to unknown stage '{next}'",
                        stage.id
                    )));
                }
            }
            self.conditions(&stage.entry_conditions, &owner)?;
            self.effects(&stage.on_success, &owner)?;
            self.effects(&stage.on_failure, &owner)?;
        }
        Ok(())
    }

    fn conditions(&self, conditions: &[campaign_rules::Condition], owner: &str) -> EngineResult<()> {
        let mut refs = Vec::new();
        let mut flags = Vec::new();
        for condition in conditions {
            condition.visit_refs(&mut |r| refs.push(r));
            condition.visit_flags(&mut |key, value| flags.push((key, value)));
        }
        ensure_storable_flags(flags).map_err(|e| in_owner(owner, e))?;
        refs.into_iter().try_for_each(|r| self.resolve(r, owner))
    }

    fn effects(&self, effects: &[campaign_rules::Effect], owner: &str) -> EngineResult<()> {
        let mut refs = Vec::new();
        let mut flags = Vec::new();
        for effect in effects {
            effect.visit_refs(&mut |r| refs.push(r));
            effect.visit_flags(&mut |key, value| flags.push((key, value)));
        }
        ensure_storable_flags(flags).map_err(|e| in_owner(owner, e))?;
        refs.into_iter().try_for_each(|r| self.resolve(r, owner))
    }

    fn resolve(&self, reference: ContentRef<'_>, owner: &str) -> EngineResult<()> {
        let state = self.state;
        let missing = |kind: &str, id: &dyn Display| {
            Err(EngineError::validation(format!("{owner}: unknown {kind} '{id}'")))
        };
        match reference {
            ContentRef::Faction(id) if !state.factions.contains_key(id) => missing("faction", id),
            ContentRef::Npc(id) if !state.npcs.contains_key(id) => missing("npc", id),
            ContentRef::Quest(id) if !state.quests.contains_key(id) => missing("quest", id),
            ContentRef::Item(id) if !state.items.contains_key(id) => missing("item", id),
            ContentRef::Location(id) if !state.locations.contains_key(id) => missing("location", id),
            ContentRef::StatusEffect(id) if !state.status_effects.contains_key(id) => {
                missing("status effect", id)
            }
            ContentRef::EncounterEntry(location_id, entry_id) => {
                let found = match location_id {
                    Some(location_id) => state
                        .locations
                        .get(location_id)
                        .is_some_and(|l| l.entry(entry_id).is_some()),
                    None => state.locations.values().any(|l| l.entry(entry_id).is_some()),
                };
                if found {
                    Ok(())
                } else {
                    missing("encounter entry", entry_id)
                }
            }
            ContentRef::DialogueNode(npc_id, node_id) => {
                let found = state
                    .npcs
                    .get(npc_id)
                    .is_some_and(|npc| npc.dialogue.contains_key(node_id));
                if found {
                    Ok(())
                } else {
                    missing("dialogue node", &format!("{npc_id}/{node_id}"))
                }
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_rules::{Connection, Effect, FactionId, NpcId, QuestStage};

    fn pack() -> ContentPack {
        seed::starter_pack().unwrap()
    }

    #[test]
    fn test_starter_pack_is_valid() {
        assert!(pack().validate().is_ok());
    }

    #[test]
    fn test_duplicate_ids_are_fatal() {
        let mut pack = pack();
        let copy = pack.locations[0].clone();
        pack.locations.push(copy);

        let err = pack.validate().unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(err.to_string().contains("duplicate location id 'silverthorn'"));
    }

    #[test]
    fn test_dangling_connection_is_fatal() {
        let mut pack = pack();
        pack.locations[0]
            .connections
            .push(Connection::new(LocationId::new("moonfall").unwrap(), 60));

        let err = pack.validate().unwrap_err();
        assert!(err.to_string().contains("unknown location 'moonfall'"));
    }

    #[test]
    fn test_dangling_effect_reference_is_fatal() {
        let mut pack = pack();
        pack.quests[0].stages[0].on_success.push(Effect::AdjustReputation {
            faction_id: FactionId::new("spore-cult").unwrap(),
            delta: 5,
        });

        let err = pack.validate().unwrap_err();
        assert!(err.to_string().contains("unknown faction 'spore-cult'"));
    }

    #[test]
    fn test_non_finite_flags_are_fatal() {
        let mut flagged = pack();
        flagged.flags.insert("morale".into(), FlagValue::Float(f64::NAN));
        let err = flagged.validate().unwrap_err();
        assert!(err.to_string().contains("flag 'morale'"));

        let mut scripted = pack();
        scripted.quests[0].stages[0]
            .on_success
            .push(Effect::set_flag("omen-strength", f64::INFINITY));
        let err = scripted.validate().unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(err.to_string().contains("quest '"));
    }

    #[test]
    fn test_party_must_name_known_npcs() {
        let mut pack = pack();
        pack.party.active.push(NpcId::new("ghost-of-nobody").unwrap());
        let err = pack.validate().unwrap_err();
        assert!(err.to_string().contains("unknown npc 'ghost-of-nobody'"));

        let mut pack = self::pack();
        let wolf = NpcId::new("spore-wolf-alpha").unwrap();
        pack.party.reserve.push(wolf.clone());
        pack.party.leader = Some(wolf);
        let err = pack.validate().unwrap_err();
        assert!(err.to_string().contains("party: leader 'spore-wolf-alpha'"));
    }

    #[test]
    fn test_stage_branch_must_exist() {
        let mut pack = pack();
        let mut stage = QuestStage::new("dead-end");
        stage.success_next = Some("nowhere".into());
        pack.quests[0].stages.push(stage);

        assert!(pack.validate().is_err());
    }

    #[test]
    fn test_malformed_id_rejected_on_parse() {
        let err = ContentPack::from_json_str(
            r#"{ "locations": [{ "id": "Silver Thorn", "name": "Silverthorn" }] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_json_round_trip_loads_same_world() {
        let json = serde_json::to_string(&pack()).unwrap();
        let reloaded = ContentPack::from_json_str(&json).unwrap();

        let a = pack().into_state(9, EngineConfig::default()).unwrap();
        let b = reloaded.into_state(9, EngineConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.toml");
        std::fs::write(
            &path,
            r#"
            start_location = "camp"

            [player]
            id = "pc-rook"
            name = "Rook"
            base_abilities = { strength = 12, dexterity = 12, constitution = 12, intelligence = 10, wisdom = 10, charisma = 10 }

            [[locations]]
            id = "camp"
            name = "Camp"
            danger = "safe"
            "#,
        )
        .unwrap();

        let state = ContentPack::load(&path)
            .unwrap()
            .into_state(1, EngineConfig::default())
            .unwrap();
        assert_eq!(state.current_location().as_str(), "camp");
        assert_eq!(state.pc().name, "Rook");
    }

    #[test]
    fn test_missing_player_is_fatal() {
        let mut pack = pack();
        pack.player = None;
        assert!(matches!(pack.validate(), Err(EngineError::Validation(_))));
    }
}
