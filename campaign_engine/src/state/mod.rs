//! The world state container - the single owner of every entity and the only
//! sanctioned way to change world facts.
//!
//! Every public mutation is staged on a copy of the state and committed only
//! when the whole bundle succeeds, after which quest triggers and fail
//! conditions are refreshed.

mod eval;
mod party;
mod rng;

pub use party::*;
pub use rng::*;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use campaign_rules::{
    Ability, CheckKind, CheckResult, Combatant, ConsumableEffect, Creature, CreatureId, Difficulty,
    Effect, EncounterTable, EncounterTableId, EquipmentSlot, Faction, FactionId, FlagValue, Item,
    ItemId, Location, LocationId, Npc, NpcId, PlayerCharacter, Quest, QuestId, QuestStatus,
    RollMode, Skill, StatusEffect, StatusEffectId, TargetRef, TimeOfDay, WorldClock,
};

use crate::combat::{EncounterSetup, EncounterState};
use crate::config::EngineConfig;
use crate::dialogue::{DialogueCursor, TranscriptEntry};
use crate::error::{EngineError, EngineResult};

/// Where a completed trip went and what it cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelReport {
    pub from: LocationId,
    pub to: LocationId,
    pub minutes: u32,
}

/// An encounter table entry drawn for a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterRoll {
    pub location_id: LocationId,
    pub entry_id: EncounterTableId,
}

impl EncounterRoll {
    /// Setup for starting combat from this roll.
    pub fn into_setup(self) -> EncounterSetup {
        EncounterSetup::new(self.entry_id).at(self.location_id)
    }
}

/// The authoritative world snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub(crate) timestamp: String,
    pub(crate) pc: PlayerCharacter,
    pub(crate) npcs: BTreeMap<NpcId, Npc>,
    pub(crate) factions: BTreeMap<FactionId, Faction>,
    pub(crate) locations: BTreeMap<LocationId, Location>,
    pub(crate) quests: BTreeMap<QuestId, Quest>,
    /// Authored templates. Never touched by combat.
    pub(crate) creatures: BTreeMap<CreatureId, Creature>,
    /// Spawned instances, kept after they fight.
    #[serde(default)]
    pub(crate) creature_instances: BTreeMap<CreatureId, Creature>,
    pub(crate) items: BTreeMap<ItemId, Item>,
    pub(crate) status_effects: BTreeMap<StatusEffectId, StatusEffect>,
    #[serde(default)]
    pub(crate) flags: BTreeMap<String, FlagValue>,
    pub(crate) clock: WorldClock,
    pub(crate) rng: RngStream,
    #[serde(default)]
    pub(crate) difficulty: Difficulty,
    pub(crate) current_location: LocationId,
    #[serde(default)]
    pub(crate) visited: BTreeSet<LocationId>,
    #[serde(default)]
    pub(crate) active_encounter: Option<EncounterState>,
    /// The most recently resolved encounter, log included.
    #[serde(default)]
    pub(crate) last_encounter: Option<EncounterState>,
    #[serde(default)]
    pub(crate) active_dialogue: Option<DialogueCursor>,
    #[serde(default)]
    pub(crate) transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub(crate) party: PartyRoster,
    #[serde(default)]
    pub(crate) spawn_counter: u64,
    #[serde(default)]
    pub(crate) config: EngineConfig,
}

impl GameState {
    /// An empty world around a player standing at `start`. Content is added by the loader.
    pub(crate) fn new(pc: PlayerCharacter, start: LocationId, seed: u64, config: EngineConfig) -> Self {
        let mut visited = BTreeSet::new();
        visited.insert(start.clone());
        Self {
            timestamp: String::new(),
            pc,
            npcs: BTreeMap::new(),
            factions: BTreeMap::new(),
            locations: BTreeMap::new(),
            quests: BTreeMap::new(),
            creatures: BTreeMap::new(),
            creature_instances: BTreeMap::new(),
            items: BTreeMap::new(),
            status_effects: BTreeMap::new(),
            flags: BTreeMap::new(),
            clock: WorldClock::default(),
            rng: RngStream::new(seed),
            difficulty: Difficulty::Standard,
            current_location: start,
            visited,
            active_encounter: None,
            last_encounter: None,
            active_dialogue: None,
            transcript: Vec::new(),
            party: PartyRoster::new(),
            spawn_counter: 0,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn pc(&self) -> &PlayerCharacter {
        &self.pc
    }

    pub fn npc(&self, id: &str) -> Option<&Npc> {
        self.npcs.get(id)
    }

    pub fn npcs(&self) -> impl Iterator<Item = &Npc> {
        self.npcs.values()
    }

    pub fn faction(&self, id: &str) -> Option<&Faction> {
        self.factions.get(id)
    }

    pub fn location(&self, id: &str) -> Option<&Location> {
        self.locations.get(id)
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    pub fn quest(&self, id: &str) -> Option<&Quest> {
        self.quests.get(id)
    }

    pub fn quests(&self) -> impl Iterator<Item = &Quest> {
        self.quests.values()
    }

    /// A creature template.
    pub fn creature(&self, id: &str) -> Option<&Creature> {
        self.creatures.get(id)
    }

    /// A spawned creature instance.
    pub fn creature_instance(&self, id: &str) -> Option<&Creature> {
        self.creature_instances.get(id)
    }

    pub fn creature_instances(&self) -> impl Iterator<Item = &Creature> {
        self.creature_instances.values()
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn status_effect(&self, id: &str) -> Option<&StatusEffect> {
        self.status_effects.get(id)
    }

    pub fn flag(&self, key: &str) -> Option<&FlagValue> {
        self.flags.get(key)
    }

    pub fn flags(&self) -> &BTreeMap<String, FlagValue> {
        &self.flags
    }

    pub fn clock(&self) -> &WorldClock {
        &self.clock
    }

    pub fn rng(&self) -> &RngStream {
        &self.rng
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn current_location(&self) -> &LocationId {
        &self.current_location
    }

    pub fn visited(&self) -> &BTreeSet<LocationId> {
        &self.visited
    }

    pub fn has_visited(&self, id: &str) -> bool {
        self.visited.contains(id)
    }

    pub fn active_encounter(&self) -> Option<&EncounterState> {
        self.active_encounter.as_ref()
    }

    pub fn last_encounter(&self) -> Option<&EncounterState> {
        self.last_encounter.as_ref()
    }

    pub fn active_dialogue(&self) -> Option<&DialogueCursor> {
        self.active_dialogue.as_ref()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn party(&self) -> &PartyRoster {
        &self.party
    }

    /// Player standing with a faction; the faction's base reputation until adjusted.
    pub fn reputation(&self, faction_id: &str) -> i32 {
        self.pc.reputation.get(faction_id).copied().unwrap_or_else(|| {
            self.factions
                .get(faction_id)
                .map(|f| f.base_reputation)
                .unwrap_or(0)
        })
    }

    /// An NPC's disposition toward the player.
    pub fn relationship(&self, npc_id: &str) -> i32 {
        self.npcs.get(npc_id).map(|n| n.disposition).unwrap_or(0)
    }

    /// Living NPCs whose schedule puts them at `location_id` right now.
    pub fn npcs_at(&self, location_id: &str) -> Vec<&Npc> {
        self.npcs
            .values()
            .filter(|npc| npc.is_alive)
            .filter(|npc| {
                npc.scheduled_entry(self.clock.hour)
                    .is_some_and(|entry| entry.location_id.as_str() == location_id)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Staging
    // ------------------------------------------------------------------

    /// Run `mutation` against a copy and commit it only if it, and the quest
    /// refresh that follows, succeed.
    pub(crate) fn transact<T>(
        &mut self,
        label: &str,
        mutation: impl FnOnce(&mut GameState) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut staged = self.clone();
        let result = mutation(&mut staged).and_then(|value| {
            staged.refresh_quests()?;
            Ok(value)
        });
        match result {
            Ok(value) => {
                *self = staged;
                debug!(mutation = label, "committed");
                Ok(value)
            }
            Err(err) => {
                warn!(mutation = label, error = %err, "rejected, state unchanged");
                Err(err)
            }
        }
    }

    /// Rebuild every derived stat block. Needed after deserialization.
    pub fn recompute_all(&mut self) {
        self.pc.recompute();
        for creature in self.creatures.values_mut() {
            creature.recompute();
        }
        for creature in self.creature_instances.values_mut() {
            creature.recompute();
        }
        for npc in self.npcs.values_mut() {
            if let Some(block) = npc.stat_block.as_mut() {
                block.recompute();
            }
            if let Some(block) = npc.combat_block.as_mut() {
                block.recompute();
            }
        }
    }

    // ------------------------------------------------------------------
    // Mutation API
    // ------------------------------------------------------------------

    pub fn set_timestamp(&mut self, timestamp: impl Into<String>) {
        self.timestamp = timestamp.into();
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    pub fn set_flag(&mut self, key: impl Into<String>, value: impl Into<FlagValue>) -> EngineResult<()> {
        let effect = Effect::set_flag(key, value);
        self.transact("set_flag", |state| state.apply_effect(&effect))
    }

    /// Move along a connection from the current location.
    pub fn travel_to(&mut self, destination: &LocationId) -> EngineResult<TravelReport> {
        self.transact("travel_to", |state| state.travel_inner(destination))
    }

    fn travel_inner(&mut self, destination: &LocationId) -> EngineResult<TravelReport> {
        let from = self.current_location.clone();
        let blocked = |reason: &str| EngineError::InvalidTravelEdge {
            from: from.to_string(),
            to: destination.to_string(),
            reason: reason.to_string(),
        };

        if self.active_encounter.is_some() {
            return Err(blocked("an encounter is in progress"));
        }
        if !self.locations.contains_key(destination) {
            return Err(blocked("unknown destination"));
        }
        let connection = self
            .locations
            .get(&from)
            .and_then(|origin| origin.connection_to(destination))
            .cloned()
            .ok_or_else(|| blocked("no connection"))?;
        if let Some(condition) = &connection.condition {
            if !self.evaluate(condition)? {
                return Err(blocked("travel condition not met"));
            }
        }

        self.advance_clock_inner(connection.travel_minutes)?;
        self.current_location = destination.clone();
        self.visited.insert(destination.clone());
        info!(%from, to = %destination, minutes = connection.travel_minutes, "travelled");

        Ok(TravelReport {
            from,
            to: destination.clone(),
            minutes: connection.travel_minutes,
        })
    }

    /// Draw from a location's encounter table.
    ///
    /// Rows are filtered by time of day and their own conditions. Weighted
    /// tables always produce an encounter when a row qualifies; unweighted
    /// ones first roll against the location's danger. `Ok(None)` is an
    /// ordinary outcome.
    pub fn roll_encounter(
        &mut self,
        location_id: &LocationId,
        time_of_day: TimeOfDay,
    ) -> EngineResult<Option<EncounterRoll>> {
        let location = self
            .locations
            .get(location_id)
            .ok_or_else(|| EngineError::validation(format!("unknown location '{location_id}'")))?;

        let mut candidates = Vec::new();
        for entry in location.encounters.open_at(time_of_day) {
            let open = match &entry.requires {
                Some(condition) => self.evaluate(condition)?,
                None => true,
            };
            if open {
                candidates.push(entry);
            }
        }
        if candidates.is_empty() {
            debug!(location = %location_id, ?time_of_day, "no encounter rows qualify");
            return Ok(None);
        }

        let chance = if location.encounters.is_weighted() {
            1.0
        } else {
            self.config.danger_chance.for_level(location.danger)
        };
        if !self.rng.chance(chance) {
            debug!(location = %location_id, chance, "no encounter");
            return Ok(None);
        }

        let picked = self
            .rng
            .pick_weighted(&candidates, |entry| entry.effective_weight())
            .map(|entry| EncounterRoll {
                location_id: location_id.clone(),
                entry_id: entry.id.clone(),
            });
        if let Some(roll) = &picked {
            info!(location = %location_id, entry = %roll.entry_id, "encounter rolled");
        }
        Ok(picked)
    }

    pub fn adjust_reputation(&mut self, faction_id: &FactionId, delta: i32) -> EngineResult<i32> {
        self.transact("adjust_reputation", |state| {
            state.adjust_reputation_inner(faction_id, delta)
        })
    }

    fn adjust_reputation_inner(&mut self, faction_id: &FactionId, delta: i32) -> EngineResult<i32> {
        if !self.factions.contains_key(faction_id) {
            return Err(EngineError::validation(format!("unknown faction '{faction_id}'")));
        }
        let value = self.reputation(faction_id.as_str()) + delta;
        self.pc.reputation.insert(faction_id.clone(), value);
        debug!(faction = %faction_id, delta, value, "reputation adjusted");
        Ok(value)
    }

    pub fn adjust_relationship(&mut self, npc_id: &NpcId, delta: i32) -> EngineResult<i32> {
        self.transact("adjust_relationship", |state| {
            state.adjust_relationship_inner(npc_id, delta)
        })
    }

    fn adjust_relationship_inner(&mut self, npc_id: &NpcId, delta: i32) -> EngineResult<i32> {
        let npc = self
            .npcs
            .get_mut(npc_id)
            .ok_or_else(|| EngineError::validation(format!("unknown npc '{npc_id}'")))?;
        npc.disposition += delta;
        debug!(npc = %npc_id, delta, value = npc.disposition, "relationship adjusted");
        Ok(npc.disposition)
    }

    /// Add a living NPC to the party, or move it between active and reserve.
    pub fn recruit_companion(&mut self, npc_id: &NpcId, active: bool) -> EngineResult<()> {
        self.transact("recruit_companion", |state| {
            state.ensure_party_unlocked()?;
            let npc = state
                .npcs
                .get(npc_id)
                .ok_or_else(|| EngineError::validation(format!("unknown npc '{npc_id}'")))?;
            if !npc.is_alive {
                return Err(EngineError::invalid_action(format!("'{npc_id}' cannot join the party")));
            }
            state.party.ensure_member(npc_id, active);
            info!(npc = %npc_id, active, "companion recruited");
            Ok(())
        })
    }

    /// Remove an NPC from the party. Returns whether it was a member.
    pub fn dismiss_companion(&mut self, npc_id: &NpcId) -> EngineResult<bool> {
        self.transact("dismiss_companion", |state| {
            state.ensure_party_unlocked()?;
            Ok(state.party.remove(npc_id))
        })
    }

    /// Hand the lead to an active companion, or back to the player with `None`.
    pub fn set_party_leader(&mut self, leader: Option<NpcId>) -> EngineResult<()> {
        self.transact("set_party_leader", |state| {
            if let Some(npc_id) = &leader {
                if !state.party.is_active(npc_id) {
                    return Err(EngineError::invalid_action(format!(
                        "'{npc_id}' is not an active companion"
                    )));
                }
            }
            state.party.leader = leader;
            Ok(())
        })
    }

    fn ensure_party_unlocked(&self) -> EngineResult<()> {
        if self.active_encounter.is_some() {
            return Err(EngineError::invalid_action("the party cannot change mid-fight"));
        }
        Ok(())
    }

    /// Move the world clock forward, ticking time-based status effects.
    pub fn advance_clock(&mut self, minutes: u32) -> EngineResult<()> {
        self.transact("advance_clock", |state| state.advance_clock_inner(minutes))
    }

    fn advance_clock_inner(&mut self, minutes: u32) -> EngineResult<()> {
        if minutes == 0 {
            return Ok(());
        }
        self.clock.advance(minutes);
        let expired = self.pc.tick_minutes(minutes);
        if !expired.is_empty() {
            debug!(?expired, "player effects expired");
        }
        for creature in self.creature_instances.values_mut() {
            creature.tick_minutes(minutes);
        }
        for npc in self.npcs.values_mut() {
            if let Some(block) = npc.combat_block.as_mut() {
                block.tick_minutes(minutes);
            }
        }
        self.dispel_player_effects()?;
        Ok(())
    }

    fn dispel_player_effects(&mut self) -> EngineResult<()> {
        let conditions: Vec<(StatusEffectId, campaign_rules::Condition)> = self
            .pc
            .status_effects()
            .dispel_conditions()
            .map(|(id, condition)| (id.clone(), condition.clone()))
            .collect();
        let mut dispelled = Vec::new();
        for (id, condition) in conditions {
            if self.evaluate(&condition)? {
                dispelled.push(id);
            }
        }
        if !dispelled.is_empty() {
            debug!(?dispelled, "player effects dispelled");
            self.pc.remove_statuses(&dispelled);
        }
        Ok(())
    }

    /// Apply a bundle of effects all-or-nothing.
    pub fn apply_quest_effect(&mut self, effects: &[Effect]) -> EngineResult<()> {
        self.transact("apply_quest_effect", |state| state.apply_effects(effects))
    }

    /// Start a quest whose dependencies are satisfied.
    pub fn start_quest(&mut self, quest_id: &QuestId) -> EngineResult<()> {
        self.transact("start_quest", |state| state.start_quest_inner(quest_id))
    }

    /// Resolve the current stage of an active quest along its success or failure branch.
    pub fn advance_quest_stage(&mut self, quest_id: &QuestId, success: bool) -> EngineResult<QuestStatus> {
        self.transact("advance_quest_stage", |state| {
            state.advance_quest_inner(quest_id, success)
        })
    }

    /// Equip an item from the inventory. Whatever it displaces goes back to the inventory.
    pub fn equip_item(&mut self, item_id: &ItemId) -> EngineResult<Option<ItemId>> {
        self.transact("equip_item", |state| {
            let item = state
                .items
                .get(item_id)
                .cloned()
                .ok_or_else(|| EngineError::validation(format!("unknown item '{item_id}'")))?;
            state.pc.inventory.remove(item_id, 1)?;
            let previous = state.pc.equip(item)?;
            let previous = previous.map(|prev| {
                state.pc.inventory.add(&prev.id, 1);
                prev.id
            });
            Ok(previous)
        })
    }

    pub fn unequip_item(&mut self, slot: EquipmentSlot) -> EngineResult<Option<ItemId>> {
        self.transact("unequip_item", |state| {
            Ok(state.pc.unequip(slot).map(|item| {
                state.pc.inventory.add(&item.id, 1);
                item.id
            }))
        })
    }

    /// Use a consumable on the player outside combat.
    pub fn use_item(&mut self, item_id: &ItemId) -> EngineResult<()> {
        self.transact("use_item", |state| {
            if state.active_encounter.is_some() {
                return Err(EngineError::invalid_action(
                    "items are used through the encounter while in combat",
                ));
            }
            let consumable = state
                .items
                .get(item_id)
                .ok_or_else(|| EngineError::invalid_action(format!("unknown item '{item_id}'")))?
                .as_consumable()
                .cloned()
                .ok_or_else(|| {
                    EngineError::invalid_action(format!("'{item_id}' is not a consumable"))
                })?;
            if !state.pc.is_alive() {
                return Err(EngineError::invalid_action("the player is dead"));
            }
            match &consumable.effect {
                ConsumableEffect::Heal(amount) => state.pc.heal(*amount),
                ConsumableEffect::ApplyStatus(effect_id) => {
                    state.apply_status_to_target(&TargetRef::Player, effect_id, item_id.as_str())?;
                }
            }
            state.pc.inventory.consume_charge(item_id, consumable.charges)?;
            Ok(())
        })
    }

    /// Player skill check drawn from the state's stream.
    pub fn roll_skill_check(&mut self, skill: Skill, dc: i32, mode: RollMode) -> CheckResult {
        self.roll_check(CheckKind::Skill(skill), dc, mode)
    }

    pub fn roll_ability_check(&mut self, ability: Ability, dc: i32, mode: RollMode) -> CheckResult {
        self.roll_check(CheckKind::Ability(ability), dc, mode)
    }

    pub(crate) fn roll_check(&mut self, kind: CheckKind, dc: i32, mode: RollMode) -> CheckResult {
        let modifier = match kind {
            CheckKind::Skill(skill) => self.pc.skill_modifier(skill),
            CheckKind::Ability(ability) => self.pc.ability_modifier(ability),
        };
        let roll = self.rng.roll_d20(mode);
        let result = CheckResult::new(roll, modifier, dc);
        debug!(?kind, roll, total = result.total, dc, success = result.success, "check rolled");
        result
    }

    // ------------------------------------------------------------------
    // Unstaged internals. Callers run these inside `transact`.
    // ------------------------------------------------------------------

    pub(crate) fn apply_effects(&mut self, effects: &[Effect]) -> EngineResult<()> {
        for effect in effects {
            self.apply_effect(effect)?;
        }
        Ok(())
    }

    pub(crate) fn apply_effect(&mut self, effect: &Effect) -> EngineResult<()> {
        match effect {
            Effect::SetFlag { key, value } => {
                if key.is_empty() {
                    return Err(EngineError::validation("flag keys cannot be empty"));
                }
                ensure_storable_flags([(key.as_str(), value)])?;
                debug!(flag = %key, %value, "flag set");
                self.flags.insert(key.clone(), value.clone());
            }
            Effect::AdjustReputation { faction_id, delta } => {
                self.adjust_reputation_inner(faction_id, *delta)?;
            }
            Effect::AdjustRelationship { npc_id, delta } => {
                self.adjust_relationship_inner(npc_id, *delta)?;
            }
            Effect::StartQuest { quest_id } => self.start_quest_inner(quest_id)?,
            Effect::AdvanceQuestStage { quest_id, success } => {
                self.advance_quest_inner(quest_id, *success)?;
            }
            Effect::GrantItem { item_id, quantity } => {
                if !self.items.contains_key(item_id) {
                    return Err(EngineError::validation(format!("unknown item '{item_id}'")));
                }
                self.pc.inventory.add(item_id, *quantity);
            }
            Effect::RemoveItem { item_id, quantity } => {
                self.pc.inventory.remove(item_id, *quantity)?;
            }
            Effect::GrantXp { amount } => {
                let levels = self.pc.gain_xp(*amount);
                if !levels.is_empty() {
                    info!(?levels, "player levelled up");
                }
            }
            Effect::AdvanceClock { minutes } => self.advance_clock_inner(*minutes)?,
            Effect::StartEncounter {
                location_id,
                entry_id,
                objective,
                on_resolved,
            } => {
                let setup = EncounterSetup {
                    location_id: location_id.clone(),
                    entry_id: entry_id.clone(),
                    objective: objective.clone(),
                    on_resolved: on_resolved.clone(),
                };
                self.begin_encounter_inner(setup)?;
            }
            Effect::ApplyStatusEffect { target, effect_id } => {
                self.apply_status_to_target(target, effect_id, "effect")?;
            }
            Effect::TriggerDialogueNode { npc_id, node_id } => {
                self.open_dialogue_inner(npc_id, node_id)?;
            }
        }
        Ok(())
    }

    fn apply_status_to_target(
        &mut self,
        target: &TargetRef,
        effect_id: &StatusEffectId,
        source: &str,
    ) -> EngineResult<()> {
        let effect = self
            .status_effects
            .get(effect_id)
            .cloned()
            .ok_or_else(|| EngineError::validation(format!("unknown status effect '{effect_id}'")))?;
        let outcome = match target {
            TargetRef::Player => self.pc.apply_status(&effect, Some(source.to_string())),
            TargetRef::Npc(npc_id) => {
                let player_level = self.pc.level();
                let difficulty = self.difficulty;
                let npc = self
                    .npcs
                    .get_mut(npc_id)
                    .ok_or_else(|| EngineError::validation(format!("unknown npc '{npc_id}'")))?;
                let mut block = npc.combat_copy(player_level, difficulty).ok_or_else(|| {
                    EngineError::invalid_action(format!("npc '{npc_id}' has no stat block"))
                })?;
                let outcome = block.apply_status(&effect, Some(source.to_string()));
                npc.combat_block = Some(block);
                outcome
            }
        };
        debug!(effect = %effect_id, ?target, ?outcome, "status applied");
        Ok(())
    }

    pub(crate) fn start_quest_inner(&mut self, quest_id: &QuestId) -> EngineResult<()> {
        let quest = self
            .quests
            .get(quest_id)
            .ok_or_else(|| EngineError::validation(format!("unknown quest '{quest_id}'")))?;
        if !self.dependencies_met(quest) {
            return Err(EngineError::invalid_action(format!(
                "dependencies of quest '{quest_id}' are not met"
            )));
        }
        let quest = self
            .quests
            .get_mut(quest_id)
            .ok_or_else(|| EngineError::validation(format!("unknown quest '{quest_id}'")))?;
        if quest.start()? {
            info!(quest = %quest_id, "quest started");
        }
        Ok(())
    }

    fn dependencies_met(&self, quest: &Quest) -> bool {
        quest.dependencies.iter().all(|dep| {
            self.quests.get(&dep.quest_id).is_some_and(|other| {
                other.status != QuestStatus::NotStarted && other.stage >= dep.min_stage
            })
        })
    }

    pub(crate) fn advance_quest_inner(&mut self, quest_id: &QuestId, success: bool) -> EngineResult<QuestStatus> {
        let quest = self
            .quests
            .get(quest_id)
            .ok_or_else(|| EngineError::validation(format!("unknown quest '{quest_id}'")))?;
        if let Some(stage) = quest.current_stage() {
            for condition in &stage.entry_conditions {
                if !self.evaluate(condition)? {
                    return Err(EngineError::invalid_action(format!(
                        "entry conditions of stage '{}' in quest '{quest_id}' are not met",
                        stage.id
                    )));
                }
            }
        }
        let transition = quest.plan_advance(success)?;

        if let Some(quest) = self.quests.get_mut(quest_id) {
            quest.apply_transition(&transition);
        }
        info!(
            quest = %quest_id,
            from = transition.from,
            to = transition.to,
            status = ?transition.status,
            "quest advanced"
        );
        self.apply_effects(&transition.effects)?;
        Ok(transition.status)
    }

    /// Start quests whose triggers now hold and fail those whose fail conditions do,
    /// until nothing changes.
    pub(crate) fn refresh_quests(&mut self) -> EngineResult<()> {
        let ids: Vec<QuestId> = self.quests.keys().cloned().collect();
        for _ in 0..=ids.len() {
            let mut changed = false;
            for id in &ids {
                let Some(quest) = self.quests.get(id) else {
                    continue;
                };
                match quest.status {
                    QuestStatus::NotStarted => {
                        let Some(trigger) = &quest.triggers else {
                            continue;
                        };
                        if self.dependencies_met(quest) && self.evaluate(trigger)? {
                            self.start_quest_inner(id)?;
                            changed = true;
                        }
                    }
                    QuestStatus::Active => {
                        let Some(fail) = &quest.fail_conditions else {
                            continue;
                        };
                        if self.evaluate(fail)? {
                            if let Some(quest) = self.quests.get_mut(id) {
                                quest.status = QuestStatus::Failed;
                            }
                            info!(quest = %id, "quest failed");
                            changed = true;
                        }
                    }
                    QuestStatus::Completed | QuestStatus::Failed => {}
                }
            }
            if !changed {
                break;
            }
        }
        Ok(())
    }
}

/// Reject flag values a save could not carry.
pub(crate) fn ensure_storable_flags<'a>(
    flags: impl IntoIterator<Item = (&'a str, &'a FlagValue)>,
) -> EngineResult<()> {
    match flags.into_iter().find(|(_, value)| !value.is_storable()) {
        Some((key, value)) => Err(EngineError::validation(format!(
            "flag '{key}' cannot hold {value}"
        ))),
        None => Ok(()),
    }
}
