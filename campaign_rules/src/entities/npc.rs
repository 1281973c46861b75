//! NPC wrappers around optional creature stat blocks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    advance_levels, Combatant, Creature, CreatureTier, Difficulty, FactionId, LocationId, NpcId,
    QuestId,
};
use crate::script::DialogueNode;

/// How an NPC's stat block is leveled against the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcScalingProfile {
    /// Level the stat block is balanced for. Zero means the stat block's own level.
    pub base_level: u32,
    pub min_level: u32,
    pub max_level: u32,
    /// To-hit gained per level above the stat block.
    pub attack_progression: i32,
    /// Damage gained per level above the stat block.
    pub damage_progression: i32,
    pub difficulty_multipliers: BTreeMap<Difficulty, f64>,
    /// Overrides the creature's own tiers when non-empty.
    pub tiers: Vec<CreatureTier>,
}

impl Default for NpcScalingProfile {
    fn default() -> Self {
        let difficulty_multipliers = [
            (Difficulty::Easy, 0.75),
            (Difficulty::Standard, 1.0),
            (Difficulty::Hard, 1.25),
            (Difficulty::Deadly, 1.5),
        ]
        .into_iter()
        .collect();

        Self {
            base_level: 1,
            min_level: 1,
            max_level: 20,
            attack_progression: 0,
            damage_progression: 0,
            difficulty_multipliers,
            tiers: Vec::new(),
        }
    }
}

impl NpcScalingProfile {
    /// Level the stat block should fight at for this player level.
    pub fn target_level(&self, player_level: u32, difficulty: Difficulty, block_level: u32) -> u32 {
        let base = if self.base_level > 0 { self.base_level } else { block_level };
        let multiplier = self.difficulty_multipliers.get(&difficulty).copied().unwrap_or(1.0);
        let delta = player_level as i64 - base as i64;
        let adjusted = (delta as f64 * multiplier).trunc() as i64;
        let lo = self.min_level.max(1) as i64;
        let hi = (self.max_level as i64).max(lo);
        (base as i64 + adjusted).clamp(lo, hi) as u32
    }
}

/// Where an NPC is during a span of hours. Spans may wrap past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub start_hour: u8,
    pub end_hour: u8,
    pub location_id: LocationId,
    #[serde(default)]
    pub activity: String,
}

impl ScheduleEntry {
    pub fn covers(&self, hour: u8) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// A non-player character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    pub id: NpcId,
    pub name: String,
    #[serde(default)]
    pub archetype: String,
    #[serde(default)]
    pub faction_id: Option<FactionId>,
    /// Attitude toward the player.
    #[serde(default)]
    pub disposition: i32,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    #[serde(default)]
    pub dialogue: BTreeMap<String, DialogueNode>,
    /// Authored template. Never mutated by scaling.
    #[serde(default)]
    pub stat_block: Option<Creature>,
    #[serde(default)]
    pub scaling: Option<NpcScalingProfile>,
    /// Combat-ready copy carried between fights once the NPC has fought.
    #[serde(default)]
    pub combat_block: Option<Creature>,
    #[serde(default)]
    pub quest_hooks: Vec<QuestId>,
    #[serde(default = "default_alive")]
    pub is_alive: bool,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub xp: u32,
}

fn default_alive() -> bool {
    true
}

fn default_level() -> u32 {
    1
}

impl Npc {
    pub fn new(id: NpcId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            archetype: String::new(),
            faction_id: None,
            disposition: 0,
            schedule: Vec::new(),
            dialogue: BTreeMap::new(),
            stat_block: None,
            scaling: None,
            combat_block: None,
            quest_hooks: Vec::new(),
            is_alive: true,
            level: 1,
            xp: 0,
        }
    }

    pub fn with_stat_block(mut self, creature: Creature, scaling: Option<NpcScalingProfile>) -> Self {
        self.level = creature.level;
        self.stat_block = Some(creature);
        self.scaling = scaling;
        self
    }

    pub fn with_dialogue(mut self, node: DialogueNode) -> Self {
        self.dialogue.insert(node.id.clone(), node);
        self
    }

    /// A combat-ready copy of the stat block, leveled by the scaling profile if any.
    pub fn scaled_stat_block(&self, player_level: u32, difficulty: Difficulty) -> Option<Creature> {
        let template = self.stat_block.as_ref()?;

        let mut scaled = match &self.scaling {
            None => {
                let mut base = template.apply_tier(&CreatureTier::base());
                if self.level > base.level {
                    base.set_level(self.level);
                }
                base
            }
            Some(scaling) => {
                // The NPC's own progression is a floor under player-relative scaling.
                let target = scaling
                    .target_level(player_level, difficulty, template.level)
                    .max(self.level.min(scaling.max_level));
                let tier = template.select_tier_for_level(target, difficulty, &scaling.tiers);
                let mut tiered = template.apply_tier(&tier);
                let level_delta = target as i32 - tiered.level as i32;
                tiered.set_level(target);
                if level_delta != 0 {
                    for action in &mut tiered.actions {
                        action.to_hit_bonus += level_delta * scaling.attack_progression;
                        action.damage_bonus += level_delta * scaling.damage_progression;
                    }
                }
                tiered
            }
        };

        if !self.is_alive {
            scaled.mark_dead();
        }
        Some(scaled)
    }

    /// The copy that fights: freshly scaled to the current player level, still
    /// carrying the wounds and effects of earlier fights.
    pub fn combat_copy(&self, player_level: u32, difficulty: Difficulty) -> Option<Creature> {
        let mut copy = self.scaled_stat_block(player_level, difficulty)?;
        if let Some(carried) = &self.combat_block {
            copy.inherit_condition(carried);
        }
        Some(copy)
    }

    /// Keep the post-fight copy and mirror its life state.
    pub fn store_combat_result(&mut self, creature: Creature) {
        self.is_alive = creature.is_alive();
        self.combat_block = Some(creature);
    }

    /// Schedule entry in effect at `hour`.
    pub fn scheduled_entry(&self, hour: u8) -> Option<&ScheduleEntry> {
        self.schedule.iter().find(|entry| entry.covers(hour))
    }

    pub fn gain_xp(&mut self, amount: u32) -> Vec<u32> {
        self.xp = self.xp.saturating_add(amount);
        advance_levels(&mut self.level, self.xp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Ability, AbilityScores, CreatureId};
    use crate::mechanics::{AttackProfile, DiceFormula};

    fn wraith_npc() -> Npc {
        let wraith = Creature::new(
            CreatureId::new("myconid-wraith").unwrap(),
            "Myconid Wraith",
            4,
            10,
            14,
            AbilityScores::new(10, 12, 14, 8, 16, 10),
        )
        .with_action(AttackProfile::new("Spore Burst", Ability::Wisdom, DiceFormula::new(1, 8, 3)));

        let scaling = NpcScalingProfile {
            base_level: 4,
            attack_progression: 1,
            damage_progression: 1,
            ..NpcScalingProfile::default()
        };
        Npc::new(NpcId::new("grove-warden").unwrap(), "Grove Warden")
            .with_stat_block(wraith, Some(scaling))
    }

    #[test]
    fn test_scaling_never_mutates_template() {
        let npc = wraith_npc();
        let scaled = npc.scaled_stat_block(8, Difficulty::Standard).unwrap();

        assert_eq!(scaled.level, 8);
        assert_eq!(scaled.actions[0].to_hit_bonus, 4);
        assert_eq!(scaled.actions[0].damage_bonus, 4);

        let template = npc.stat_block.as_ref().unwrap();
        assert_eq!(template.level, 4);
        assert_eq!(template.actions[0].to_hit_bonus, 0);
    }

    #[test]
    fn test_difficulty_multiplier_and_clamp() {
        let profile = NpcScalingProfile {
            base_level: 4,
            max_level: 6,
            ..NpcScalingProfile::default()
        };
        assert_eq!(profile.target_level(8, Difficulty::Easy, 4), 6);
        assert_eq!(profile.target_level(6, Difficulty::Easy, 4), 5);
        assert_eq!(profile.target_level(1, Difficulty::Standard, 4), 1);
    }

    #[test]
    fn test_carried_block_rescales_with_player() {
        let mut npc = wraith_npc();
        let mut first = npc.combat_copy(4, Difficulty::Standard).unwrap();
        first.apply_damage(5);
        let wounded = first.current_hit_points();
        npc.store_combat_result(first);

        let second = npc.combat_copy(8, Difficulty::Standard).unwrap();
        assert_eq!(second.level, 8);
        assert_eq!(second.actions[0].to_hit_bonus, 4);
        assert_eq!(second.current_hit_points(), wounded);
        assert!(second.max_hit_points() > wounded + 5);
        assert!(second.is_alive());
    }

    #[test]
    fn test_npc_level_reaches_unscaled_block() {
        let mut npc = wraith_npc();
        npc.scaling = None;
        assert_eq!(npc.scaled_stat_block(1, Difficulty::Standard).unwrap().level, 4);

        npc.gain_xp(6500);
        assert_eq!(npc.level, 5);
        assert_eq!(npc.scaled_stat_block(1, Difficulty::Standard).unwrap().level, 5);
        assert_eq!(npc.stat_block.as_ref().unwrap().level, 4);
    }

    #[test]
    fn test_schedule_wraps_midnight() {
        let mut npc = wraith_npc();
        npc.schedule.push(ScheduleEntry {
            start_hour: 20,
            end_hour: 6,
            location_id: LocationId::new("whisperwood").unwrap(),
            activity: "prowl".into(),
        });

        assert!(npc.scheduled_entry(23).is_some());
        assert!(npc.scheduled_entry(3).is_some());
        assert!(npc.scheduled_entry(12).is_none());
    }

    #[test]
    fn test_combat_result_persists() {
        let mut npc = wraith_npc();
        let mut copy = npc.combat_copy(4, Difficulty::Standard).unwrap();
        copy.apply_damage(1000);
        npc.store_combat_result(copy);

        assert!(!npc.is_alive);
        let again = npc.combat_copy(4, Difficulty::Standard).unwrap();
        assert!(!again.is_alive());
        assert!(npc.stat_block.as_ref().unwrap().is_alive());
    }
}
