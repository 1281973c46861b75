//! Creature stat blocks and their difficulty tiers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    proficiency_bonus, Ability, AbilityScores, Combatant, CreatureId, SaveKind, StatusEffectId,
};
use crate::mechanics::{
    resistance_against, AttackProfile, DamageType, Modifiers, ResistanceType, Resistances,
    StackOutcome, StatusEffect, StatusEffects,
};

/// Encounter difficulty setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Standard,
    Hard,
    Deadly,
}

impl Difficulty {
    /// Tier difficulties to try, best match first.
    fn tier_preference(&self) -> [Difficulty; 4] {
        match self {
            Difficulty::Easy => [
                Difficulty::Easy,
                Difficulty::Standard,
                Difficulty::Hard,
                Difficulty::Deadly,
            ],
            Difficulty::Standard => [
                Difficulty::Standard,
                Difficulty::Hard,
                Difficulty::Easy,
                Difficulty::Deadly,
            ],
            Difficulty::Hard => [
                Difficulty::Hard,
                Difficulty::Deadly,
                Difficulty::Standard,
                Difficulty::Easy,
            ],
            Difficulty::Deadly => [
                Difficulty::Deadly,
                Difficulty::Hard,
                Difficulty::Standard,
                Difficulty::Easy,
            ],
        }
    }
}

/// An authored alternate version of a creature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureTier {
    pub name: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub level_adjustment: i32,
    #[serde(default)]
    pub attack_adjustment: i32,
    #[serde(default)]
    pub damage_adjustment: i32,
    #[serde(default)]
    pub hit_point_adjustment: i32,
    #[serde(default)]
    pub armor_class_adjustment: i32,
}

impl CreatureTier {
    /// The implicit tier every creature has.
    pub fn base() -> Self {
        Self {
            name: "base".to_string(),
            difficulty: Difficulty::Standard,
            level_adjustment: 0,
            attack_adjustment: 0,
            damage_adjustment: 0,
            hit_point_adjustment: 0,
            armor_class_adjustment: 0,
        }
    }

    pub fn effective_level(&self, base_level: u32) -> u32 {
        (base_level as i32 + self.level_adjustment).max(1) as u32
    }

    fn as_modifiers(&self) -> Modifiers {
        Modifiers::new()
            .with(Modifiers::HIT_POINTS, self.hit_point_adjustment)
            .with(Modifiers::ARMOR_CLASS, self.armor_class_adjustment)
    }
}

/// Stats rebuilt from the stat block, tier, and active effects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreatureStats {
    pub abilities: AbilityScores,
    pub max_hit_points: i32,
    pub armor_class: i32,
    pub proficiency_bonus: i32,
    pub saves: BTreeMap<SaveKind, i32>,
    pub modifiers: Modifiers,
}

/// A creature stat block.
///
/// Content defines templates; encounters fight with spawned instances
/// (`template_id` set). Only `current_hit_points`, `is_alive`, and the
/// active effects change once an instance exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creature {
    pub id: CreatureId,
    pub name: String,
    /// Set on spawned instances.
    #[serde(default)]
    pub template_id: Option<CreatureId>,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub role: String,
    #[serde(default = "default_hit_die")]
    pub hit_die: i32,
    #[serde(rename = "armor_class", default = "default_armor_class")]
    pub base_armor_class: i32,
    #[serde(default)]
    pub abilities: AbilityScores,
    #[serde(default)]
    pub actions: Vec<AttackProfile>,
    #[serde(default)]
    pub resistances: Resistances,
    #[serde(default)]
    pub save_proficiencies: Vec<SaveKind>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub tiers: Vec<CreatureTier>,
    /// XP granted to the party when this creature is defeated.
    #[serde(default)]
    pub xp_value: u32,
    #[serde(default)]
    pub applied_tier: Option<String>,
    #[serde(default)]
    tier_modifiers: Modifiers,
    #[serde(default)]
    status_effects: StatusEffects,
    #[serde(default)]
    current_hit_points: Option<i32>,
    #[serde(default = "default_alive")]
    is_alive: bool,
    #[serde(skip)]
    derived: CreatureStats,
}

fn default_level() -> u32 {
    1
}

fn default_hit_die() -> i32 {
    6
}

fn default_armor_class() -> i32 {
    10
}

fn default_alive() -> bool {
    true
}

impl Creature {
    pub fn new(
        id: CreatureId,
        name: impl Into<String>,
        level: u32,
        hit_die: i32,
        armor_class: i32,
        abilities: AbilityScores,
    ) -> Self {
        let mut creature = Self {
            id,
            name: name.into(),
            template_id: None,
            level: level.max(1),
            role: String::new(),
            hit_die,
            base_armor_class: armor_class,
            abilities,
            actions: Vec::new(),
            resistances: Resistances::new(),
            save_proficiencies: Vec::new(),
            traits: Vec::new(),
            tiers: Vec::new(),
            xp_value: 0,
            applied_tier: None,
            tier_modifiers: Modifiers::new(),
            status_effects: StatusEffects::new(),
            current_hit_points: None,
            is_alive: true,
            derived: CreatureStats::default(),
        };
        creature.recompute();
        creature
    }

    pub fn with_action(mut self, action: AttackProfile) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_xp_value(mut self, xp: u32) -> Self {
        self.xp_value = xp;
        self
    }

    pub fn with_tier(mut self, tier: CreatureTier) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn derived(&self) -> &CreatureStats {
        &self.derived
    }

    pub fn recompute(&mut self) {
        let mut mods = self.tier_modifiers.clone();
        mods.merge(&self.status_effects.total_modifiers());

        let mut abilities = self.abilities;
        for ability in Ability::ALL {
            *abilities.score_mut(ability) += mods.ability(ability);
        }

        let prof = proficiency_bonus(self.level);
        let con = abilities.modifier(Ability::Constitution);
        let dex = abilities.modifier(Ability::Dexterity);

        let per_level = (self.hit_die / 2 + 1 + con).max(1);
        let max_hit_points = per_level * self.level.max(1) as i32 + mods.get(Modifiers::HIT_POINTS);
        let armor_class = self.base_armor_class + dex + mods.get(Modifiers::ARMOR_CLASS);

        let saves = SaveKind::ALL
            .iter()
            .map(|kind| {
                let proficient = self.save_proficiencies.contains(kind);
                (
                    *kind,
                    abilities.modifier(kind.ability()) + if proficient { prof } else { 0 },
                )
            })
            .collect();

        self.derived = CreatureStats {
            abilities,
            max_hit_points,
            armor_class,
            proficiency_bonus: prof,
            saves,
            modifiers: mods,
        };

        let current = self
            .current_hit_points
            .unwrap_or(max_hit_points)
            .min(max_hit_points);
        if current <= 0 {
            self.current_hit_points = Some(0);
            self.is_alive = false;
        } else {
            self.current_hit_points = Some(current);
        }
    }

    /// The base tier followed by `extra`, or by the creature's own tiers when `extra` is empty.
    pub fn available_tiers(&self, extra: &[CreatureTier]) -> Vec<CreatureTier> {
        let mut tiers = vec![CreatureTier::base()];
        if extra.is_empty() {
            tiers.extend(self.tiers.iter().cloned());
        } else {
            tiers.extend(extra.iter().cloned());
        }
        tiers
    }

    /// Pick the tier that best fits a difficulty, then the closest effective level.
    pub fn select_tier_for_level(
        &self,
        target_level: u32,
        difficulty: Difficulty,
        extra: &[CreatureTier],
    ) -> CreatureTier {
        let tiers = self.available_tiers(extra);
        let distance = |tier: &CreatureTier| {
            (tier.effective_level(self.level) as i64 - target_level as i64).abs()
        };

        for preferred in difficulty.tier_preference() {
            if let Some(tier) = tiers
                .iter()
                .filter(|t| t.difficulty == preferred)
                .min_by_key(|t| distance(t))
            {
                return tier.clone();
            }
        }
        tiers
            .iter()
            .min_by_key(|t| distance(t))
            .cloned()
            .unwrap_or_else(CreatureTier::base)
    }

    /// A copy with the tier applied at full health. `self` is left alone.
    pub fn apply_tier(&self, tier: &CreatureTier) -> Creature {
        let mut tiered = self.clone();
        tiered.applied_tier = Some(tier.name.clone());
        tiered.level = tier.effective_level(self.level);
        tiered.tier_modifiers = tier.as_modifiers();
        for action in &mut tiered.actions {
            action.to_hit_bonus += tier.attack_adjustment;
            action.damage_bonus += tier.damage_adjustment;
        }
        tiered.current_hit_points = None;
        tiered.recompute();
        tiered
    }

    /// A fresh, full-health instance of this template under a new id.
    pub fn spawn(&self, instance_id: CreatureId) -> Creature {
        let mut instance = self.clone();
        instance.template_id = Some(self.template_id.clone().unwrap_or_else(|| self.id.clone()));
        instance.id = instance_id;
        instance.status_effects = StatusEffects::new();
        instance.current_hit_points = None;
        instance.is_alive = true;
        instance.recompute();
        instance
    }

    /// Force a level and reset to full health, keeping tier and effects.
    pub fn set_level(&mut self, level: u32) {
        self.level = level.max(1);
        self.current_hit_points = None;
        self.recompute();
    }

    /// Take over the wounds, effects, and life state of an earlier copy of
    /// the same combatant. Hit points are clamped to this copy's maximum.
    pub fn inherit_condition(&mut self, previous: &Creature) {
        self.status_effects = previous.status_effects.clone();
        self.current_hit_points = previous.current_hit_points;
        self.is_alive = previous.is_alive;
        self.recompute();
        if !previous.is_alive {
            self.mark_dead();
        }
    }

    /// Mark as dead without going through damage. Used when an NPC wrapper is already down.
    pub fn mark_dead(&mut self) {
        self.current_hit_points = Some(0);
        self.is_alive = false;
    }

    pub fn save_modifier(&self, kind: SaveKind) -> i32 {
        self.derived.saves.get(&kind).copied().unwrap_or(0)
    }

    pub fn tick_minutes(&mut self, minutes: u32) -> Vec<StatusEffectId> {
        let expired = self.status_effects.tick_minutes(minutes);
        if !expired.is_empty() {
            self.recompute();
        }
        expired
    }
}

impl Combatant for Creature {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn armor_class(&self) -> i32 {
        self.derived.armor_class
    }

    fn current_hit_points(&self) -> i32 {
        self.current_hit_points.unwrap_or(self.derived.max_hit_points)
    }

    fn max_hit_points(&self) -> i32 {
        self.derived.max_hit_points
    }

    fn is_alive(&self) -> bool {
        self.is_alive
    }

    fn ability_modifier(&self, ability: Ability) -> i32 {
        self.derived.abilities.modifier(ability)
    }

    fn proficiency_bonus(&self) -> i32 {
        self.derived.proficiency_bonus
    }

    fn initiative_modifier(&self) -> i32 {
        self.derived.abilities.modifier(Ability::Dexterity)
            + self.derived.proficiency_bonus
            + self.derived.modifiers.get(Modifiers::INITIATIVE)
    }

    fn attack_bonus(&self) -> i32 {
        self.derived.modifiers.get(Modifiers::ATTACK)
    }

    fn damage_bonus(&self) -> i32 {
        self.derived.modifiers.get(Modifiers::DAMAGE)
    }

    fn resistance(&self, damage_type: DamageType) -> ResistanceType {
        resistance_against(&self.resistances, damage_type)
    }

    fn status_effects(&self) -> &StatusEffects {
        &self.status_effects
    }

    fn apply_status(&mut self, effect: &StatusEffect, source: Option<String>) -> StackOutcome {
        let outcome = self.status_effects.apply(effect, source);
        self.recompute();
        outcome
    }

    fn tick_turn(&mut self) -> Vec<StatusEffectId> {
        let expired = self.status_effects.tick_turn();
        if !expired.is_empty() {
            self.recompute();
        }
        expired
    }

    fn remove_statuses(&mut self, ids: &[StatusEffectId]) {
        self.status_effects.remove(ids);
        self.recompute();
    }

    fn apply_damage(&mut self, amount: i32) -> bool {
        if !self.is_alive {
            return false;
        }
        let current = (self.current_hit_points() - amount.max(0)).max(0);
        self.current_hit_points = Some(current);
        if current == 0 {
            self.is_alive = false;
            return true;
        }
        false
    }

    fn heal(&mut self, amount: i32) {
        if !self.is_alive {
            return;
        }
        let current = (self.current_hit_points() + amount.max(0)).min(self.derived.max_hit_points);
        self.current_hit_points = Some(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanics::DiceFormula;

    fn spore_wolf() -> Creature {
        Creature::new(
            CreatureId::new("spore-wolf").unwrap(),
            "Spore Wolf",
            2,
            8,
            12,
            AbilityScores::new(12, 14, 12, 3, 12, 6),
        )
        .with_action(
            AttackProfile::new("Infected Bite", Ability::Strength, DiceFormula::new(1, 6, 2))
                .with_damage_type(DamageType::Piercing),
        )
        .with_tier(CreatureTier {
            name: "alpha".into(),
            difficulty: Difficulty::Hard,
            level_adjustment: 1,
            attack_adjustment: 1,
            damage_adjustment: 2,
            hit_point_adjustment: 5,
            armor_class_adjustment: 1,
        })
    }

    #[test]
    fn test_creature_derived_stats() {
        let wolf = spore_wolf();
        // (8/2 + 1 + 1) * 2
        assert_eq!(wolf.max_hit_points(), 12);
        assert_eq!(wolf.armor_class(), 14);
        assert_eq!(wolf.initiative_modifier(), 4);
        assert_eq!(wolf.save_modifier(SaveKind::Reflex), 2);
    }

    #[test]
    fn test_select_tier_prefers_difficulty() {
        let wolf = spore_wolf();
        assert_eq!(wolf.select_tier_for_level(3, Difficulty::Hard, &[]).name, "alpha");
        assert_eq!(wolf.select_tier_for_level(3, Difficulty::Standard, &[]).name, "base");
    }

    #[test]
    fn test_apply_tier_leaves_template_untouched() {
        let wolf = spore_wolf();
        let tier = wolf.select_tier_for_level(3, Difficulty::Hard, &[]);
        let alpha = wolf.apply_tier(&tier);

        assert_eq!(alpha.level, 3);
        assert_eq!(alpha.max_hit_points(), 6 * 3 + 5);
        assert_eq!(alpha.armor_class(), 15);
        assert_eq!(alpha.actions[0].to_hit_bonus, 1);
        assert_eq!(alpha.actions[0].damage_bonus, 2);

        assert_eq!(wolf.level, 2);
        assert_eq!(wolf.actions[0].to_hit_bonus, 0);
        assert_eq!(wolf.max_hit_points(), 12);
    }

    #[test]
    fn test_spawn_instance() {
        let wolf = spore_wolf();
        let mut pup = wolf.spawn(CreatureId::new("spore-wolf-1").unwrap());
        assert_eq!(pup.template_id.as_ref().map(|id| id.as_str()), Some("spore-wolf"));
        assert!(pup.apply_damage(100));
        assert!(!pup.is_alive());
        assert!(wolf.is_alive());
    }
}
