//! The player character and the build choices that shape it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{
    advance_levels, proficiency_bonus, Ability, AbilityScores, Combatant, FactionId, Inventory,
    Item, PlayerId, ProficiencyTier, SaveKind, Skill, StatusEffectId,
};
use crate::error::RulesError;
use crate::mechanics::{
    resistance_against, AttackProfile, DamageType, EquipmentSlot, Modifiers, ResistanceType,
    Resistances, StackOutcome, StatusEffect, StatusEffects,
};

/// Ancestry choice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Race {
    pub id: String,
    pub name: String,
    /// Flat bonuses, ability keys included.
    #[serde(default)]
    pub bonuses: Modifiers,
    #[serde(default)]
    pub traits: Vec<String>,
}

/// Class choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterClass {
    pub id: String,
    pub name: String,
    #[serde(default = "default_hit_die")]
    pub hit_die: i32,
    #[serde(default)]
    pub save_proficiencies: Vec<SaveKind>,
    #[serde(default)]
    pub bonuses: Modifiers,
}

fn default_hit_die() -> i32 {
    6
}

impl Default for CharacterClass {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            hit_die: default_hit_die(),
            save_proficiencies: Vec::new(),
            bonuses: Modifiers::new(),
        }
    }
}

/// Whether a feat may be taken more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatStacking {
    #[default]
    Unique,
    Stackable,
}

/// A feat with its prerequisites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feat {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub required_level: Option<u32>,
    #[serde(default)]
    pub required_abilities: BTreeMap<Ability, i32>,
    #[serde(default)]
    pub required_classes: Vec<String>,
    #[serde(default)]
    pub stacking: FeatStacking,
}

/// Stats derived from base scores, build, gear, and active effects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DerivedStats {
    pub abilities: AbilityScores,
    pub max_hit_points: i32,
    pub armor_class: i32,
    pub initiative: i32,
    pub proficiency_bonus: i32,
    pub saves: BTreeMap<SaveKind, i32>,
    /// Everything that fed into the numbers above.
    pub modifiers: Modifiers,
}

/// The player character.
///
/// Derived stats are never persisted; they are rebuilt by [`PlayerCharacter::recompute`]
/// after every change to their inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCharacter {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub background: String,
    pub base_abilities: AbilityScores,
    #[serde(default)]
    pub skills: BTreeMap<Skill, ProficiencyTier>,
    #[serde(default)]
    pub race: Race,
    #[serde(default)]
    pub class: CharacterClass,
    #[serde(default)]
    feats: Vec<Feat>,
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default)]
    equipment: BTreeMap<EquipmentSlot, Item>,
    #[serde(default)]
    pub resistances: Resistances,
    #[serde(default)]
    status_effects: StatusEffects,
    #[serde(default = "default_level")]
    level: u32,
    #[serde(default)]
    xp: u32,
    /// `None` until first recompute, then always set.
    #[serde(default)]
    current_hit_points: Option<i32>,
    #[serde(default = "default_alive")]
    is_alive: bool,
    /// Faction id -> reputation score.
    #[serde(default)]
    pub reputation: BTreeMap<FactionId, i32>,
    #[serde(default)]
    pub quest_flags: BTreeSet<String>,
    #[serde(skip)]
    derived: DerivedStats,
}

fn default_level() -> u32 {
    1
}

fn default_alive() -> bool {
    true
}

impl PlayerCharacter {
    /// Create a level 1 character at full health.
    pub fn new(
        id: PlayerId,
        name: impl Into<String>,
        base_abilities: AbilityScores,
        race: Race,
        class: CharacterClass,
    ) -> Self {
        let mut pc = Self {
            id,
            name: name.into(),
            background: String::new(),
            base_abilities,
            skills: BTreeMap::new(),
            race,
            class,
            feats: Vec::new(),
            inventory: Inventory::new(),
            equipment: BTreeMap::new(),
            resistances: Resistances::new(),
            status_effects: StatusEffects::new(),
            level: 1,
            xp: 0,
            current_hit_points: None,
            is_alive: true,
            reputation: BTreeMap::new(),
            quest_flags: BTreeSet::new(),
            derived: DerivedStats::default(),
        };
        pc.recompute();
        pc
    }

    pub fn with_skill(mut self, skill: Skill, tier: ProficiencyTier) -> Self {
        self.skills.insert(skill, tier);
        self
    }

    /// Set the level directly and restore full health. Meant for fixtures and content.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.max(1);
        self.current_hit_points = None;
        self.recompute();
        self
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn xp(&self) -> u32 {
        self.xp
    }

    pub fn derived(&self) -> &DerivedStats {
        &self.derived
    }

    pub fn feats(&self) -> &[Feat] {
        &self.feats
    }

    pub fn equipment(&self) -> &BTreeMap<EquipmentSlot, Item> {
        &self.equipment
    }

    fn collect_modifiers(&self) -> Modifiers {
        let mut mods = Modifiers::new();
        mods.merge(&self.race.bonuses);
        mods.merge(&self.class.bonuses);
        for feat in &self.feats {
            mods.merge(&feat.modifiers);
        }
        for item in self.equipment.values() {
            if let Some(equipment) = item.as_equipment() {
                mods.merge(&equipment.modifiers);
            }
        }
        mods.merge(&self.status_effects.total_modifiers());
        mods
    }

    /// Rebuild derived stats from base scores, build, equipment, and effects.
    pub fn recompute(&mut self) {
        let mods = self.collect_modifiers();

        let mut abilities = self.base_abilities;
        for ability in Ability::ALL {
            *abilities.score_mut(ability) += mods.ability(ability);
        }

        let prof = proficiency_bonus(self.level);
        let con = abilities.modifier(Ability::Constitution);
        let dex = abilities.modifier(Ability::Dexterity);

        let max_hit_points = self.level as i32 * (self.class.hit_die + con).max(1)
            + mods.get(Modifiers::HIT_POINTS);
        let armor_class = 10 + dex + mods.get(Modifiers::ARMOR_CLASS);
        let initiative = dex + prof + mods.get(Modifiers::INITIATIVE);

        let saves = SaveKind::ALL
            .iter()
            .map(|kind| {
                let proficient = self.class.save_proficiencies.contains(kind);
                let value = abilities.modifier(kind.ability())
                    + if proficient { prof } else { 0 }
                    + mods.get(save_key(*kind));
                (*kind, value)
            })
            .collect();

        self.derived = DerivedStats {
            abilities,
            max_hit_points,
            armor_class,
            initiative,
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

    pub fn ability_score(&self, ability: Ability) -> i32 {
        self.derived.abilities.score(ability)
    }

    pub fn skill_tier(&self, skill: Skill) -> ProficiencyTier {
        self.skills.get(&skill).copied().unwrap_or_default()
    }

    pub fn skill_modifier(&self, skill: Skill) -> i32 {
        self.derived.abilities.modifier(skill.key_ability())
            + self.skill_tier(skill).multiplier() * self.derived.proficiency_bonus
            + self.derived.modifiers.get(skill.key())
    }

    pub fn save_modifier(&self, kind: SaveKind) -> i32 {
        self.derived.saves.get(&kind).copied().unwrap_or(0)
    }

    pub fn reputation_with(&self, faction: &str) -> i32 {
        self.reputation.get(faction).copied().unwrap_or(0)
    }

    /// Take a feat after checking prerequisites and its stacking rule.
    pub fn add_feat(&mut self, feat: Feat) -> Result<(), RulesError> {
        if let Some(level) = feat.required_level {
            if self.level < level {
                return Err(RulesError::requirement(format!(
                    "{} requires level {level}",
                    feat.name
                )));
            }
        }
        for (ability, minimum) in &feat.required_abilities {
            let score = self.ability_score(*ability);
            if score < *minimum {
                return Err(RulesError::requirement(format!(
                    "{} requires {} {minimum} (has {score})",
                    feat.name,
                    ability.key()
                )));
            }
        }
        if !feat.required_classes.is_empty() && !feat.required_classes.contains(&self.class.id) {
            return Err(RulesError::requirement(format!(
                "{} requires one of classes: {}",
                feat.name,
                feat.required_classes.join(", ")
            )));
        }
        if feat.stacking == FeatStacking::Unique && self.feats.iter().any(|f| f.id == feat.id) {
            return Err(RulesError::requirement(format!(
                "{} can only be taken once",
                feat.name
            )));
        }

        self.feats.push(feat);
        self.recompute();
        Ok(())
    }

    /// Equip an item, returning whatever previously occupied its slot.
    pub fn equip(&mut self, item: Item) -> Result<Option<Item>, RulesError> {
        let equipment = item
            .as_equipment()
            .ok_or_else(|| RulesError::invalid_action(format!("'{}' is not equipment", item.id)))?;

        let reqs = &equipment.requirements;
        if let Some(level) = reqs.level {
            if self.level < level {
                return Err(RulesError::requirement(format!(
                    "{} requires level {level}",
                    item.name
                )));
            }
        }
        for (ability, minimum) in &reqs.abilities {
            let score = self.ability_score(*ability);
            if score < *minimum {
                return Err(RulesError::requirement(format!(
                    "{} requires {} {minimum} (has {score})",
                    item.name,
                    ability.key()
                )));
            }
        }
        if !reqs.classes.is_empty() && !reqs.classes.contains(&self.class.id) {
            return Err(RulesError::requirement(format!(
                "{} requires class in {}",
                item.name,
                reqs.classes.join(", ")
            )));
        }

        let occupied = |slot| self.equipment.contains_key(&slot);
        match equipment.slot {
            EquipmentSlot::TwoHand => {
                if occupied(EquipmentSlot::MainHand) || occupied(EquipmentSlot::OffHand) {
                    return Err(RulesError::invalid_action(
                        "cannot equip a two-handed item while hands are occupied",
                    ));
                }
            }
            EquipmentSlot::MainHand => {
                if occupied(EquipmentSlot::TwoHand) {
                    return Err(RulesError::invalid_action(
                        "cannot equip a main-hand item while using a two-handed weapon",
                    ));
                }
            }
            EquipmentSlot::OffHand => {
                if occupied(EquipmentSlot::TwoHand) {
                    return Err(RulesError::invalid_action(
                        "cannot equip an off-hand item while using a two-handed weapon",
                    ));
                }
                if equipment.two_handed {
                    return Err(RulesError::invalid_action("off-hand items cannot be two-handed"));
                }
            }
            _ => {}
        }

        let slot = equipment.slot;
        let previous = self.equipment.insert(slot, item);
        self.recompute();
        Ok(previous)
    }

    pub fn unequip(&mut self, slot: EquipmentSlot) -> Option<Item> {
        let removed = self.equipment.remove(&slot);
        self.recompute();
        removed
    }

    /// Attacks granted by wielded weapons, main hand first.
    pub fn attack_profiles(&self) -> Vec<AttackProfile> {
        [
            EquipmentSlot::TwoHand,
            EquipmentSlot::MainHand,
            EquipmentSlot::OffHand,
        ]
        .iter()
        .filter_map(|slot| self.equipment.get(slot))
        .filter_map(|item| item.as_equipment().and_then(|e| e.attack.clone()))
        .collect()
    }

    /// Add XP and level up as thresholds are crossed. Returns the levels reached.
    pub fn gain_xp(&mut self, amount: u32) -> Vec<u32> {
        self.xp = self.xp.saturating_add(amount);
        let before = self.derived.max_hit_points;
        let reached = advance_levels(&mut self.level, self.xp);
        if !reached.is_empty() {
            self.recompute();
            let gained = self.derived.max_hit_points - before;
            if self.is_alive && gained > 0 {
                self.heal(gained);
            }
        }
        reached
    }
}

fn save_key(kind: SaveKind) -> &'static str {
    match kind {
        SaveKind::Fortitude => "fortitude",
        SaveKind::Reflex => "reflex",
        SaveKind::Will => "will",
    }
}

impl Combatant for PlayerCharacter {
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
        self.derived.initiative
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

impl PlayerCharacter {
    /// Tick time-based effects as the world clock moves.
    pub fn tick_minutes(&mut self, minutes: u32) -> Vec<StatusEffectId> {
        let expired = self.status_effects.tick_minutes(minutes);
        if !expired.is_empty() {
            self.recompute();
        }
        expired
    }
}
