//! Game mechanics: damage types, resistances, modifiers, dice, status effects.

mod dice;
mod status;

pub use dice::*;
pub use status::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::{Ability, StatusEffectId};

/// All possible damage types in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    // Physical
    Slashing,
    Piercing,
    Bludgeoning,

    // Elemental
    Fire,
    Cold,
    Lightning,
    Acid,

    // Magical
    Radiant,
    Necrotic,
    Force,
    Psychic,

    // Special
    Poison,
    /// Bypasses all resistances.
    True,
}

/// Equipment slots for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentSlot {
    Head,
    Chest,
    MainHand,
    OffHand,
    /// Occupies both hands.
    TwoHand,
    Accessory,
}

/// Resistance types for damage calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResistanceType {
    /// 2x damage.
    Vulnerable,
    /// 1x damage.
    #[default]
    Normal,
    /// 0.5x damage.
    Resistant,
    /// 0x damage.
    Immune,
}

impl ResistanceType {
    /// Get the damage multiplier for this resistance type.
    pub fn multiplier(&self) -> f32 {
        match self {
            ResistanceType::Vulnerable => 2.0,
            ResistanceType::Normal => 1.0,
            ResistanceType::Resistant => 0.5,
            ResistanceType::Immune => 0.0,
        }
    }

    /// Scale raw damage, rounding down. `True` damage should skip this entirely.
    pub fn apply(&self, damage: i32) -> i32 {
        match self {
            ResistanceType::Vulnerable => damage.saturating_mul(2),
            ResistanceType::Normal => damage,
            ResistanceType::Resistant => damage / 2,
            ResistanceType::Immune => 0,
        }
    }
}

/// Per-damage-type resistance table. Missing entries are `Normal`.
pub type Resistances = BTreeMap<DamageType, ResistanceType>;

/// Resolve the resistance a table grants against a damage type.
pub fn resistance_against(table: &Resistances, damage_type: DamageType) -> ResistanceType {
    if damage_type == DamageType::True {
        return ResistanceType::Normal;
    }
    table.get(&damage_type).copied().unwrap_or_default()
}

/// Flat numeric adjustments keyed by stat name.
///
/// Keys are either an ability key (`"strength"`, ...) or one of the
/// derived-stat constants below. Unknown keys are carried but ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(pub BTreeMap<String, i32>);

impl Modifiers {
    pub const HIT_POINTS: &'static str = "hit_points";
    pub const ARMOR_CLASS: &'static str = "armor_class";
    pub const INITIATIVE: &'static str = "initiative";
    pub const ATTACK: &'static str = "attack";
    pub const DAMAGE: &'static str = "damage";

    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, convenient for fixtures.
    pub fn with(mut self, key: impl Into<String>, value: i32) -> Self {
        *self.0.entry(key.into()).or_insert(0) += value;
        self
    }

    pub fn get(&self, key: &str) -> i32 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn ability(&self, ability: Ability) -> i32 {
        self.get(ability.key())
    }

    /// Add every entry of `other` into `self`.
    pub fn merge(&mut self, other: &Modifiers) {
        for (key, value) in &other.0 {
            *self.0.entry(key.clone()).or_insert(0) += value;
        }
    }

    /// Every entry multiplied by `factor`.
    pub fn scaled(&self, factor: i32) -> Modifiers {
        Modifiers(
            self.0
                .iter()
                .map(|(key, value)| (key.clone(), value * factor))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| *v == 0)
    }
}

impl FromIterator<(String, i32)> for Modifiers {
    fn from_iter<T: IntoIterator<Item = (String, i32)>>(iter: T) -> Self {
        let mut out = Modifiers::new();
        for (key, value) in iter {
            *out.0.entry(key).or_insert(0) += value;
        }
        out
    }
}

/// A single attack a combatant can make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackProfile {
    pub name: String,
    /// Ability that drives the to-hit and damage modifier.
    #[serde(default = "default_attack_ability")]
    pub ability: Ability,
    #[serde(default)]
    pub to_hit_bonus: i32,
    pub damage: DiceFormula,
    #[serde(default)]
    pub damage_bonus: i32,
    #[serde(default = "default_damage_type")]
    pub damage_type: DamageType,
    /// Status effects applied to the target on a hit.
    #[serde(default)]
    pub on_hit: Vec<StatusEffectId>,
}

fn default_attack_ability() -> Ability {
    Ability::Strength
}

fn default_damage_type() -> DamageType {
    DamageType::Bludgeoning
}

impl AttackProfile {
    pub fn new(name: impl Into<String>, ability: Ability, damage: DiceFormula) -> Self {
        Self {
            name: name.into(),
            ability,
            to_hit_bonus: 0,
            damage,
            damage_bonus: 0,
            damage_type: DamageType::Bludgeoning,
            on_hit: Vec::new(),
        }
    }

    pub fn with_damage_type(mut self, damage_type: DamageType) -> Self {
        self.damage_type = damage_type;
        self
    }

    pub fn with_to_hit(mut self, bonus: i32) -> Self {
        self.to_hit_bonus = bonus;
        self
    }

    pub fn with_on_hit(mut self, effect: StatusEffectId) -> Self {
        self.on_hit.push(effect);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resistance_multipliers() {
        assert_eq!(ResistanceType::Vulnerable.multiplier(), 2.0);
        assert_eq!(ResistanceType::Normal.multiplier(), 1.0);
        assert_eq!(ResistanceType::Resistant.multiplier(), 0.5);
        assert_eq!(ResistanceType::Immune.multiplier(), 0.0);
    }

    #[test]
    fn test_resistance_apply_rounds_down() {
        assert_eq!(ResistanceType::Resistant.apply(7), 3);
        assert_eq!(ResistanceType::Vulnerable.apply(7), 14);
        assert_eq!(ResistanceType::Immune.apply(7), 0);
    }

    #[test]
    fn test_true_damage_ignores_resistance() {
        let mut table = Resistances::new();
        table.insert(DamageType::True, ResistanceType::Immune);
        table.insert(DamageType::Fire, ResistanceType::Resistant);

        assert_eq!(resistance_against(&table, DamageType::True), ResistanceType::Normal);
        assert_eq!(resistance_against(&table, DamageType::Fire), ResistanceType::Resistant);
        assert_eq!(resistance_against(&table, DamageType::Cold), ResistanceType::Normal);
    }

    #[test]
    fn test_modifiers_merge_and_scale() {
        let mut mods = Modifiers::new().with(Modifiers::ARMOR_CLASS, 1);
        mods.merge(&Modifiers::new().with(Modifiers::ARMOR_CLASS, 2).with("strength", 1));

        assert_eq!(mods.get(Modifiers::ARMOR_CLASS), 3);
        assert_eq!(mods.ability(Ability::Strength), 1);
        assert_eq!(mods.get("missing"), 0);

        let tripled = mods.scaled(3);
        assert_eq!(tripled.get(Modifiers::ARMOR_CLASS), 9);
    }
}
