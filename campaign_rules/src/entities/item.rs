//! Items, equipment, consumables, and inventories.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Ability, ItemId, StatusEffectId};
use crate::error::RulesError;
use crate::mechanics::{AttackProfile, EquipmentSlot, Modifiers};

/// An item definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default = "default_rarity")]
    pub rarity: String,
    #[serde(default)]
    pub value: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub kind: ItemKind,
}

fn default_rarity() -> String {
    "common".to_string()
}

/// What an item does beyond sitting in a pack.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Generic,
    Equipment(Equipment),
    Consumable(Consumable),
}

impl Item {
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            rarity: default_rarity(),
            value: 0,
            tags: Vec::new(),
            kind: ItemKind::Generic,
        }
    }

    pub fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn as_equipment(&self) -> Option<&Equipment> {
        match &self.kind {
            ItemKind::Equipment(equipment) => Some(equipment),
            _ => None,
        }
    }

    pub fn as_consumable(&self) -> Option<&Consumable> {
        match &self.kind {
            ItemKind::Consumable(consumable) => Some(consumable),
            _ => None,
        }
    }
}

/// Wearable or wieldable gear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub slot: EquipmentSlot,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub requirements: EquipRequirements,
    /// Also marks the item as unfit for the off hand.
    #[serde(default)]
    pub two_handed: bool,
    /// Weapons carry the attack they grant.
    #[serde(default)]
    pub attack: Option<AttackProfile>,
}

impl Equipment {
    pub fn new(slot: EquipmentSlot) -> Self {
        Self {
            slot,
            modifiers: Modifiers::new(),
            requirements: EquipRequirements::default(),
            two_handed: slot == EquipmentSlot::TwoHand,
            attack: None,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_attack(mut self, attack: AttackProfile) -> Self {
        self.attack = Some(attack);
        self
    }

    pub fn with_requirements(mut self, requirements: EquipRequirements) -> Self {
        self.requirements = requirements;
        self
    }
}

/// Prerequisites checked when equipping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EquipRequirements {
    pub level: Option<u32>,
    pub abilities: BTreeMap<Ability, i32>,
    /// Class ids allowed to use the item. Empty means any class.
    pub classes: Vec<String>,
}

/// Single-use or charged items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumable {
    pub effect: ConsumableEffect,
    #[serde(default = "default_charges")]
    pub charges: u32,
    #[serde(default = "default_usable_in_combat")]
    pub usable_in_combat: bool,
}

fn default_charges() -> u32 {
    1
}

fn default_usable_in_combat() -> bool {
    true
}

impl Consumable {
    pub fn new(effect: ConsumableEffect) -> Self {
        Self {
            effect,
            charges: 1,
            usable_in_combat: true,
        }
    }
}

/// What using a consumable does to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumableEffect {
    Heal(i32),
    ApplyStatus(StatusEffectId),
}

/// One line in an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item_id: ItemId,
    pub quantity: u32,
    /// Charges left on the unit in use. `None` means untouched.
    #[serde(default)]
    pub charges_left: Option<u32>,
}

/// Item stacks held by a character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    entries: Vec<InventoryEntry>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item_id: &ItemId, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.entries.iter_mut().find(|e| &e.item_id == item_id) {
            Some(entry) => entry.quantity += quantity,
            None => self.entries.push(InventoryEntry {
                item_id: item_id.clone(),
                quantity,
                charges_left: None,
            }),
        }
    }

    /// Remove `quantity` units, failing without change if fewer are held.
    pub fn remove(&mut self, item_id: &ItemId, quantity: u32) -> Result<(), RulesError> {
        let held = self.quantity_of(item_id.as_str());
        if held < quantity {
            return Err(RulesError::invalid_action(format!(
                "cannot remove {quantity} of '{item_id}', only {held} held"
            )));
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.item_id == item_id) {
            entry.quantity -= quantity;
        }
        self.entries.retain(|e| e.quantity > 0);
        Ok(())
    }

    pub fn quantity_of(&self, item_id: &str) -> u32 {
        self.entries
            .iter()
            .find(|e| e.item_id.as_str() == item_id)
            .map(|e| e.quantity)
            .unwrap_or(0)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.quantity_of(item_id) > 0
    }

    /// Spend one charge. The last charge of a unit uses the unit up.
    ///
    /// Returns true when a unit was removed.
    pub fn consume_charge(&mut self, item_id: &ItemId, max_charges: u32) -> Result<bool, RulesError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| &e.item_id == item_id && e.quantity > 0)
            .ok_or_else(|| RulesError::invalid_action(format!("'{item_id}' is not in the inventory")))?;

        let left = entry.charges_left.unwrap_or(max_charges.max(1)).saturating_sub(1);
        if left == 0 {
            entry.quantity -= 1;
            entry.charges_left = None;
            self.entries.retain(|e| e.quantity > 0);
            Ok(true)
        } else {
            entry.charges_left = Some(left);
            Ok(false)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
