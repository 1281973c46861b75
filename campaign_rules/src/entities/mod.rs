//! Entity definitions for the game world.

mod abilities;
mod creature;
mod item;
mod npc;
mod player;

pub use abilities::*;
pub use creature::*;
pub use item::*;
pub use npc::*;
pub use player::*;

use serde::{Deserialize, Serialize};

use crate::error::RulesError;
use crate::mechanics::{DamageType, ResistanceType, StackOutcome, StatusEffect, StatusEffects};

/// Returns true when `raw` is a lowercase kebab-case slug such as `spore-wolf-pack`.
pub fn is_kebab_case(raw: &str) -> bool {
    !raw.is_empty()
        && !raw.starts_with('-')
        && !raw.ends_with('-')
        && !raw.contains("--")
        && raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

macro_rules! content_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create an id, rejecting anything that is not kebab-case.
            pub fn new(raw: impl Into<String>) -> Result<Self, RulesError> {
                let raw = raw.into();
                if is_kebab_case(&raw) {
                    Ok(Self(raw))
                } else {
                    Err(RulesError::InvalidId(raw))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = RulesError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = RulesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

content_id!(
    /// Identifier of a location node in the travel graph.
    LocationId
);
content_id!(
    /// Identifier of a faction.
    FactionId
);
content_id!(
    /// Identifier of an NPC wrapper.
    NpcId
);
content_id!(
    /// Identifier of a creature template or a spawned creature instance.
    CreatureId
);
content_id!(
    /// Identifier of a quest.
    QuestId
);
content_id!(
    /// Identifier of an item definition.
    ItemId
);
content_id!(
    /// Identifier of a status effect definition.
    StatusEffectId
);
content_id!(
    /// Identifier of an encounter table entry.
    EncounterTableId
);
content_id!(
    /// Identifier of the player character.
    PlayerId
);

/// Types of entities in the game world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Player,
    Npc,
    Creature,
    Faction,
    Location,
    Quest,
    Item,
    StatusEffect,
}

/// Anything that can stand in an encounter.
///
/// Implemented by [`PlayerCharacter`] and [`Creature`]; NPCs fight through
/// their derived creature copy.
pub trait Combatant {
    fn display_name(&self) -> &str;
    fn armor_class(&self) -> i32;
    fn current_hit_points(&self) -> i32;
    fn max_hit_points(&self) -> i32;
    fn is_alive(&self) -> bool;
    fn ability_modifier(&self, ability: Ability) -> i32;
    fn proficiency_bonus(&self) -> i32;
    fn initiative_modifier(&self) -> i32;
    /// Flat bonus to attack rolls from equipment, feats, and effects.
    fn attack_bonus(&self) -> i32;
    /// Flat bonus to damage from equipment, feats, and effects.
    fn damage_bonus(&self) -> i32;
    fn resistance(&self, damage_type: DamageType) -> ResistanceType;
    fn status_effects(&self) -> &StatusEffects;

    /// Apply a status effect through the shared stacking rules and recompute derived stats.
    fn apply_status(&mut self, effect: &StatusEffect, source: Option<String>) -> StackOutcome;
    /// Advance turn-based durations by one boundary, returning expired effect ids.
    fn tick_turn(&mut self) -> Vec<StatusEffectId>;
    fn remove_statuses(&mut self, ids: &[StatusEffectId]);
    /// Returns true if the damage dropped the combatant.
    fn apply_damage(&mut self, amount: i32) -> bool;
    fn heal(&mut self, amount: i32);

    /// Alive and not held down by an incapacitating effect.
    fn is_conscious(&self) -> bool {
        self.is_alive() && !self.status_effects().incapacitated()
    }
}
