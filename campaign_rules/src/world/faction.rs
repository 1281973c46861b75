//! Factions and their standing toward each other.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::entities::{FactionId, LocationId, QuestId};

/// A political or social group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faction {
    pub id: FactionId,
    pub name: String,
    #[serde(default)]
    pub ideology: String,
    #[serde(default)]
    pub territory: BTreeSet<LocationId>,
    /// Signed standing toward other factions.
    #[serde(default)]
    pub relationships: BTreeMap<FactionId, i32>,
    #[serde(default)]
    pub quests: Vec<QuestId>,
    /// Player reputation before any adjustment.
    #[serde(default)]
    pub base_reputation: i32,
}

impl Faction {
    pub fn new(id: FactionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ideology: String::new(),
            territory: BTreeSet::new(),
            relationships: BTreeMap::new(),
            quests: Vec::new(),
            base_reputation: 0,
        }
    }

    pub fn standing_with(&self, other: &FactionId) -> i32 {
        self.relationships.get(other).copied().unwrap_or(0)
    }

    pub fn controls(&self, location: &LocationId) -> bool {
        self.territory.contains(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standing_defaults_to_neutral() {
        let mut wardens = Faction::new(FactionId::new("silver-wardens").unwrap(), "Silver Wardens");
        let cult = FactionId::new("spore-cult").unwrap();
        assert_eq!(wardens.standing_with(&cult), 0);

        wardens.relationships.insert(cult.clone(), -40);
        assert_eq!(wardens.standing_with(&cult), -40);
    }

    #[test]
    fn test_territory() {
        let mut wardens = Faction::new(FactionId::new("silver-wardens").unwrap(), "Silver Wardens");
        let town = LocationId::new("silverthorn").unwrap();
        wardens.territory.insert(town.clone());
        assert!(wardens.controls(&town));
        assert!(!wardens.controls(&LocationId::new("whisperwood").unwrap()));
    }
}
