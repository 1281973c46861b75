//! Ability scores, skills, saves, and level progression.

use serde::{Deserialize, Serialize};

/// The six core abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub const ALL: [Ability; 6] = [
        Ability::Strength,
        Ability::Dexterity,
        Ability::Constitution,
        Ability::Intelligence,
        Ability::Wisdom,
        Ability::Charisma,
    ];

    /// Key used in modifier tables.
    pub fn key(&self) -> &'static str {
        match self {
            Ability::Strength => "strength",
            Ability::Dexterity => "dexterity",
            Ability::Constitution => "constitution",
            Ability::Intelligence => "intelligence",
            Ability::Wisdom => "wisdom",
            Ability::Charisma => "charisma",
        }
    }
}

/// Raw ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
        }
    }
}

impl AbilityScores {
    /// Scores in the usual STR, DEX, CON, INT, WIS, CHA order.
    pub fn new(
        strength: i32,
        dexterity: i32,
        constitution: i32,
        intelligence: i32,
        wisdom: i32,
        charisma: i32,
    ) -> Self {
        Self {
            strength,
            dexterity,
            constitution,
            intelligence,
            wisdom,
            charisma,
        }
    }

    pub fn score(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn score_mut(&mut self, ability: Ability) -> &mut i32 {
        match ability {
            Ability::Strength => &mut self.strength,
            Ability::Dexterity => &mut self.dexterity,
            Ability::Constitution => &mut self.constitution,
            Ability::Intelligence => &mut self.intelligence,
            Ability::Wisdom => &mut self.wisdom,
            Ability::Charisma => &mut self.charisma,
        }
    }

    /// Calculate modifier for a given ability (D&D style, rounding down).
    pub fn modifier(&self, ability: Ability) -> i32 {
        ability_modifier(self.score(ability))
    }
}

/// `floor((score - 10) / 2)`.
pub fn ability_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

/// Proficiency bonus for a character level.
pub fn proficiency_bonus(level: u32) -> i32 {
    2 + (level.max(1) as i32 - 1) / 4
}

/// XP needed to reach each level, starting at level 2.
pub const XP_THRESHOLDS: [(u32, u32); 4] = [(2, 300), (3, 900), (4, 2700), (5, 6500)];

/// XP required to reach `level`, or `None` past the progression table.
pub fn xp_for_level(level: u32) -> Option<u32> {
    if level <= 1 {
        return Some(0);
    }
    XP_THRESHOLDS
        .iter()
        .find(|(lvl, _)| *lvl == level)
        .map(|(_, xp)| *xp)
}

/// Raise `level` while `xp` clears the next threshold. Returns the levels reached.
pub fn advance_levels(level: &mut u32, xp: u32) -> Vec<u32> {
    let mut reached = Vec::new();
    while let Some(needed) = xp_for_level(*level + 1) {
        if xp < needed {
            break;
        }
        *level += 1;
        reached.push(*level);
    }
    reached
}

/// Skills and the ability each one keys off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Acrobatics,
    AnimalHandling,
    Arcana,
    Athletics,
    Deception,
    History,
    Insight,
    Intimidation,
    Investigation,
    Medicine,
    Nature,
    Perception,
    Performance,
    Persuasion,
    Religion,
    SleightOfHand,
    Stealth,
    Survival,
}

impl Skill {
    pub fn key_ability(&self) -> Ability {
        match self {
            Skill::Athletics => Ability::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Ability::Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Ability::Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Ability::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Ability::Charisma
            }
        }
    }

    /// Key used in modifier tables.
    pub fn key(&self) -> &'static str {
        match self {
            Skill::Acrobatics => "acrobatics",
            Skill::AnimalHandling => "animal_handling",
            Skill::Arcana => "arcana",
            Skill::Athletics => "athletics",
            Skill::Deception => "deception",
            Skill::History => "history",
            Skill::Insight => "insight",
            Skill::Intimidation => "intimidation",
            Skill::Investigation => "investigation",
            Skill::Medicine => "medicine",
            Skill::Nature => "nature",
            Skill::Perception => "perception",
            Skill::Performance => "performance",
            Skill::Persuasion => "persuasion",
            Skill::Religion => "religion",
            Skill::SleightOfHand => "sleight_of_hand",
            Skill::Stealth => "stealth",
            Skill::Survival => "survival",
        }
    }
}

/// Training level in a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyTier {
    #[default]
    Untrained,
    Trained,
    Expert,
}

impl ProficiencyTier {
    /// How many times the proficiency bonus applies.
    pub fn multiplier(&self) -> i32 {
        match self {
            ProficiencyTier::Untrained => 0,
            ProficiencyTier::Trained => 1,
            ProficiencyTier::Expert => 2,
        }
    }
}

/// Saving throw categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveKind {
    Fortitude,
    Reflex,
    Will,
}

impl SaveKind {
    pub const ALL: [SaveKind; 3] = [SaveKind::Fortitude, SaveKind::Reflex, SaveKind::Will];

    pub fn ability(&self) -> Ability {
        match self {
            SaveKind::Fortitude => Ability::Constitution,
            SaveKind::Reflex => Ability::Dexterity,
            SaveKind::Will => Ability::Wisdom,
        }
    }
}

/// How many d20s a check rolls and which one it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollMode {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl RollMode {
    /// Pick the kept die. `second` is ignored for normal rolls.
    pub fn keep(&self, first: u32, second: u32) -> u32 {
        match self {
            RollMode::Normal => first,
            RollMode::Advantage => first.max(second),
            RollMode::Disadvantage => first.min(second),
        }
    }
}

/// Outcome of a d20 check against a difficulty class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub roll: u32,
    pub total: i32,
    pub dc: i32,
    pub success: bool,
    pub critical: bool,
    pub fumble: bool,
}

impl CheckResult {
    pub fn new(roll: u32, modifier: i32, dc: i32) -> Self {
        let total = roll as i32 + modifier;
        Self {
            roll,
            total,
            dc,
            success: total >= dc,
            critical: roll == 20,
            fumble: roll == 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ability_modifier() {
        let scores = AbilityScores::new(18, 14, 12, 8, 10, 16);

        assert_eq!(scores.modifier(Ability::Strength), 4);
        assert_eq!(scores.modifier(Ability::Dexterity), 2);
        assert_eq!(scores.modifier(Ability::Constitution), 1);
        assert_eq!(scores.modifier(Ability::Intelligence), -1);
        assert_eq!(scores.modifier(Ability::Wisdom), 0);
        assert_eq!(scores.modifier(Ability::Charisma), 3);
        assert_eq!(ability_modifier(9), -1);
        assert_eq!(ability_modifier(7), -2);
    }

    #[test]
    fn test_default_scores() {
        let scores = AbilityScores::default();
        assert_eq!(scores.strength, 10);
        assert_eq!(scores.modifier(Ability::Strength), 0);
    }

    #[test]
    fn test_proficiency_bonus_by_level() {
        assert_eq!(proficiency_bonus(1), 2);
        assert_eq!(proficiency_bonus(4), 2);
        assert_eq!(proficiency_bonus(5), 3);
        assert_eq!(proficiency_bonus(9), 4);
    }

    #[test]
    fn test_advance_levels() {
        let mut level = 1;
        assert!(advance_levels(&mut level, 299).is_empty());
        assert_eq!(advance_levels(&mut level, 1000), vec![2, 3]);
        assert_eq!(level, 3);
        assert_eq!(advance_levels(&mut level, 100_000), vec![4, 5]);
        assert_eq!(level, 5);
    }

    #[test]
    fn test_skill_key_abilities() {
        assert_eq!(Skill::Stealth.key_ability(), Ability::Dexterity);
        assert_eq!(Skill::Persuasion.key_ability(), Ability::Charisma);
        assert_eq!(Skill::Survival.key_ability(), Ability::Wisdom);
        assert_eq!(Skill::Athletics.key_ability(), Ability::Strength);
    }

    #[test]
    fn test_check_result_flags() {
        let result = CheckResult::new(20, -1, 25);
        assert!(result.critical);
        assert!(!result.success);

        let result = CheckResult::new(1, 10, 5);
        assert!(result.fumble);
        assert!(result.success);

        assert_eq!(RollMode::Advantage.keep(4, 17), 17);
        assert_eq!(RollMode::Disadvantage.keep(4, 17), 4);
    }
}
