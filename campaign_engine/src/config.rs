//! Engine tuning, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;

use campaign_rules::{DangerLevel, DiceFormula};

use crate::error::{EngineError, EngineResult};

/// Probability that an unweighted encounter table fires, per danger level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DangerChance {
    pub safe: f64,
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for DangerChance {
    fn default() -> Self {
        Self {
            safe: 0.0,
            low: 0.2,
            medium: 0.5,
            high: 0.8,
        }
    }
}

impl DangerChance {
    pub fn for_level(&self, level: DangerLevel) -> f64 {
        match level {
            DangerLevel::Safe => self.safe,
            DangerLevel::Low => self.low,
            DangerLevel::Medium => self.medium,
            DangerLevel::High => self.high,
        }
    }
}

/// Whether older save versions are migrated or refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveVersionPolicy {
    /// Run registered migrations up to the current version.
    #[default]
    Migrate,
    /// Only the current version loads.
    Strict,
}

/// Engine-wide rule knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sides of the initiative die.
    pub initiative_die: u32,
    /// Damage multiplier on a natural 20.
    pub critical_multiplier: i32,
    /// Used when a combatant has no attack of its own.
    pub unarmed_damage: DiceFormula,
    /// Armor class granted by the defend action until the defender's next turn.
    pub defend_bonus: i32,
    pub danger_chance: DangerChance,
    /// Platform tag stamped on save files.
    pub platform: String,
    pub save_version_policy: SaveVersionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initiative_die: 20,
            critical_multiplier: 2,
            unarmed_damage: DiceFormula::new(1, 4, 0),
            defend_bonus: 2,
            danger_chance: DangerChance::default(),
            platform: "generic".to_string(),
            save_version_policy: SaveVersionPolicy::Migrate,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let config: EngineConfig =
            toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.initiative_die == 0 {
            return Err(EngineError::Config("initiative_die must be at least 1".into()));
        }
        if self.critical_multiplier < 1 {
            return Err(EngineError::Config("critical_multiplier must be at least 1".into()));
        }
        let chances = self.danger_chance;
        for (name, value) in [
            ("safe", chances.safe),
            ("low", chances.low),
            ("medium", chances.medium),
            ("high", chances.high),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "danger_chance.{name} must be within 0..=1, got {value}"
                )));
            }
        }
        Ok(())
    }
}
