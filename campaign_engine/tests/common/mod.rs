#![allow(dead_code)]

use std::str::FromStr;

use campaign_engine::content::seed;
use campaign_engine::{CombatAction, EncounterSummary, EngineConfig, GameState, Side};

/// Parse a content id, panicking on typos in the test itself.
pub fn id<T>(raw: &str) -> T
where
    T: FromStr,
    T::Err: std::fmt::Debug,
{
    raw.parse().unwrap()
}

/// The starter world with a level 20 player, so fights end the same way every run.
pub fn sturdy_state(seed: u64) -> GameState {
    let mut pack = seed::starter_pack().unwrap();
    pack.player = pack.player.map(|pc| pc.with_level(20));
    pack.into_state(seed, EngineConfig::default()).unwrap()
}

/// Drive the active encounter to its end. The player attacks the first
/// standing hostile; everyone else plays on their own.
pub fn fight_out(state: &mut GameState, max_turns: usize) -> Option<EncounterSummary> {
    for _ in 0..max_turns {
        let reports = state.run_ai_turns().unwrap();
        if let Some(summary) = reports.iter().find_map(|r| r.resolution.clone()) {
            return Some(summary);
        }
        let encounter = state.active_encounter()?;
        let target = encounter
            .side(Side::Hostile)
            .find(|p| !p.fled && state.combatant(&p.combatant).is_some_and(|c| c.is_alive()))?
            .combatant
            .clone();
        let report = state.submit_action(CombatAction::attack(target)).unwrap();
        if report.resolution.is_some() {
            return report.resolution;
        }
    }
    None
}
