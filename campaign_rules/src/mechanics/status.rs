//! Status effect definitions and the stacking rules shared by combat and the overworld.

use serde::{Deserialize, Serialize};

use super::Modifiers;
use crate::entities::StatusEffectId;
use crate::script::Condition;

/// How long an effect lasts once applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectDuration {
    /// Decrements once per resolved turn boundary of the bearer.
    Turns(u32),
    /// Decrements as the world clock advances.
    Minutes(u32),
    Permanent,
}

impl EffectDuration {
    /// The longer of two durations. Mismatched units keep `other`.
    fn longest(self, other: EffectDuration) -> EffectDuration {
        match (self, other) {
            (EffectDuration::Permanent, _) | (_, EffectDuration::Permanent) => {
                EffectDuration::Permanent
            }
            (EffectDuration::Turns(a), EffectDuration::Turns(b)) => EffectDuration::Turns(a.max(b)),
            (EffectDuration::Minutes(a), EffectDuration::Minutes(b)) => {
                EffectDuration::Minutes(a.max(b))
            }
            (_, other) => other,
        }
    }

    fn is_expired(&self) -> bool {
        matches!(self, EffectDuration::Turns(0) | EffectDuration::Minutes(0))
    }
}

/// What a repeat application of an already active effect does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingRule {
    /// Reset the duration; stacks stay as they are.
    #[default]
    Refresh,
    /// Add a stack up to `max_stacks` and keep the longer duration.
    Stack,
    /// Do nothing while an instance is active.
    Ignore,
}

/// Template for a status effect, as authored in content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub id: StatusEffectId,
    pub name: String,
    pub duration: EffectDuration,
    #[serde(default)]
    pub stacking: StackingRule,
    #[serde(default = "default_max_stacks")]
    pub max_stacks: u32,
    /// Applied once per stack.
    #[serde(default)]
    pub modifiers: Modifiers,
    /// Removed at the next turn boundary once this holds.
    #[serde(default)]
    pub dispel_when: Option<Condition>,
    /// Bearer skips its turns and counts as down for end-of-encounter checks.
    #[serde(default)]
    pub incapacitates: bool,
}

fn default_max_stacks() -> u32 {
    1
}

impl StatusEffect {
    pub fn new(id: StatusEffectId, name: impl Into<String>, duration: EffectDuration) -> Self {
        Self {
            id,
            name: name.into(),
            duration,
            stacking: StackingRule::Refresh,
            max_stacks: 1,
            modifiers: Modifiers::new(),
            dispel_when: None,
            incapacitates: false,
        }
    }

    pub fn with_stacking(mut self, rule: StackingRule, max_stacks: u32) -> Self {
        self.stacking = rule;
        self.max_stacks = max_stacks.max(1);
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_dispel_when(mut self, condition: Condition) -> Self {
        self.dispel_when = Some(condition);
        self
    }

    pub fn incapacitating(mut self) -> Self {
        self.incapacitates = true;
        self
    }
}

/// An applied instance of a status effect on one bearer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveStatusEffect {
    pub effect: StatusEffect,
    pub remaining: EffectDuration,
    pub stacks: u32,
    pub source: Option<String>,
}

impl ActiveStatusEffect {
    pub fn id(&self) -> &StatusEffectId {
        &self.effect.id
    }

    pub fn modifiers(&self) -> Modifiers {
        self.effect.modifiers.scaled(self.stacks as i32)
    }
}

/// Result of applying an effect to a bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOutcome {
    Applied,
    Stacked(u32),
    Refreshed,
    Ignored,
}

/// Status effects currently active on one bearer.
///
/// Holds at most one instance per effect id; repeat applications go through
/// the effect's [`StackingRule`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusEffects {
    active: Vec<ActiveStatusEffect>,
}

impl StatusEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, effect: &StatusEffect, source: Option<String>) -> StackOutcome {
        let cap = effect.max_stacks.max(1);
        if let Some(existing) = self.active.iter_mut().find(|a| a.effect.id == effect.id) {
            return match effect.stacking {
                StackingRule::Stack => {
                    existing.stacks = (existing.stacks + 1).min(cap);
                    existing.remaining = existing.remaining.longest(effect.duration);
                    StackOutcome::Stacked(existing.stacks)
                }
                StackingRule::Refresh => {
                    existing.remaining = effect.duration;
                    existing.stacks = existing.stacks.min(cap);
                    existing.source = source;
                    StackOutcome::Refreshed
                }
                StackingRule::Ignore => StackOutcome::Ignored,
            };
        }

        self.active.push(ActiveStatusEffect {
            effect: effect.clone(),
            remaining: effect.duration,
            stacks: 1,
            source,
        });
        StackOutcome::Applied
    }

    /// Decrement turn-based durations by one and drop what expired.
    pub fn tick_turn(&mut self) -> Vec<StatusEffectId> {
        for active in &mut self.active {
            if let EffectDuration::Turns(n) = &mut active.remaining {
                *n = n.saturating_sub(1);
            }
        }
        self.drain_expired()
    }

    /// Decrement time-based durations and drop what expired.
    pub fn tick_minutes(&mut self, minutes: u32) -> Vec<StatusEffectId> {
        for active in &mut self.active {
            if let EffectDuration::Minutes(n) = &mut active.remaining {
                *n = n.saturating_sub(minutes);
            }
        }
        self.drain_expired()
    }

    fn drain_expired(&mut self) -> Vec<StatusEffectId> {
        let mut expired = Vec::new();
        self.active.retain(|active| {
            if active.remaining.is_expired() {
                expired.push(active.effect.id.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn remove(&mut self, ids: &[StatusEffectId]) {
        self.active.retain(|active| !ids.contains(&active.effect.id));
    }

    pub fn get(&self, id: &str) -> Option<&ActiveStatusEffect> {
        self.active.iter().find(|a| a.effect.id.as_str() == id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn stacks_of(&self, id: &str) -> u32 {
        self.get(id).map(|a| a.stacks).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveStatusEffect> {
        self.active.iter()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Sum of every active effect's modifiers, multiplied by its stacks.
    pub fn total_modifiers(&self) -> Modifiers {
        let mut total = Modifiers::new();
        for active in &self.active {
            total.merge(&active.modifiers());
        }
        total
    }

    pub fn incapacitated(&self) -> bool {
        self.active.iter().any(|a| a.effect.incapacitates)
    }

    /// Effects carrying a dispel condition, for the engine to evaluate.
    pub fn dispel_conditions(&self) -> impl Iterator<Item = (&StatusEffectId, &Condition)> {
        self.active
            .iter()
            .filter_map(|a| a.effect.dispel_when.as_ref().map(|c| (&a.effect.id, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn poison(rule: StackingRule, cap: u32) -> StatusEffect {
        StatusEffect::new(
            StatusEffectId::new("spore-poison").unwrap(),
            "Spore Poison",
            EffectDuration::Turns(3),
        )
        .with_stacking(rule, cap)
        .with_modifiers(Modifiers::new().with(Modifiers::ATTACK, -1))
    }

    #[test]
    fn test_stack_rule_caps_at_max() {
        let effect = poison(StackingRule::Stack, 3);
        let mut effects = StatusEffects::new();
        for _ in 0..5 {
            effects.apply(&effect, None);
        }

        assert_eq!(effects.len(), 1);
        assert_eq!(effects.stacks_of("spore-poison"), 3);
        assert_eq!(effects.total_modifiers().get(Modifiers::ATTACK), -3);
    }

    #[test]
    fn test_refresh_resets_duration_single_instance() {
        let effect = poison(StackingRule::Refresh, 1);
        let mut effects = StatusEffects::new();
        assert_eq!(effects.apply(&effect, Some("wolf".into())), StackOutcome::Applied);
        effects.tick_turn();
        assert_eq!(
            effects.get("spore-poison").unwrap().remaining,
            EffectDuration::Turns(2)
        );

        assert_eq!(effects.apply(&effect, Some("wolf".into())), StackOutcome::Refreshed);
        assert_eq!(effects.len(), 1);
        assert_eq!(
            effects.get("spore-poison").unwrap().remaining,
            EffectDuration::Turns(3)
        );
    }

    #[test]
    fn test_ignore_rule_keeps_existing() {
        let effect = poison(StackingRule::Ignore, 1);
        let mut effects = StatusEffects::new();
        effects.apply(&effect, None);
        effects.tick_turn();

        assert_eq!(effects.apply(&effect, None), StackOutcome::Ignored);
        assert_eq!(
            effects.get("spore-poison").unwrap().remaining,
            EffectDuration::Turns(2)
        );
    }

    #[test]
    fn test_turn_ticks_expire() {
        let effect = poison(StackingRule::Refresh, 1);
        let mut effects = StatusEffects::new();
        effects.apply(&effect, None);

        assert!(effects.tick_turn().is_empty());
        assert!(effects.tick_turn().is_empty());
        let expired = effects.tick_turn();
        assert_eq!(expired.len(), 1);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_minutes_do_not_tick_on_turns() {
        let blessing = StatusEffect::new(
            StatusEffectId::new("shrine-blessing").unwrap(),
            "Shrine Blessing",
            EffectDuration::Minutes(60),
        );
        let mut effects = StatusEffects::new();
        effects.apply(&blessing, None);

        effects.tick_turn();
        assert!(effects.has("shrine-blessing"));
        effects.tick_minutes(30);
        assert!(effects.has("shrine-blessing"));
        effects.tick_minutes(30);
        assert!(!effects.has("shrine-blessing"));
    }

    proptest! {
        #[test]
        fn prop_stacks_never_exceed_cap(cap in 1u32..6, applications in 1usize..20) {
            let effect = poison(StackingRule::Stack, cap);
            let mut effects = StatusEffects::new();
            for _ in 0..applications {
                effects.apply(&effect, None);
            }
            prop_assert_eq!(effects.len(), 1);
            prop_assert!(effects.stacks_of("spore-poison") <= cap);
            prop_assert_eq!(effects.stacks_of("spore-poison") as usize, applications.min(cap as usize));
        }
    }
}
