//! Dialogue graph shapes.

use serde::{Deserialize, Serialize};

use super::{Condition, Effect};
use crate::entities::{Ability, RollMode, Skill};

/// One node in an NPC's dialogue graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueNode {
    pub id: String,
    /// Defaults to the owning NPC when absent.
    #[serde(default)]
    pub speaker: Option<String>,
    pub text: String,
    #[serde(default)]
    pub choices: Vec<DialogueChoice>,
    /// Applied when the node is entered.
    #[serde(default)]
    pub on_enter: Vec<Effect>,
}

impl DialogueNode {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            speaker: None,
            text: text.into(),
            choices: Vec::new(),
            on_enter: Vec::new(),
        }
    }

    pub fn with_choice(mut self, choice: DialogueChoice) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn choice(&self, id: &str) -> Option<&DialogueChoice> {
        self.choices.iter().find(|c| c.id == id)
    }
}

/// A player response. A `None` next node ends the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueChoice {
    pub id: String,
    pub text: String,
    /// Hidden unless this holds.
    #[serde(default)]
    pub condition: Option<Condition>,
    /// Optional roll made when the choice is picked.
    #[serde(default)]
    pub check: Option<ChoiceCheck>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub next: Option<String>,
    /// Used instead of `effects`/`next` when the check fails.
    #[serde(default)]
    pub failure_effects: Vec<Effect>,
    #[serde(default)]
    pub failure_next: Option<String>,
}

impl DialogueChoice {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            condition: None,
            check: None,
            effects: Vec::new(),
            next: None,
            failure_effects: Vec::new(),
            failure_next: None,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_failure_effect(mut self, effect: Effect) -> Self {
        self.failure_effects.push(effect);
        self
    }

    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn with_check(mut self, check: ChoiceCheck) -> Self {
        self.check = Some(check);
        self
    }
}

/// What a skill-gated choice rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Skill(Skill),
    Ability(Ability),
}

/// A d20 check attached to a dialogue choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceCheck {
    pub kind: CheckKind,
    pub dc: i32,
    #[serde(default)]
    pub mode: RollMode,
}
