//! Errors raised by entity-level rules.

use thiserror::Error;

/// Failures that can be detected on a single entity without consulting the world.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    /// An id is not lowercase kebab-case.
    #[error("invalid id '{0}': ids must be lowercase kebab-case")]
    InvalidId(String),

    /// A level, ability, or class prerequisite is not met.
    #[error("requirement not met: {0}")]
    Requirement(String),

    /// The entity cannot perform the requested action in its current shape.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// A dice expression could not be parsed.
    #[error("invalid dice formula '{0}'")]
    DiceFormula(String),
}

impl RulesError {
    pub fn requirement(msg: impl Into<String>) -> Self {
        Self::Requirement(msg.into())
    }

    pub fn invalid_action(msg: impl Into<String>) -> Self {
        Self::InvalidAction(msg.into())
    }
}
