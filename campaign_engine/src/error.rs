//! Engine error taxonomy.

use campaign_rules::RulesError;
use thiserror::Error;

/// Failures surfaced by the world state, evaluator, combat resolver, and content loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// No connection exists, or its travel condition does not hold.
    #[error("cannot travel from '{from}' to '{to}': {reason}")]
    InvalidTravelEdge {
        from: String,
        to: String,
        reason: String,
    },

    /// The action is illegal for the actor's current state.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// A condition refers to something the world does not contain.
    #[error("condition references unknown {reference}")]
    ConditionEvaluation { reference: String },

    /// Content or an effect refers to a nonexistent id, or is malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn invalid_action(msg: impl Into<String>) -> Self {
        Self::InvalidAction(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn unknown(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::ConditionEvaluation {
            reference: format!("{kind} '{id}'"),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_errors_convert() {
        let err: EngineError = RulesError::invalid_action("not equipment").into();
        assert_eq!(err.to_string(), "invalid action: not equipment");
    }

    #[test]
    fn test_unknown_reference_message() {
        let err = EngineError::unknown("faction", "spore-cult");
        assert_eq!(err.to_string(), "condition references unknown faction 'spore-cult'");
    }
}
