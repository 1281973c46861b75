//! Quests: ordered stages with success and failure branches.

use serde::{Deserialize, Serialize};

use crate::entities::{FactionId, NpcId, QuestId};
use crate::error::RulesError;
use crate::script::{Condition, Effect};

/// Where a quest is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    #[default]
    NotStarted,
    Active,
    Completed,
    Failed,
}

impl QuestStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, QuestStatus::Completed | QuestStatus::Failed)
    }
}

/// One stage of a quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestStage {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    /// All must hold before the stage can be resolved.
    #[serde(default)]
    pub entry_conditions: Vec<Condition>,
    #[serde(default)]
    pub success_next: Option<String>,
    #[serde(default)]
    pub failure_next: Option<String>,
    #[serde(default)]
    pub on_success: Vec<Effect>,
    #[serde(default)]
    pub on_failure: Vec<Effect>,
}

impl QuestStage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            objectives: Vec::new(),
            entry_conditions: Vec::new(),
            success_next: None,
            failure_next: None,
            on_success: Vec::new(),
            on_failure: Vec::new(),
        }
    }

    pub fn on_success(mut self, effect: Effect) -> Self {
        self.on_success.push(effect);
        self
    }

    pub fn on_failure(mut self, effect: Effect) -> Self {
        self.on_failure.push(effect);
        self
    }

    pub fn requires(mut self, condition: Condition) -> Self {
        self.entry_conditions.push(condition);
        self
    }
}

/// Another quest that must have reached a stage first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestDependency {
    pub quest_id: QuestId,
    #[serde(default)]
    pub min_stage: u32,
}

/// The outcome of resolving the current stage, computed before anything is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTransition {
    pub from: u32,
    pub to: u32,
    pub status: QuestStatus,
    /// Stage effects followed by quest rewards when the quest completes.
    pub effects: Vec<Effect>,
}

/// A quest and its progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub stages: Vec<QuestStage>,
    /// Index into `stages`. Never decreases.
    #[serde(default)]
    pub stage: u32,
    #[serde(default)]
    pub status: QuestStatus,
    /// Starts the quest automatically once it holds.
    #[serde(default)]
    pub triggers: Option<Condition>,
    /// Fails an active quest once it holds.
    #[serde(default)]
    pub fail_conditions: Option<Condition>,
    #[serde(default)]
    pub rewards: Vec<Effect>,
    #[serde(default)]
    pub related_factions: Vec<FactionId>,
    #[serde(default)]
    pub related_npcs: Vec<NpcId>,
    #[serde(default)]
    pub dependencies: Vec<QuestDependency>,
}

impl Quest {
    pub fn new(id: QuestId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            summary: String::new(),
            stages: Vec::new(),
            stage: 0,
            status: QuestStatus::NotStarted,
            triggers: None,
            fail_conditions: None,
            rewards: Vec::new(),
            related_factions: Vec::new(),
            related_npcs: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: QuestStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn current_stage(&self) -> Option<&QuestStage> {
        self.stages.get(self.stage as usize)
    }

    pub fn stage_index(&self, id: &str) -> Option<u32> {
        self.stages.iter().position(|s| s.id == id).map(|i| i as u32)
    }

    /// Mark the quest active. Restarting a finished quest is rejected.
    pub fn start(&mut self) -> Result<bool, RulesError> {
        match self.status {
            QuestStatus::NotStarted => {
                self.status = QuestStatus::Active;
                Ok(true)
            }
            QuestStatus::Active => Ok(false),
            status => Err(RulesError::invalid_action(format!(
                "quest '{}' is already {:?}",
                self.id, status
            ))),
        }
    }

    /// Work out where resolving the current stage leads.
    ///
    /// Success follows `success_next`, or the following stage when absent;
    /// moving past the last stage completes the quest. Failure follows
    /// `failure_next`, and fails the quest when there is none. A branch that
    /// points at an earlier stage is rejected.
    pub fn plan_advance(&self, success: bool) -> Result<StageTransition, RulesError> {
        if self.status != QuestStatus::Active {
            return Err(RulesError::invalid_action(format!(
                "quest '{}' is not active",
                self.id
            )));
        }
        let current = self.current_stage().ok_or_else(|| {
            RulesError::invalid_action(format!("quest '{}' has no stage {}", self.id, self.stage))
        })?;

        let branch = if success {
            &current.success_next
        } else {
            &current.failure_next
        };
        let mut effects = if success {
            current.on_success.clone()
        } else {
            current.on_failure.clone()
        };

        let (to, status) = match branch {
            Some(next) => {
                let to = self.stage_index(next).ok_or_else(|| {
                    RulesError::invalid_action(format!(
                        "quest '{}' has no stage '{next}'",
                        self.id
                    ))
                })?;
                if to < self.stage {
                    return Err(RulesError::invalid_action(format!(
                        "quest '{}' cannot move back from stage {} to {to}",
                        self.id, self.stage
                    )));
                }
                (to, QuestStatus::Active)
            }
            None if success => {
                let to = self.stage + 1;
                if to as usize >= self.stages.len() {
                    (self.stage, QuestStatus::Completed)
                } else {
                    (to, QuestStatus::Active)
                }
            }
            None => (self.stage, QuestStatus::Failed),
        };

        if status == QuestStatus::Completed {
            effects.extend(self.rewards.iter().cloned());
        }

        Ok(StageTransition {
            from: self.stage,
            to,
            status,
            effects,
        })
    }

    /// Commit a transition produced by [`Quest::plan_advance`].
    pub fn apply_transition(&mut self, transition: &StageTransition) {
        self.stage = self.stage.max(transition.to);
        self.status = transition.status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hunt() -> Quest {
        let mut stalk = QuestStage::new("stalk").on_success(Effect::set_flag("tracks-found", true));
        stalk.failure_next = Some("ambushed".into());
        let ambushed = QuestStage::new("ambushed");
        let mut slay = QuestStage::new("slay");
        slay.failure_next = Some("stalk".into());

        let mut quest = Quest::new(QuestId::new("wolf-hunt").unwrap(), "Wolf Hunt")
            .with_stage(stalk)
            .with_stage(ambushed)
            .with_stage(slay);
        quest.rewards.push(Effect::GrantXp { amount: 300 });
        quest
    }

    #[test]
    fn test_start_lifecycle() {
        let mut quest = hunt();
        assert!(quest.start().unwrap());
        assert!(!quest.start().unwrap());
        quest.status = QuestStatus::Completed;
        assert!(quest.start().is_err());
    }

    #[test]
    fn test_advance_requires_active() {
        let quest = hunt();
        assert!(quest.plan_advance(true).is_err());
    }

    #[test]
    fn test_success_walks_linearly_then_completes() {
        let mut quest = hunt();
        quest.start().unwrap();

        let step = quest.plan_advance(true).unwrap();
        assert_eq!((step.from, step.to), (0, 1));
        assert_eq!(step.effects, vec![Effect::set_flag("tracks-found", true)]);
        quest.apply_transition(&step);

        quest.apply_transition(&quest.plan_advance(true).unwrap());
        assert_eq!(quest.stage, 2);

        let last = quest.plan_advance(true).unwrap();
        assert_eq!(last.status, QuestStatus::Completed);
        assert_eq!(last.effects, vec![Effect::GrantXp { amount: 300 }]);
        quest.apply_transition(&last);
        assert_eq!(quest.stage, 2);
        assert!(quest.status.is_finished());
    }

    #[test]
    fn test_failure_branch_and_dead_end() {
        let mut quest = hunt();
        quest.start().unwrap();

        let step = quest.plan_advance(false).unwrap();
        assert_eq!(step.to, 1);
        assert_eq!(step.status, QuestStatus::Active);
        quest.apply_transition(&step);

        let step = quest.plan_advance(false).unwrap();
        assert_eq!(step.status, QuestStatus::Failed);
        assert!(step.effects.is_empty());
    }

    #[test]
    fn test_backward_branch_rejected() {
        let mut quest = hunt();
        quest.start().unwrap();
        quest.stage = 2;

        let err = quest.plan_advance(false).unwrap_err();
        assert!(err.to_string().contains("move back"));
        assert_eq!(quest.stage, 2);
    }

    proptest! {
        #[test]
        fn prop_stage_never_decreases(outcomes in prop::collection::vec(any::<bool>(), 0..12)) {
            let mut quest = hunt();
            quest.start().unwrap();
            for success in outcomes {
                let before = quest.stage;
                if let Ok(step) = quest.plan_advance(success) {
                    quest.apply_transition(&step);
                }
                prop_assert!(quest.stage >= before);
            }
        }
    }
}
