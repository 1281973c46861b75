//! Walking NPC dialogue graphs.
//!
//! Dialogue compiles to the same conditions and effects as quests, so a
//! choice can read a flag combat set and the other way round.

use serde::{Deserialize, Serialize};
use tracing::debug;

use campaign_rules::{CheckResult, DialogueChoice, DialogueNode, NpcId, WorldClock};

use crate::error::{EngineError, EngineResult};
use crate::state::GameState;

/// Where the open conversation stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueCursor {
    pub npc_id: NpcId,
    pub node_id: String,
}

/// One picked choice, as remembered by the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub npc_id: NpcId,
    pub node_id: String,
    pub choice_id: String,
    pub speaker: String,
    pub text: String,
    #[serde(default)]
    pub check: Option<CheckResult>,
    pub at: WorldClock,
}

/// Result of [`GameState::choose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOutcome {
    pub check: Option<CheckResult>,
    /// Node the cursor moved to. `None` when the conversation ended.
    pub next: Option<String>,
}

impl GameState {
    /// Open a conversation at `node_id`, applying the node's entry effects.
    pub fn start_dialogue(&mut self, npc_id: &NpcId, node_id: &str) -> EngineResult<()> {
        self.transact("start_dialogue", |state| state.open_dialogue_inner(npc_id, node_id))
    }

    pub fn end_dialogue(&mut self) {
        if let Some(cursor) = self.active_dialogue.take() {
            debug!(npc = %cursor.npc_id, node = %cursor.node_id, "dialogue closed");
        }
    }

    pub fn current_dialogue_node(&self) -> Option<&DialogueNode> {
        let cursor = self.active_dialogue.as_ref()?;
        self.npcs.get(&cursor.npc_id)?.dialogue.get(&cursor.node_id)
    }

    /// Choices at the current node whose conditions hold, in authored order.
    pub fn available_choices(&self) -> EngineResult<Vec<&DialogueChoice>> {
        let node = self
            .current_dialogue_node()
            .ok_or_else(|| EngineError::invalid_action("no dialogue is open"))?;
        let mut open = Vec::new();
        for choice in &node.choices {
            let shown = match &choice.condition {
                Some(condition) => self.evaluate(condition)?,
                None => true,
            };
            if shown {
                open.push(choice);
            }
        }
        Ok(open)
    }

    /// Pick a choice at the current node.
    ///
    /// Rolls the choice's check if it has one, applies the matching effects,
    /// records a transcript entry, then follows the matching branch unless an
    /// effect already moved the conversation elsewhere.
    pub fn choose(&mut self, choice_id: &str) -> EngineResult<ChoiceOutcome> {
        self.transact("choose", |state| state.choose_inner(choice_id))
    }

    fn choose_inner(&mut self, choice_id: &str) -> EngineResult<ChoiceOutcome> {
        let cursor = self
            .active_dialogue
            .clone()
            .ok_or_else(|| EngineError::invalid_action("no dialogue is open"))?;
        let npc = self
            .npcs
            .get(&cursor.npc_id)
            .ok_or_else(|| EngineError::validation(format!("unknown npc '{}'", cursor.npc_id)))?;
        let node = npc.dialogue.get(&cursor.node_id).ok_or_else(|| {
            EngineError::validation(format!("unknown dialogue node '{}'", cursor.node_id))
        })?;
        let speaker = node.speaker.clone().unwrap_or_else(|| npc.name.clone());
        let choice = node
            .choice(choice_id)
            .cloned()
            .ok_or_else(|| EngineError::invalid_action(format!("no choice '{choice_id}' here")))?;

        if let Some(condition) = &choice.condition {
            if !self.evaluate(condition)? {
                return Err(EngineError::invalid_action(format!(
                    "choice '{choice_id}' is not available"
                )));
            }
        }

        let check = choice
            .check
            .map(|check| self.roll_check(check.kind, check.dc, check.mode));
        let passed = check.map_or(true, |result| result.success);
        let (effects, next) = if passed {
            (&choice.effects, choice.next.as_ref())
        } else {
            (
                &choice.failure_effects,
                choice.failure_next.as_ref().or(choice.next.as_ref()),
            )
        };

        self.transcript.push(TranscriptEntry {
            npc_id: cursor.npc_id.clone(),
            node_id: cursor.node_id.clone(),
            choice_id: choice.id.clone(),
            speaker,
            text: choice.text.clone(),
            check,
            at: self.clock,
        });
        debug!(npc = %cursor.npc_id, choice = choice_id, passed, "dialogue choice");

        self.apply_effects(effects)?;

        if self.active_dialogue.as_ref() == Some(&cursor) {
            match next {
                Some(node_id) => self.open_dialogue_inner(&cursor.npc_id, node_id)?,
                None => self.end_dialogue(),
            }
        }

        Ok(ChoiceOutcome {
            check,
            next: self.active_dialogue.as_ref().map(|c| c.node_id.clone()),
        })
    }

    pub(crate) fn open_dialogue_inner(&mut self, npc_id: &NpcId, node_id: &str) -> EngineResult<()> {
        if self.active_encounter.is_some() {
            return Err(EngineError::invalid_action("cannot talk during an encounter"));
        }
        let npc = self
            .npcs
            .get(npc_id)
            .ok_or_else(|| EngineError::validation(format!("unknown npc '{npc_id}'")))?;
        if !npc.is_alive {
            return Err(EngineError::invalid_action(format!("'{npc_id}' cannot talk")));
        }
        let on_enter = npc
            .dialogue
            .get(node_id)
            .map(|node| node.on_enter.clone())
            .ok_or_else(|| {
                EngineError::validation(format!("npc '{npc_id}' has no dialogue node '{node_id}'"))
            })?;

        self.active_dialogue = Some(DialogueCursor {
            npc_id: npc_id.clone(),
            node_id: node_id.to_string(),
        });
        debug!(npc = %npc_id, node = node_id, "dialogue node entered");
        self.apply_effects(&on_enter)
    }
}
