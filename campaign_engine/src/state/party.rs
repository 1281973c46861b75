//! Who travels and fights with the player.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use campaign_rules::NpcId;

/// Companion slots in the order they join a fight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyRoster {
    /// `None` means the player leads.
    pub leader: Option<NpcId>,
    pub active: Vec<NpcId>,
    pub reserve: Vec<NpcId>,
    /// Pooled supplies such as rations or torches.
    pub shared_resources: BTreeMap<String, i64>,
}

impl PartyRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, npc_id: &NpcId) -> bool {
        self.active.contains(npc_id) || self.reserve.contains(npc_id)
    }

    pub fn is_active(&self, npc_id: &NpcId) -> bool {
        self.active.contains(npc_id)
    }

    /// Put `npc_id` at the end of the active or reserve slots, moving it if
    /// it already holds the other one.
    pub fn ensure_member(&mut self, npc_id: &NpcId, active: bool) {
        self.active.retain(|id| id != npc_id);
        self.reserve.retain(|id| id != npc_id);
        if active {
            self.active.push(npc_id.clone());
        } else {
            self.reserve.push(npc_id.clone());
            if self.leader.as_ref() == Some(npc_id) {
                self.leader = None;
            }
        }
    }

    /// Drop `npc_id` from every slot. Returns whether it was a member.
    pub fn remove(&mut self, npc_id: &NpcId) -> bool {
        let was_member = self.contains(npc_id);
        self.active.retain(|id| id != npc_id);
        self.reserve.retain(|id| id != npc_id);
        if self.leader.as_ref() == Some(npc_id) {
            self.leader = None;
        }
        was_member
    }

    /// First problem with the roster's shape, if any.
    pub(crate) fn shape_error(&self) -> Option<String> {
        let mut seen = Vec::new();
        for id in self.active.iter().chain(self.reserve.iter()) {
            if seen.contains(&id) {
                return Some(format!("companion '{id}' holds more than one slot"));
            }
            seen.push(id);
        }
        match &self.leader {
            Some(leader) if !self.active.contains(leader) => {
                Some(format!("leader '{leader}' is not an active companion"))
            }
            _ => None,
        }
    }
}
