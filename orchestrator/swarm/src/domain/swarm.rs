// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Roster
//!
//! The agent ids bound to the three coordination roles of a node.
//!
//! | Role | Default id | Listens on |
//! |------|------------|------------|
//! | Coordinator | `Director` | `workflow.*`, `agents.Director.task` |
//! | Decomposer | `Lyra` | `agent.Lyra.decompose`, `agents.Lyra.task` |
//! | Executor | `GPTASe` | `agents.GPTASe.task` |

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use orion_core::domain::agent::{AgentId, InvalidAgentId};
use orion_core::domain::node_config::AgentsConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmRoster {
    pub coordinator: AgentId,
    pub decomposer: AgentId,
    pub executor: AgentId,
}

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error(transparent)]
    InvalidId(#[from] InvalidAgentId),

    #[error("Agent id '{0}' is bound to more than one role")]
    DuplicateId(AgentId),
}

impl SwarmRoster {
    pub fn from_config(config: &AgentsConfig) -> Result<Self, RosterError> {
        let roster = Self {
            coordinator: AgentId::new(config.coordinator_id.as_str())?,
            decomposer: AgentId::new(config.decomposer_id.as_str())?,
            executor: AgentId::new(config.executor_id.as_str())?,
        };

        let mut seen = HashSet::new();
        for id in roster.members() {
            if !seen.insert(id) {
                return Err(RosterError::DuplicateId(id.clone()));
            }
        }
        Ok(roster)
    }

    /// Coordinator, decomposer and executor, in that order.
    pub fn members(&self) -> [&AgentId; 3] {
        [&self.coordinator, &self.decomposer, &self.executor]
    }
}
