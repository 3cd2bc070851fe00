// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Identity and Liveness Types
//!
//! Agents are addressed by a human-readable [`AgentId`] that is embedded in bus
//! topic names (`agents.<id>.task`, `agent.<id>.decompose`), so identifiers may
//! not contain `.` or whitespace.
//!
//! [`AgentHeartbeat`] is ephemeral: only the latest heartbeat per agent carries
//! meaning, older ones may be discarded by observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::task::TaskId;

/// Stable, human-readable agent identifier (e.g. `"Director"`, `"GPTASe"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Create a new AgentId with validation
    ///
    /// # Validation Rules
    /// - Must not be empty
    /// - Must not contain `.` (topic segment separator) or whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidAgentId> {
        let id = id.into();
        if id.is_empty() {
            return Err(InvalidAgentId {
                id,
                reason: "agent id cannot be empty",
            });
        }
        if id.contains('.') {
            return Err(InvalidAgentId {
                id,
                reason: "agent id cannot contain '.'",
            });
        }
        if id.chars().any(char::is_whitespace) {
            return Err(InvalidAgentId {
                id,
                reason: "agent id cannot contain whitespace",
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgentId {
    type Err = InvalidAgentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = InvalidAgentId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid agent id '{id}': {reason}")]
pub struct InvalidAgentId {
    pub id: String,
    pub reason: &'static str,
}

/// Operational status reported in heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Idle,
    Working,
    Error,
    /// Never self-reported; assigned by liveness observers when heartbeats stop.
    Stalled,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Working => "WORKING",
            Self::Error => "ERROR",
            Self::Stalled => "STALLED",
        };
        f.write_str(s)
    }
}

/// Periodic liveness announcement published on `system.heartbeat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHeartbeat {
    pub agent_id: AgentId,
    pub status: AgentStatus,
    #[serde(default)]
    pub current_task_id: Option<TaskId>,
    pub timestamp: DateTime<Utc>,
}

impl AgentHeartbeat {
    pub fn new(agent_id: AgentId, status: AgentStatus, current_task_id: Option<TaskId>) -> Self {
        Self {
            agent_id,
            status,
            current_task_id,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_validation() {
        assert!(AgentId::new("GPTASe").is_ok());
        assert!(AgentId::new("executor-1").is_ok());
        assert!(AgentId::new("").is_err());
        assert!(AgentId::new("agent.one").is_err());
        assert!(AgentId::new("two words").is_err());
    }

    #[test]
    fn test_agent_id_serde_rejects_invalid() {
        let ok: AgentId = serde_json::from_str("\"Lyra\"").unwrap();
        assert_eq!(ok.as_str(), "Lyra");
        assert!(serde_json::from_str::<AgentId>("\"bad.id\"").is_err());
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&AgentStatus::Working).unwrap();
        assert_eq!(json, "\"WORKING\"");
        assert_eq!(AgentStatus::Stalled.to_string(), "STALLED");
    }
}
