// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Entity
//!
//! Tasks are spawned under a Goal and assigned to at most one agent. Sub-task
//! trees are expressed through `parent_id` back-references into the flat task
//! store; a task never owns its children.
//!
//! ## Status Progression
//!
//! | Rank | Status |
//! |------|--------|
//! | 0 | `PENDING` |
//! | 1 | `ACTIVE` |
//! | 2 | `COMPLETED`, `FAILED` (terminal) |
//!
//! A status change is legal only towards a strictly higher rank, so a terminal
//! task never changes again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::goal::GoalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub goal_id: GoalId,
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    pub title: String,
    /// Free-form task category such as `RESEARCH` or `CODING`.
    #[serde(rename = "type")]
    pub kind: String,
    status: TaskStatus,
    #[serde(default)]
    pub assigned_to: Option<AgentId>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        goal_id: GoalId,
        title: impl Into<String>,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            goal_id,
            parent_id: None,
            title: title.into(),
            kind: kind.into(),
            status: TaskStatus::Pending,
            assigned_to: None,
            payload,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_id: TaskId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn advance_to(&mut self, next: TaskStatus) -> Result<(), TaskStatusError> {
        if !self.status.can_advance_to(next) {
            return Err(TaskStatusError::IllegalStatusTransition {
                task_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the task `ACTIVE` and record the agent that owns it.
    pub fn assign(&mut self, agent: AgentId) -> Result<(), TaskStatusError> {
        self.advance_to(TaskStatus::Active)?;
        self.assigned_to = Some(agent);
        Ok(())
    }

    /// Record a terminal outcome reported by an agent.
    pub fn record_outcome(
        &mut self,
        status: TaskStatus,
        result: serde_json::Value,
    ) -> Result<(), TaskStatusError> {
        self.advance_to(status)?;
        self.result = Some(result);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskStatusError {
    #[error("Illegal status transition for task {task_id}: {from} -> {to}")]
    IllegalStatusTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> Task {
        Task::new(GoalId::new(), "Research", "RESEARCH", json!({"description": "d"}))
    }

    #[test]
    fn test_status_is_monotonic() {
        let mut t = task();
        assert_eq!(t.status(), TaskStatus::Pending);
        t.assign(AgentId::new("GPTASe").unwrap()).unwrap();
        assert_eq!(t.status(), TaskStatus::Active);
        t.record_outcome(TaskStatus::Completed, json!({"output": "ok"})).unwrap();

        for next in [
            TaskStatus::Pending,
            TaskStatus::Active,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert!(t.advance_to(next).is_err());
        }
        assert_eq!(t.status(), TaskStatus::Completed);
    }

    #[test]
    fn test_pending_can_fail_directly() {
        let mut t = task();
        assert!(t.record_outcome(TaskStatus::Failed, json!({"error": "boom"})).is_ok());
        assert!(t.status().is_terminal());
    }

    #[test]
    fn test_assign_twice_is_rejected() {
        let mut t = task();
        let agent = AgentId::new("GPTASe").unwrap();
        t.assign(agent.clone()).unwrap();
        let err = t.assign(agent).unwrap_err();
        assert!(matches!(
            err,
            TaskStatusError::IllegalStatusTransition {
                from: TaskStatus::Active,
                to: TaskStatus::Active,
                ..
            }
        ));
    }

    #[test]
    fn test_task_serializes_kind_as_type() {
        let parent = TaskId::new();
        let t = task().with_parent(parent);
        let value = serde_json::to_value(&t).unwrap();
        assert_eq!(value["type"], "RESEARCH");
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["parent_id"], json!(parent.0.to_string()));
    }
}
