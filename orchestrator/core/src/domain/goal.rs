// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Goal Aggregate
//!
//! A Goal is the top-level unit of work carried through the fixed phase graph.
//!
//! # Invariants
//!
//! - A Goal is created in [`WorkflowState::Initialization`].
//! - `phase` is only mutated by the workflow engine (`set_phase` is crate-private).
//! - Goals are never deleted by the coordination core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::workflow::WorkflowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalId(pub Uuid);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GoalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub title: String,
    pub description: String,
    phase: WorkflowState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Build a goal in `INITIALIZATION`. Input validation is the engine's job,
    /// so an empty title is representable here.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: GoalId::new(),
            title: title.into(),
            description: description.into(),
            phase: WorkflowState::Initialization,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn phase(&self) -> WorkflowState {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: WorkflowState) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    /// True when both title and description carry non-blank text.
    pub fn is_defined(&self) -> bool {
        !self.title.trim().is_empty() && !self.description.trim().is_empty()
    }
}
