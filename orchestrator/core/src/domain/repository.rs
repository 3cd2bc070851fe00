// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the two records the coordination core writes.
//! Interfaces live in the domain layer and are implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|----------------|
//! | `GoalRepository` | `Goal` | `InMemoryGoalRepository` |
//! | `TaskRepository` | `Task` | `InMemoryTaskRepository` |
//!
//! Each call is atomic on its own. `save` is add-and-commit; there is no
//! cross-call transaction and no row locking, so two writers racing on the
//! same record resolve last-write-wins.

use async_trait::async_trait;

use crate::domain::goal::{Goal, GoalId};
use crate::domain::task::{Task, TaskId, TaskStatus};

/// Repository interface for Goal records
#[async_trait]
pub trait GoalRepository: Send + Sync {
    /// Save goal (create or update)
    async fn save(&self, goal: &Goal) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: GoalId) -> Result<Option<Goal>, RepositoryError>;

    /// List all goals, oldest first
    async fn list_all(&self) -> Result<Vec<Goal>, RepositoryError>;
}

/// Repository interface for Task records
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Save task (create or update)
    async fn save(&self, task: &Task) -> Result<(), RepositoryError>;

    /// Persist a batch in one commit: either every task is stored or none is.
    async fn save_all(&self, tasks: &[Task]) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>, RepositoryError>;

    /// All tasks of a goal in creation order
    async fn find_by_goal(&self, goal_id: GoalId) -> Result<Vec<Task>, RepositoryError>;

    async fn find_by_goal_and_status(
        &self,
        goal_id: GoalId,
        status: TaskStatus,
    ) -> Result<Vec<Task>, RepositoryError>;

    /// Direct children of a task (one level of the sub-task tree)
    async fn find_children(&self, parent_id: TaskId) -> Result<Vec<Task>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
