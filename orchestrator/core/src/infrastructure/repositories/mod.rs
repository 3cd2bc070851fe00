// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository contracts defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve goals and tasks
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemoryGoalRepository** - Thread-safe map of goals
//! - **InMemoryTaskRepository** - Flat task store with per-goal creation order
//!
//! Both are ephemeral: state is lost when the process exits. A relational
//! store plugs in by implementing the same traits.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::goal::{Goal, GoalId};
use crate::domain::repository::{GoalRepository, RepositoryError, TaskRepository};
use crate::domain::task::{Task, TaskId, TaskStatus};

#[derive(Clone, Default)]
pub struct InMemoryGoalRepository {
    goals: Arc<RwLock<HashMap<GoalId, Goal>>>,
}

impl InMemoryGoalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GoalRepository for InMemoryGoalRepository {
    async fn save(&self, goal: &Goal) -> Result<(), RepositoryError> {
        self.goals.write().insert(goal.id, goal.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: GoalId) -> Result<Option<Goal>, RepositoryError> {
        Ok(self.goals.read().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Goal>, RepositoryError> {
        let mut goals: Vec<Goal> = self.goals.read().values().cloned().collect();
        goals.sort_by_key(|g| g.created_at);
        Ok(goals)
    }
}

#[derive(Default)]
struct TaskTable {
    rows: HashMap<TaskId, Task>,
    /// Insertion order; ties on `created_at` are common within one batch.
    order: Vec<TaskId>,
}

impl TaskTable {
    fn upsert(&mut self, task: &Task) {
        if self.rows.insert(task.id, task.clone()).is_none() {
            self.order.push(task.id);
        }
    }

    fn select(&self, predicate: impl Fn(&Task) -> bool) -> Vec<Task> {
        self.order
            .iter()
            .filter_map(|id| self.rows.get(id))
            .filter(|task| predicate(task))
            .cloned()
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTaskRepository {
    table: Arc<RwLock<TaskTable>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError> {
        self.table.write().upsert(task);
        Ok(())
    }

    async fn save_all(&self, tasks: &[Task]) -> Result<(), RepositoryError> {
        // One write guard for the whole batch: readers see all or nothing.
        let mut table = self.table.write();
        for task in tasks {
            table.upsert(task);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>, RepositoryError> {
        Ok(self.table.read().rows.get(&id).cloned())
    }

    async fn find_by_goal(&self, goal_id: GoalId) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.table.read().select(|t| t.goal_id == goal_id))
    }

    async fn find_by_goal_and_status(
        &self,
        goal_id: GoalId,
        status: TaskStatus,
    ) -> Result<Vec<Task>, RepositoryError> {
        Ok(self
            .table
            .read()
            .select(|t| t.goal_id == goal_id && t.status() == status))
    }

    async fn find_children(&self, parent_id: TaskId) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.table.read().select(|t| t.parent_id == Some(parent_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_goal_round_trip() {
        let repo = InMemoryGoalRepository::new();
        let goal = Goal::new("Build a CLI", "Small tool");
        repo.save(&goal).await.unwrap();

        let loaded = repo.find_by_id(goal.id).await.unwrap().unwrap();
        assert_eq!(loaded, goal);
        assert!(repo.find_by_id(GoalId::new()).await.unwrap().is_none());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tasks_keep_batch_order_and_filter() {
        let repo = InMemoryTaskRepository::new();
        let goal_id = GoalId::new();
        let tasks: Vec<Task> = ["a", "b", "c"]
            .iter()
            .map(|t| Task::new(goal_id, *t, "RESEARCH", json!({})))
            .collect();
        repo.save_all(&tasks).await.unwrap();
        repo.save(&Task::new(GoalId::new(), "other", "CODING", json!({})))
            .await
            .unwrap();

        let titles: Vec<String> = repo
            .find_by_goal(goal_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["a", "b", "c"]);

        let mut first = tasks[0].clone();
        first.advance_to(TaskStatus::Active).unwrap();
        repo.save(&first).await.unwrap();

        let pending = repo
            .find_by_goal_and_status(goal_id, TaskStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(repo.find_by_goal(goal_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_find_children() {
        let repo = InMemoryTaskRepository::new();
        let goal_id = GoalId::new();
        let parent = Task::new(goal_id, "parent", "DESIGN", json!({}));
        let child = Task::new(goal_id, "child", "CODING", json!({})).with_parent(parent.id);
        repo.save_all(&[parent.clone(), child.clone()]).await.unwrap();

        let children = repo.find_children(parent.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);
        assert!(repo.find_children(child.id).await.unwrap().is_empty());
    }
}
