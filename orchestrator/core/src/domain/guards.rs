// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Transition Guards
//!
//! A guard is an admission predicate attached to one edge `(from, to)` of the
//! phase graph. The workflow engine runs every guard registered on an edge, in
//! registration order, before it commits a transition; the first refusal wins.
//!
//! Guards see an immutable snapshot of the goal and must not write anything.
//! A guard may read other records (see [`TasksDecomposedGuard`]).
//!
//! | Guard | Edge | Refuses when |
//! |-------|------|--------------|
//! | `goal_defined` | `INITIALIZATION → TASK_DECOMPOSITION` | title or description is blank |
//! | `tasks_decomposed` | `TASK_DECOMPOSITION → DESIGN_IMPLEMENTATION` | the goal has no tasks |

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::goal::Goal;
use crate::domain::repository::TaskRepository;
use crate::domain::workflow::{TransitionError, WorkflowState};

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Expected refusal carrying a human-readable reason.
    #[error("{0}")]
    Rejected(String),

    /// The guard itself failed (store unavailable, bug, ...).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[async_trait]
pub trait TransitionGuard: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(true)` admits, `Ok(false)` refuses without a specific reason.
    async fn check(&self, goal: &Goal) -> Result<bool, GuardError>;
}

/// Guards indexed by edge. Edges outside the phase graph cannot carry guards.
#[derive(Default, Clone)]
pub struct GuardRegistry {
    guards: HashMap<(WorkflowState, WorkflowState), Vec<Arc<dyn TransitionGuard>>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in guards.
    pub fn with_defaults(tasks: Arc<dyn TaskRepository>) -> Self {
        let mut registry = Self::new();
        registry.guards.insert(
            (WorkflowState::Initialization, WorkflowState::TaskDecomposition),
            vec![Arc::new(GoalDefinedGuard)],
        );
        registry.guards.insert(
            (WorkflowState::TaskDecomposition, WorkflowState::DesignImplementation),
            vec![Arc::new(TasksDecomposedGuard::new(tasks))],
        );
        registry
    }

    pub fn register(
        &mut self,
        from: WorkflowState,
        to: WorkflowState,
        guard: Arc<dyn TransitionGuard>,
    ) -> Result<(), TransitionError> {
        from.validate_transition(to)?;
        self.guards.entry((from, to)).or_default().push(guard);
        Ok(())
    }

    pub fn guards_for(&self, from: WorkflowState, to: WorkflowState) -> &[Arc<dyn TransitionGuard>] {
        self.guards
            .get(&(from, to))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl std::fmt::Debug for GuardRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for ((from, to), guards) in &self.guards {
            let names: Vec<&str> = guards.iter().map(|g| g.name()).collect();
            map.entry(&format!("{from} -> {to}"), &names);
        }
        map.finish()
    }
}

/// A goal may only be decomposed once it says what it is about.
pub struct GoalDefinedGuard;

#[async_trait]
impl TransitionGuard for GoalDefinedGuard {
    fn name(&self) -> &str {
        "goal_defined"
    }

    async fn check(&self, goal: &Goal) -> Result<bool, GuardError> {
        if goal.is_defined() {
            Ok(true)
        } else {
            Err(GuardError::Rejected(
                "Goal title and description are required.".to_string(),
            ))
        }
    }
}

/// Decomposition is done only when at least one task exists for the goal.
pub struct TasksDecomposedGuard {
    tasks: Arc<dyn TaskRepository>,
}

impl TasksDecomposedGuard {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl TransitionGuard for TasksDecomposedGuard {
    fn name(&self) -> &str {
        "tasks_decomposed"
    }

    async fn check(&self, goal: &Goal) -> Result<bool, GuardError> {
        let tasks = self
            .tasks
            .find_by_goal(goal.id)
            .await
            .map_err(anyhow::Error::from)?;
        if tasks.is_empty() {
            return Err(GuardError::Rejected(format!(
                "Goal '{}' has no tasks yet.",
                goal.title
            )));
        }
        Ok(true)
    }
}
