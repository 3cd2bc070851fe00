// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Engine Application Service
//!
//! Owns every phase change of every Goal.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Validate, guard, commit and announce phase transitions
//! - **Dependencies:** Domain (Goal, WorkflowState, guards), `GoalRepository`, `EventBus`
//!
//! # Transition Pipeline
//!
//! ```text
//! load goal ─► edge in graph? ─► guards (registration order, first refusal wins)
//!           ─► set phase ─► save ─► publish workflow.state_change
//! ```
//!
//! A refused transition leaves the stored goal untouched and publishes
//! nothing. Save and publish are two steps: when the publish fails the new
//! phase is already committed, the failure is logged and the caller still
//! receives the [`StateChanged`] record.
//!
//! The engine takes no lock per goal. Two concurrent transitions of the same
//! goal both validate against the phase they loaded and the last save wins.

use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::events::{GoalStarted, Message, StateChanged, Topic, SYSTEM_SOURCE};
use crate::domain::goal::{Goal, GoalId};
use crate::domain::guards::{GuardError, GuardRegistry};
use crate::domain::repository::{GoalRepository, RepositoryError};
use crate::domain::workflow::{TransitionError, WorkflowState};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowEngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Goal not found: {0}")]
    NotFound(GoalId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Workflow Engine (Application Service)
pub struct WorkflowEngine {
    goals: Arc<dyn GoalRepository>,
    event_bus: EventBus,
    guards: GuardRegistry,
}

impl WorkflowEngine {
    pub fn new(goals: Arc<dyn GoalRepository>, event_bus: EventBus, guards: GuardRegistry) -> Self {
        Self {
            goals,
            event_bus,
            guards,
        }
    }

    /// Create a goal in `INITIALIZATION` and announce it on `workflow.goal_started`.
    pub async fn initialize_goal(
        &self,
        title: &str,
        description: &str,
    ) -> Result<GoalId, WorkflowEngineError> {
        if title.trim().is_empty() {
            return Err(WorkflowEngineError::Validation("Goal title is required".into()));
        }
        if description.trim().is_empty() {
            return Err(WorkflowEngineError::Validation(
                "Goal description is required".into(),
            ));
        }

        let goal = Goal::new(title, description);
        self.goals.save(&goal).await?;
        info!(goal_id = %goal.id, title = %goal.title, "Goal initialized");

        let announcement = Message::GoalStarted(GoalStarted {
            goal_id: goal.id,
            title: goal.title.clone(),
            timestamp: goal.created_at,
        });
        if let Err(e) = self
            .event_bus
            .publish(Topic::GoalStarted, announcement, SYSTEM_SOURCE)
            .await
        {
            warn!(goal_id = %goal.id, "Failed to announce goal start: {}", e);
        }

        Ok(goal.id)
    }

    /// Move a goal to `target` if the edge exists and every guard admits it.
    pub async fn transition_phase(
        &self,
        goal_id: GoalId,
        target: WorkflowState,
    ) -> Result<StateChanged, WorkflowEngineError> {
        let mut goal = self.get_goal(goal_id).await?;
        let previous = goal.phase();
        previous.validate_transition(target)?;

        for guard in self.guards.guards_for(previous, target) {
            let name = guard.name().to_string();
            debug!(goal_id = %goal_id, guard = %name, "Evaluating transition guard");
            match guard.check(&goal).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(TransitionError::GuardRejected {
                        reason: format!("Guard '{}' failed", name),
                        guard: name,
                    }
                    .into());
                }
                Err(GuardError::Rejected(reason)) => {
                    return Err(TransitionError::GuardRejected {
                        guard: name,
                        reason,
                    }
                    .into());
                }
                Err(GuardError::Internal(source)) => {
                    return Err(TransitionError::GuardFailed {
                        guard: name,
                        source,
                    }
                    .into());
                }
            }
        }

        goal.set_phase(target);
        self.goals.save(&goal).await?;

        let change = StateChanged {
            goal_id,
            previous_state: previous,
            new_state: target,
            timestamp: Utc::now(),
        };
        info!(goal_id = %goal_id, from = %previous, to = %target, "Phase transition committed");
        counter!("orion_workflow_transitions_total", "to" => target.as_str()).increment(1);

        if let Err(e) = self
            .event_bus
            .publish(Topic::StateChange, Message::StateChanged(change.clone()), SYSTEM_SOURCE)
            .await
        {
            warn!(goal_id = %goal_id, "Phase committed but announcement failed: {}", e);
        }

        Ok(change)
    }

    pub async fn get_goal(&self, goal_id: GoalId) -> Result<Goal, WorkflowEngineError> {
        self.goals
            .find_by_id(goal_id)
            .await?
            .ok_or(WorkflowEngineError::NotFound(goal_id))
    }

    pub fn guards(&self) -> &GuardRegistry {
        &self.guards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::guards::TransitionGuard;
    use crate::infrastructure::repositories::InMemoryGoalRepository;
    use async_trait::async_trait;

    struct Refuse;

    #[async_trait]
    impl TransitionGuard for Refuse {
        fn name(&self) -> &str {
            "always_false"
        }

        async fn check(&self, _goal: &Goal) -> Result<bool, GuardError> {
            Ok(false)
        }
    }

    struct Broken;

    #[async_trait]
    impl TransitionGuard for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn check(&self, _goal: &Goal) -> Result<bool, GuardError> {
            Err(GuardError::Internal(anyhow::anyhow!("store offline")))
        }
    }

    fn engine_with(guards: GuardRegistry) -> (WorkflowEngine, Arc<InMemoryGoalRepository>) {
        let goals = Arc::new(InMemoryGoalRepository::new());
        let engine = WorkflowEngine::new(goals.clone(), EventBus::new(8), guards);
        (engine, goals)
    }

    #[tokio::test]
    async fn test_initialize_goal_validates_input() {
        let (engine, goals) = engine_with(GuardRegistry::new());
        let err = engine.initialize_goal("", "desc").await.unwrap_err();
        assert!(matches!(err, WorkflowEngineError::Validation(_)));
        let err = engine.initialize_goal("title", "  ").await.unwrap_err();
        assert!(matches!(err, WorkflowEngineError::Validation(_)));
        assert!(goals.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_false_guard_reports_generic_reason() {
        let mut guards = GuardRegistry::new();
        guards
            .register(
                WorkflowState::Initialization,
                WorkflowState::TaskDecomposition,
                Arc::new(Refuse),
            )
            .unwrap();
        let (engine, _) = engine_with(guards);
        let goal_id = engine.initialize_goal("t", "d").await.unwrap();

        let err = engine
            .transition_phase(goal_id, WorkflowState::TaskDecomposition)
            .await
            .unwrap_err();
        match err {
            WorkflowEngineError::Transition(TransitionError::GuardRejected { guard, reason }) => {
                assert_eq!(guard, "always_false");
                assert_eq!(reason, "Guard 'always_false' failed");
            }
            other => panic!("unexpected error {other:?}"),
        }
        let goal = engine.get_goal(goal_id).await.unwrap();
        assert_eq!(goal.phase(), WorkflowState::Initialization);
    }

    #[tokio::test]
    async fn test_guard_internal_error_is_wrapped() {
        let mut guards = GuardRegistry::new();
        guards
            .register(
                WorkflowState::Initialization,
                WorkflowState::TaskDecomposition,
                Arc::new(Broken),
            )
            .unwrap();
        let (engine, _) = engine_with(guards);
        let goal_id = engine.initialize_goal("t", "d").await.unwrap();

        let err = engine
            .transition_phase(goal_id, WorkflowState::TaskDecomposition)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowEngineError::Transition(TransitionError::GuardFailed { ref guard, .. }) if guard == "broken"
        ));
    }

    #[tokio::test]
    async fn test_every_phase_pair_matches_graph() {
        use WorkflowState::*;
        const EDGES: &[(WorkflowState, WorkflowState)] = &[
            (Initialization, TaskDecomposition),
            (TaskDecomposition, DesignImplementation),
            (DesignImplementation, ExecutionMonitoring),
            (ExecutionMonitoring, MetaCommunication),
            (ExecutionMonitoring, Integration),
            (ExecutionMonitoring, ExecutionMonitoring),
            (ExecutionMonitoring, Suspended),
            (MetaCommunication, ExecutionMonitoring),
            (MetaCommunication, Initialization),
            (Integration, Completed),
            (Suspended, Initialization),
            (Suspended, ExecutionMonitoring),
        ];

        let goals = Arc::new(InMemoryGoalRepository::new());
        let bus = EventBus::new(256);
        let engine = WorkflowEngine::new(goals.clone(), bus.clone(), GuardRegistry::new());

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = bus.subscribe_fn(Topic::StateChange, "state-changes", move |envelope| {
            let tx = tx.clone();
            async move {
                if let Message::StateChanged(change) = &envelope.payload {
                    tx.send(change.clone())?;
                }
                Ok::<(), anyhow::Error>(())
            }
        });

        let mut expected_changes = Vec::new();
        for from in WorkflowState::ALL {
            for to in WorkflowState::ALL {
                let mut goal = Goal::new(format!("{from} to {to}"), "pair check");
                goal.set_phase(from);
                goals.save(&goal).await.unwrap();

                let outcome = engine.transition_phase(goal.id, to).await;
                let stored = engine.get_goal(goal.id).await.unwrap().phase();
                if EDGES.contains(&(from, to)) {
                    assert!(outcome.is_ok(), "{from} -> {to} should be legal");
                    assert_eq!(stored, to);
                    expected_changes.push((goal.id, from, to));
                } else {
                    assert!(
                        matches!(
                            outcome,
                            Err(WorkflowEngineError::Transition(TransitionError::IllegalTransition { .. }))
                        ),
                        "{from} -> {to} should be illegal"
                    );
                    assert_eq!(stored, from, "{from} -> {to} changed the stored phase");
                }
            }
        }

        let mut announced = Vec::new();
        while announced.len() < expected_changes.len() {
            let change = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
                .await
                .expect("missing state_change")
                .unwrap();
            announced.push((change.goal_id, change.previous_state, change.new_state));
        }
        // Nothing beyond the legal edges is announced.
        assert!(tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv())
            .await
            .is_err());
        for change in &expected_changes {
            assert!(announced.contains(change));
        }
    }

    #[tokio::test]
    async fn test_unknown_goal() {
        let (engine, _) = engine_with(GuardRegistry::new());
        let missing = GoalId::new();
        let err = engine
            .transition_phase(missing, WorkflowState::TaskDecomposition)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowEngineError::NotFound(id) if id == missing));
    }
}
