// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the workflow engine
//!
//! These tests drive the engine through the public API together with the
//! event bus and the in-memory repositories:
//! 1. Goal creation and its announcement
//! 2. Guard refusals (built-in and custom)
//! 3. Graph violations
//! 4. Committed transitions and their announcements

use orion_core::application::workflow_engine::{WorkflowEngine, WorkflowEngineError};
use orion_core::domain::events::{Envelope, Message, Topic};
use orion_core::domain::goal::Goal;
use orion_core::domain::guards::GuardRegistry;
use orion_core::domain::repository::{GoalRepository, TaskRepository};
use orion_core::domain::task::Task;
use orion_core::domain::workflow::{TransitionError, WorkflowState};
use orion_core::infrastructure::event_bus::EventBus;
use orion_core::infrastructure::repositories::{InMemoryGoalRepository, InMemoryTaskRepository};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Harness {
    bus: EventBus,
    engine: WorkflowEngine,
    goals: Arc<InMemoryGoalRepository>,
    tasks: Arc<InMemoryTaskRepository>,
}

fn harness() -> Harness {
    let bus = EventBus::new(64);
    let goals = Arc::new(InMemoryGoalRepository::new());
    let tasks = Arc::new(InMemoryTaskRepository::new());
    let engine = WorkflowEngine::new(
        goals.clone(),
        bus.clone(),
        GuardRegistry::with_defaults(tasks.clone()),
    );
    Harness {
        bus,
        engine,
        goals,
        tasks,
    }
}

fn watch(bus: &EventBus, topic: Topic) -> mpsc::UnboundedReceiver<Arc<Envelope>> {
    let (tx, rx) = mpsc::unbounded_channel();
    bus.subscribe_fn(topic, "test-watch", move |envelope| {
        let tx = tx.clone();
        async move {
            tx.send(envelope)?;
            Ok::<(), anyhow::Error>(())
        }
    });
    rx
}

async fn recv_within(rx: &mut mpsc::UnboundedReceiver<Arc<Envelope>>, wait: Duration) -> Option<Arc<Envelope>> {
    timeout(wait, rx.recv()).await.ok().flatten()
}

#[tokio::test]
async fn test_initialize_goal_announces_goal_started() {
    let h = harness();
    let mut started = watch(&h.bus, Topic::GoalStarted);

    let goal_id = h.engine.initialize_goal("T", "D").await.unwrap();

    let goal = h.engine.get_goal(goal_id).await.unwrap();
    assert_eq!(goal.phase(), WorkflowState::Initialization);

    let envelope = recv_within(&mut started, Duration::from_secs(1))
        .await
        .expect("goal_started was not published");
    match &envelope.payload {
        Message::GoalStarted(payload) => {
            assert_eq!(payload.goal_id, goal_id);
            assert_eq!(payload.title, "T");
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert_eq!(envelope.source_id, "system");
}

#[tokio::test]
async fn test_undefined_goal_cannot_be_decomposed() {
    let h = harness();
    let mut changes = watch(&h.bus, Topic::StateChange);

    // Bypass input validation: a stored goal with blank fields.
    let goal = Goal::new("", "");
    h.goals.save(&goal).await.unwrap();

    let err = h
        .engine
        .transition_phase(goal.id, WorkflowState::TaskDecomposition)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowEngineError::Transition(TransitionError::GuardRejected { .. })
    ));
    assert!(err.to_string().contains("title and description are required"));

    let stored = h.goals.find_by_id(goal.id).await.unwrap().unwrap();
    assert_eq!(stored.phase(), WorkflowState::Initialization);
    assert!(recv_within(&mut changes, Duration::from_millis(100)).await.is_none());
}

#[tokio::test]
async fn test_graph_violation_is_rejected_before_guards() {
    let h = harness();
    let mut changes = watch(&h.bus, Topic::StateChange);
    let goal_id = h.engine.initialize_goal("Valid", "Goal").await.unwrap();

    let err = h
        .engine
        .transition_phase(goal_id, WorkflowState::ExecutionMonitoring)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowEngineError::Transition(TransitionError::IllegalTransition {
            from: WorkflowState::Initialization,
            to: WorkflowState::ExecutionMonitoring,
        })
    ));
    assert_eq!(
        h.engine.get_goal(goal_id).await.unwrap().phase(),
        WorkflowState::Initialization
    );
    assert!(recv_within(&mut changes, Duration::from_millis(100)).await.is_none());
}

#[tokio::test]
async fn test_committed_transition_is_announced() {
    let h = harness();
    let mut changes = watch(&h.bus, Topic::StateChange);
    let goal_id = h.engine.initialize_goal("Valid", "Goal").await.unwrap();

    let change = h
        .engine
        .transition_phase(goal_id, WorkflowState::TaskDecomposition)
        .await
        .unwrap();
    assert_eq!(change.previous_state, WorkflowState::Initialization);
    assert_eq!(change.new_state, WorkflowState::TaskDecomposition);

    let envelope = recv_within(&mut changes, Duration::from_secs(1))
        .await
        .expect("state_change was not published");
    assert_eq!(envelope.payload, Message::StateChanged(change));
    assert_eq!(
        h.engine.get_goal(goal_id).await.unwrap().phase(),
        WorkflowState::TaskDecomposition
    );
}

#[tokio::test]
async fn test_design_phase_requires_tasks() {
    let h = harness();
    let goal_id = h.engine.initialize_goal("Valid", "Goal").await.unwrap();
    h.engine
        .transition_phase(goal_id, WorkflowState::TaskDecomposition)
        .await
        .unwrap();

    let err = h
        .engine
        .transition_phase(goal_id, WorkflowState::DesignImplementation)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowEngineError::Transition(TransitionError::GuardRejected { ref guard, .. }) if guard == "tasks_decomposed"
    ));

    h.tasks
        .save(&Task::new(goal_id, "Research", "RESEARCH", json!({"description": "d"})))
        .await
        .unwrap();
    h.engine
        .transition_phase(goal_id, WorkflowState::DesignImplementation)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_full_phase_walk_to_completion() {
    let h = harness();
    let goal_id = h.engine.initialize_goal("Valid", "Goal").await.unwrap();
    h.tasks
        .save(&Task::new(goal_id, "Code", "CODING", json!({})))
        .await
        .unwrap();

    for target in [
        WorkflowState::TaskDecomposition,
        WorkflowState::DesignImplementation,
        WorkflowState::ExecutionMonitoring,
        WorkflowState::ExecutionMonitoring,
        WorkflowState::MetaCommunication,
        WorkflowState::ExecutionMonitoring,
        WorkflowState::Integration,
        WorkflowState::Completed,
    ] {
        h.engine.transition_phase(goal_id, target).await.unwrap();
    }

    let goal = h.engine.get_goal(goal_id).await.unwrap();
    assert_eq!(goal.phase(), WorkflowState::Completed);
    for target in WorkflowState::ALL {
        assert!(h.engine.transition_phase(goal_id, target).await.is_err());
    }
}
