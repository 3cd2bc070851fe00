// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Coordinator Agent
//!
//! Drives a goal from approval to task assignment.
//!
//! # Reactions
//!
//! | Topic | Reaction |
//! |-------|----------|
//! | `workflow.goal_started` | wait `feasibility_delay`, then request `TASK_DECOMPOSITION` |
//! | `workflow.state_change` | on `TASK_DECOMPOSITION`, ask the decomposer to split the goal |
//! | `workflow.tasks_generated` | assign every `PENDING` task of the goal to the executor |
//! | `workflow.task_result` | record the outcome; optionally advance the goal |
//!
//! A failed reaction is announced on `agent.log` at `ERROR` and reported to
//! the bus dispatcher. It never stops the coordinator.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use orion_core::application::workflow_engine::{WorkflowEngine, WorkflowEngineError};
use orion_core::domain::agent::AgentId;
use orion_core::domain::events::{
    DecomposeRequest, Envelope, GoalStarted, LogLevel, Message, StateChanged, TaskAssignment,
    TaskResult, TasksGenerated, Topic,
};
use orion_core::domain::goal::GoalId;
use orion_core::domain::node_config::AgentsConfig;
use orion_core::domain::repository::TaskRepository;
use orion_core::domain::task::{TaskStatus, TaskStatusError};
use orion_core::domain::workflow::{TransitionError, WorkflowState};
use orion_core::infrastructure::event_bus::{EventBus, EventHandler, Subscription};

use super::runtime::{announce, AgentRuntime, RuntimeConfig, RuntimeError, TaskProcessor};
use super::Agent;
use crate::domain::SwarmRoster;

const WATCHED_TOPICS: [Topic; 4] = [
    Topic::GoalStarted,
    Topic::StateChange,
    Topic::TasksGenerated,
    Topic::TaskResult,
];

pub struct Coordinator {
    runtime: AgentRuntime,
    inner: Arc<CoordinatorInner>,
    subscriptions: Mutex<Vec<Subscription>>,
}

struct CoordinatorInner {
    agent_id: AgentId,
    decomposer: AgentId,
    executor: AgentId,
    bus: EventBus,
    engine: Arc<WorkflowEngine>,
    tasks: Arc<dyn TaskRepository>,
    feasibility_delay: Duration,
    advance_on_completion: bool,
}

impl Coordinator {
    pub fn new(
        roster: &SwarmRoster,
        bus: EventBus,
        engine: Arc<WorkflowEngine>,
        tasks: Arc<dyn TaskRepository>,
        config: &AgentsConfig,
    ) -> Self {
        let inner = Arc::new(CoordinatorInner {
            agent_id: roster.coordinator.clone(),
            decomposer: roster.decomposer.clone(),
            executor: roster.executor.clone(),
            bus: bus.clone(),
            engine,
            tasks,
            feasibility_delay: config.feasibility_delay,
            advance_on_completion: config.advance_on_completion,
        });
        let runtime = AgentRuntime::new(
            roster.coordinator.clone(),
            bus,
            Arc::new(DirectInbox),
            RuntimeConfig::from(config),
        );
        Self {
            runtime,
            inner,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }
}

#[async_trait]
impl Agent for Coordinator {
    fn agent_id(&self) -> &AgentId {
        self.runtime.agent_id()
    }

    async fn start(&self) -> Result<(), RuntimeError> {
        self.runtime.start().await?;

        let handler = Arc::new(Reactions {
            name: format!("{}.reactions", self.inner.agent_id),
            inner: self.inner.clone(),
        });
        let mut subscriptions = self.subscriptions.lock();
        for topic in WATCHED_TOPICS {
            subscriptions.push(self.inner.bus.subscribe(topic, handler.clone()));
        }
        Ok(())
    }

    async fn stop(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.runtime.stop().await;
    }
}

/// Work addressed directly to the coordinator is acknowledged and nothing more.
struct DirectInbox;

#[async_trait]
impl TaskProcessor for DirectInbox {
    async fn process_task(&self, _task: &TaskAssignment) -> anyhow::Result<Value> {
        Ok(json!({ "status": "ok", "msg": "Coordinator processed task" }))
    }
}

struct Reactions {
    name: String,
    inner: Arc<CoordinatorInner>,
}

#[async_trait]
impl EventHandler for Reactions {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()> {
        let outcome = match &envelope.payload {
            Message::GoalStarted(event) => self.inner.on_goal_started(event).await,
            Message::StateChanged(event) => self.inner.on_state_changed(event).await,
            Message::TasksGenerated(event) => self.inner.on_tasks_generated(event).await,
            Message::TaskResult(event) => self.inner.on_task_result(event).await,
            other => {
                debug!(kind = other.kind(), "Coordinator ignoring payload");
                Ok(())
            }
        };

        // Reported on agent.log; the bus counts only handler faults.
        if let Err(e) = outcome {
            self.inner
                .log(LogLevel::Error, format!("Failed to handle {}: {:#}", envelope.topic, e))
                .await;
        }
        Ok(())
    }
}

impl CoordinatorInner {
    async fn log(&self, level: LogLevel, message: impl Into<String>) {
        announce(&self.bus, &self.agent_id, level, message).await
    }

    async fn on_goal_started(&self, event: &GoalStarted) -> anyhow::Result<()> {
        self.log(
            LogLevel::Info,
            format!("Observed new goal: '{}'. Assessing feasibility...", event.title),
        )
        .await;
        tokio::time::sleep(self.feasibility_delay).await;

        self.log(
            LogLevel::Info,
            format!(
                "Goal '{}' approved. Transitioning to Task Decomposition.",
                event.title
            ),
        )
        .await;
        self.engine
            .transition_phase(event.goal_id, WorkflowState::TaskDecomposition)
            .await?;
        Ok(())
    }

    async fn on_state_changed(&self, event: &StateChanged) -> anyhow::Result<()> {
        if event.new_state != WorkflowState::TaskDecomposition {
            return Ok(());
        }

        self.log(
            LogLevel::Info,
            format!("Phase Task Decomposition active. Delegating to {}...", self.decomposer),
        )
        .await;
        let goal = self.engine.get_goal(event.goal_id).await?;
        let request = Message::DecomposeRequested(DecomposeRequest {
            goal_id: goal.id,
            title: goal.title,
            description: goal.description,
        });
        self.bus
            .publish(Topic::Decompose(self.decomposer.clone()), request, self.agent_id.as_str())
            .await?;
        Ok(())
    }

    async fn on_tasks_generated(&self, event: &TasksGenerated) -> anyhow::Result<()> {
        self.log(
            LogLevel::Info,
            format!("Found {} pending tasks. Assigning to Agents...", event.task_count),
        )
        .await;

        let pending = self
            .tasks
            .find_by_goal_and_status(event.goal_id, TaskStatus::Pending)
            .await?;
        for mut task in pending {
            task.assign(self.executor.clone())?;
            self.tasks.save(&task).await?;

            let assignment = Message::TaskAssigned(TaskAssignment::from(&task));
            self.bus
                .publish(Topic::AgentTask(self.executor.clone()), assignment, self.agent_id.as_str())
                .await?;
            self.log(
                LogLevel::Info,
                format!("Assigned task '{}' to {}.", task.title, self.executor),
            )
            .await;
        }
        Ok(())
    }

    async fn on_task_result(&self, event: &TaskResult) -> anyhow::Result<()> {
        let Some(mut task) = self.tasks.find_by_id(event.task_id).await? else {
            self.log(
                LogLevel::Warning,
                format!("Received result for unknown task {}.", event.task_id),
            )
            .await;
            return Ok(());
        };

        let recorded = match event.status {
            TaskStatus::Failed => json!({ "error": event.error }),
            _ => json!({ "output": event.result }),
        };
        match task.record_outcome(event.status, recorded) {
            Ok(()) => {}
            Err(TaskStatusError::IllegalStatusTransition { from, to, .. }) => {
                debug!(task_id = %task.id, %from, %to, "Ignoring out-of-order task result");
                return Ok(());
            }
        }
        self.tasks.save(&task).await?;
        self.log(
            LogLevel::Info,
            format!("Updated Task '{}' status to {}.", task.title, event.status),
        )
        .await;

        self.maybe_advance(task.goal_id).await
    }

    /// Move the goal into design once every one of its tasks has settled.
    async fn maybe_advance(&self, goal_id: GoalId) -> anyhow::Result<()> {
        if !self.advance_on_completion {
            return Ok(());
        }
        let goal = self.engine.get_goal(goal_id).await?;
        if goal.phase() != WorkflowState::TaskDecomposition {
            return Ok(());
        }
        let tasks = self.tasks.find_by_goal(goal_id).await?;
        if tasks.is_empty() || !tasks.iter().all(|t| t.status().is_terminal()) {
            return Ok(());
        }

        self.log(
            LogLevel::Info,
            format!(
                "All {} tasks of '{}' settled. Transitioning to Design & Implementation.",
                tasks.len(),
                goal.title
            ),
        )
        .await;
        match self
            .engine
            .transition_phase(goal_id, WorkflowState::DesignImplementation)
            .await
        {
            Ok(_) => Ok(()),
            // A concurrent result handler advanced the goal first.
            Err(WorkflowEngineError::Transition(TransitionError::IllegalTransition { .. })) => {
                debug!(goal_id = %goal_id, "Goal already advanced");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
