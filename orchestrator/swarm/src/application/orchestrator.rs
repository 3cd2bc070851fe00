// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Orchestrator
//!
//! Composition root of a coordination node. Builds the bus, repositories,
//! guard registry, workflow engine, the three agents and the heartbeat
//! monitor from a [`NodeConfig`], and passes each collaborator explicitly.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Wire and run one swarm
//! - **Dependencies:** `orion-core` (engine, bus, repositories), agents in this crate
//!
//! Agents start consumers first (executor, decomposer, coordinator) so no
//! reaction is published before its consumer subscribes, and stop in the
//! reverse order.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use orion_core::application::workflow_engine::{WorkflowEngine, WorkflowEngineError};
use orion_core::domain::events::{Message, Topic};
use orion_core::domain::goal::GoalId;
use orion_core::domain::guards::GuardRegistry;
use orion_core::domain::llm::LLMProvider;
use orion_core::domain::node_config::{ConfigError, NodeConfig};
use orion_core::domain::repository::{GoalRepository, TaskRepository};
use orion_core::domain::workflow::WorkflowState;
use orion_core::infrastructure::event_bus::EventBus;
use orion_core::infrastructure::repositories::{InMemoryGoalRepository, InMemoryTaskRepository};

use super::coordinator::Coordinator;
use super::decomposer::Decomposer;
use super::executor::Executor;
use super::liveness::HeartbeatMonitor;
use super::runtime::RuntimeError;
use super::Agent;
use crate::domain::{RosterError, SwarmRoster};

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Roster error: {0}")]
    Roster(#[from] RosterError),

    #[error("Agent runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Workflow(#[from] WorkflowEngineError),
}

pub struct Orchestrator {
    roster: SwarmRoster,
    bus: EventBus,
    goals: Arc<dyn GoalRepository>,
    tasks: Arc<dyn TaskRepository>,
    engine: Arc<WorkflowEngine>,
    coordinator: Coordinator,
    decomposer: Decomposer,
    executor: Executor,
    monitor: HeartbeatMonitor,
}

impl Orchestrator {
    /// Build a node backed by in-memory repositories.
    ///
    /// Without a provider the decomposer and executor produce placeholder
    /// output, which keeps the whole pipeline runnable offline.
    pub fn new(
        config: &NodeConfig,
        llm: Option<Arc<dyn LLMProvider>>,
    ) -> Result<Self, OrchestratorError> {
        Self::with_repositories(
            config,
            Arc::new(InMemoryGoalRepository::new()),
            Arc::new(InMemoryTaskRepository::new()),
            llm,
        )
    }

    pub fn with_repositories(
        config: &NodeConfig,
        goals: Arc<dyn GoalRepository>,
        tasks: Arc<dyn TaskRepository>,
        llm: Option<Arc<dyn LLMProvider>>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let roster = SwarmRoster::from_config(&config.agents)?;

        let bus = EventBus::with_config(&config.bus);
        let engine = Arc::new(WorkflowEngine::new(
            goals.clone(),
            bus.clone(),
            GuardRegistry::with_defaults(tasks.clone()),
        ));

        let coordinator = Coordinator::new(&roster, bus.clone(), engine.clone(), tasks.clone(), &config.agents);
        let decomposer = Decomposer::new(
            roster.decomposer.clone(),
            bus.clone(),
            goals.clone(),
            tasks.clone(),
            llm.clone(),
            &config.agents,
        );
        let executor = Executor::new(roster.executor.clone(), bus.clone(), llm, &config.agents);

        Ok(Self {
            roster,
            bus,
            goals,
            tasks,
            engine,
            coordinator,
            decomposer,
            executor,
            monitor: HeartbeatMonitor::new(),
        })
    }

    fn agents(&self) -> [&dyn Agent; 3] {
        [&self.executor, &self.decomposer, &self.coordinator]
    }

    pub async fn start(&self) -> Result<(), OrchestratorError> {
        self.monitor.attach(&self.bus);
        for agent in self.agents() {
            agent.start().await?;
        }
        info!(
            coordinator = %self.roster.coordinator,
            decomposer = %self.roster.decomposer,
            executor = %self.roster.executor,
            "Swarm started"
        );
        Ok(())
    }

    pub async fn stop(&self) {
        for agent in self.agents().into_iter().rev() {
            agent.stop().await;
        }
        self.monitor.detach();
        info!("Swarm stopped");
    }

    /// Create a goal and hand it to the coordinator.
    pub async fn submit_goal(&self, title: &str, description: &str) -> Result<GoalId, OrchestratorError> {
        Ok(self.engine.initialize_goal(title, description).await?)
    }

    /// Wait until the goal is in `target`. Returns false on timeout.
    pub async fn await_phase(
        &self,
        goal_id: GoalId,
        target: WorkflowState,
        within: Duration,
    ) -> Result<bool, OrchestratorError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watch = self
            .bus
            .subscribe_fn(Topic::StateChange, "phase-watch", move |envelope| {
                let tx = tx.clone();
                async move {
                    if let Message::StateChanged(change) = &envelope.payload {
                        if change.goal_id == goal_id {
                            // Receiver gone means the wait is over.
                            let _ = tx.send(change.new_state);
                        }
                    }
                    Ok::<(), anyhow::Error>(())
                }
            });

        let current = self.engine.get_goal(goal_id).await.map(|goal| goal.phase());
        let reached = match current {
            Ok(phase) if phase == target => Ok(true),
            Ok(_) => Ok(tokio::time::timeout(within, async {
                while let Some(phase) = rx.recv().await {
                    if phase == target {
                        return true;
                    }
                }
                false
            })
            .await
            .unwrap_or(false)),
            Err(e) => Err(e.into()),
        };
        watch.unsubscribe();
        reached
    }

    /// Wait until the goal has tasks and every one of them is terminal.
    pub async fn await_settled(&self, goal_id: GoalId, within: Duration) -> Result<bool, OrchestratorError> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let tasks = self
                .tasks
                .find_by_goal(goal_id)
                .await
                .map_err(WorkflowEngineError::from)?;
            if !tasks.is_empty() && tasks.iter().all(|t| t.status().is_terminal()) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
        }
    }

    pub fn roster(&self) -> &SwarmRoster {
        &self.roster
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    pub fn goals(&self) -> &Arc<dyn GoalRepository> {
        &self.goals
    }

    pub fn tasks(&self) -> &Arc<dyn TaskRepository> {
        &self.tasks
    }

    pub fn monitor(&self) -> &HeartbeatMonitor {
        &self.monitor
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn decomposer(&self) -> &Decomposer {
        &self.decomposer
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}
