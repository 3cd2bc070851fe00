// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Runtime
//!
//! Lifecycle shared by every agent in the swarm: task intake, heartbeat,
//! result reporting and log announcements.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Wrap a [`TaskProcessor`] with the bus plumbing every agent needs
//! - **Dependencies:** `EventBus`, `CancellationToken`
//!
//! # Task Wrapper
//!
//! ```text
//! agents.<id>.task ─► WORKING + heartbeat ─► process_task
//!                  ─► workflow.task_result (COMPLETED | FAILED)
//!                  ─► IDLE + heartbeat
//! ```
//!
//! The wrapper is the only place that announces task results. Errors and
//! panics from the processor become `FAILED` results carrying the message.
//!
//! Status is agent-wide. Two tasks running at once overwrite each other's
//! `current_task_id`; the last one to finish resets the agent to `IDLE`.

use async_trait::async_trait;
use futures::FutureExt;
use metrics::counter;
use parking_lot::Mutex;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use orion_core::domain::agent::{AgentHeartbeat, AgentId, AgentStatus};
use orion_core::domain::events::{AgentLog, Envelope, LogLevel, Message, TaskAssignment, TaskResult, Topic};
use orion_core::domain::node_config::AgentsConfig;
use orion_core::domain::task::TaskId;
use orion_core::infrastructure::event_bus::{BusError, EventBus, EventHandler, Subscription};

/// The one operation an agent contributes: turn an assignment into a result.
#[async_trait]
pub trait TaskProcessor: Send + Sync + 'static {
    async fn process_task(&self, task: &TaskAssignment) -> anyhow::Result<Value>;
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Agent '{0}' is already running")]
    AlreadyStarted(AgentId),

    #[error("Agent '{0}' has been stopped")]
    Stopped(AgentId),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

/// Timing knobs for one runtime.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub heartbeat_interval: Duration,
    pub error_backoff: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
        }
    }
}

impl From<&AgentsConfig> for RuntimeConfig {
    fn from(config: &AgentsConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            error_backoff: config.error_backoff,
        }
    }
}

/// Publish an `agent.log` announcement and mirror it to the local log.
///
/// A failed publish is logged and otherwise ignored.
pub async fn announce(bus: &EventBus, agent_id: &AgentId, level: LogLevel, message: impl Into<String>) {
    let message = message.into();
    match level {
        LogLevel::Error => error!(agent_id = %agent_id, "{}", message),
        LogLevel::Warning => warn!(agent_id = %agent_id, "{}", message),
        LogLevel::Debug => debug!(agent_id = %agent_id, "{}", message),
        LogLevel::Info | LogLevel::Success => info!(agent_id = %agent_id, "{}", message),
    }

    let log = Message::AgentLog(AgentLog {
        agent_id: agent_id.clone(),
        level,
        message,
    });
    if let Err(e) = bus.publish(Topic::AgentLog, log, agent_id.as_str()).await {
        warn!(agent_id = %agent_id, "Failed to publish agent log: {}", e);
    }
}

struct AgentState {
    status: AgentStatus,
    current_task: Option<TaskId>,
}

struct RuntimeInner {
    agent_id: AgentId,
    bus: EventBus,
    processor: Arc<dyn TaskProcessor>,
    config: RuntimeConfig,
    state: Mutex<AgentState>,
    shutdown: CancellationToken,
}

enum Lifecycle {
    Created,
    Running {
        heartbeat: JoinHandle<()>,
        intake: Subscription,
    },
    Stopped,
}

/// Drives one [`TaskProcessor`] on the bus.
pub struct AgentRuntime {
    inner: Arc<RuntimeInner>,
    lifecycle: Mutex<Lifecycle>,
}

impl AgentRuntime {
    pub fn new(
        agent_id: AgentId,
        bus: EventBus,
        processor: Arc<dyn TaskProcessor>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                agent_id,
                bus,
                processor,
                config,
                state: Mutex::new(AgentState {
                    status: AgentStatus::Idle,
                    current_task: None,
                }),
                shutdown: CancellationToken::new(),
            }),
            lifecycle: Mutex::new(Lifecycle::Created),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.inner.agent_id
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn status(&self) -> AgentStatus {
        self.inner.state.lock().status
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.inner.state.lock().current_task
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running { .. })
    }

    /// Subscribe to the agent's task topic, start heartbeating and announce `IDLE`.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Running { .. } => {
                    return Err(RuntimeError::AlreadyStarted(self.inner.agent_id.clone()))
                }
                Lifecycle::Stopped => return Err(RuntimeError::Stopped(self.inner.agent_id.clone())),
                Lifecycle::Created => {}
            }

            let topic = Topic::AgentTask(self.inner.agent_id.clone());
            let intake = self.inner.bus.subscribe(
                topic,
                Arc::new(TaskIntake {
                    name: format!("{}.task-intake", self.inner.agent_id),
                    inner: self.inner.clone(),
                }),
            );
            let heartbeat = tokio::spawn(heartbeat_loop(self.inner.clone()));
            *lifecycle = Lifecycle::Running { heartbeat, intake };
        }

        self.inner.set_state(AgentStatus::Idle, None);
        self.inner.emit_heartbeat().await?;
        info!(agent_id = %self.inner.agent_id, "Agent started");
        Ok(())
    }

    /// Stop heartbeating and release the task subscription.
    ///
    /// A task already being processed runs to completion and still reports
    /// its result. Calling `stop` again is a no-op.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        let Lifecycle::Running { heartbeat, intake } = previous else {
            return;
        };

        self.inner.shutdown.cancel();
        if let Err(e) = heartbeat.await {
            warn!(agent_id = %self.inner.agent_id, "Heartbeat loop ended abnormally: {}", e);
        }
        intake.unsubscribe();
        info!(agent_id = %self.inner.agent_id, "Agent stopped");
    }

    /// Run one assignment through the processor and report its result.
    pub async fn execute_task(&self, task: TaskAssignment) {
        self.inner.execute_task(task).await
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        announce(&self.inner.bus, &self.inner.agent_id, level, message).await
    }
}

impl RuntimeInner {
    fn set_state(&self, status: AgentStatus, current_task: Option<TaskId>) {
        let mut state = self.state.lock();
        state.status = status;
        state.current_task = current_task;
    }

    fn heartbeat(&self) -> AgentHeartbeat {
        let state = self.state.lock();
        AgentHeartbeat::new(self.agent_id.clone(), state.status, state.current_task)
    }

    async fn emit_heartbeat(&self) -> Result<(), BusError> {
        let heartbeat = self.heartbeat();
        self.bus
            .publish(Topic::Heartbeat, Message::Heartbeat(heartbeat), self.agent_id.as_str())
            .await
    }

    async fn emit_heartbeat_logged(&self) {
        if let Err(e) = self.emit_heartbeat().await {
            warn!(agent_id = %self.agent_id, "Failed to emit heartbeat: {}", e);
        }
    }

    async fn execute_task(&self, task: TaskAssignment) {
        info!(agent_id = %self.agent_id, task_id = %task.id, title = %task.title, "Executing task");
        self.set_state(AgentStatus::Working, Some(task.id));
        self.emit_heartbeat_logged().await;

        let outcome = AssertUnwindSafe(self.processor.process_task(&task))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(Ok(value)) => TaskResult::completed(task.id, self.agent_id.clone(), value),
            Ok(Err(e)) => {
                error!(agent_id = %self.agent_id, task_id = %task.id, "Task failed: {:#}", e);
                TaskResult::failed(task.id, self.agent_id.clone(), format!("{:#}", e))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(agent_id = %self.agent_id, task_id = %task.id, "Task processor panicked: {}", reason);
                TaskResult::failed(
                    task.id,
                    self.agent_id.clone(),
                    format!("task processor panicked: {}", reason),
                )
            }
        };

        counter!("orion_agent_task_results_total", "status" => result.status.to_string()).increment(1);
        if let Err(e) = self
            .bus
            .publish(Topic::TaskResult, Message::TaskResult(result), self.agent_id.as_str())
            .await
        {
            error!(agent_id = %self.agent_id, task_id = %task.id, "Failed to publish task result: {}", e);
        }

        self.set_state(AgentStatus::Idle, None);
        self.emit_heartbeat_logged().await;
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn heartbeat_loop(inner: Arc<RuntimeInner>) {
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = tokio::time::sleep(inner.config.heartbeat_interval) => {}
        }

        if let Err(e) = inner.emit_heartbeat().await {
            error!(agent_id = %inner.agent_id, "Heartbeat failed: {}", e);
            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                _ = tokio::time::sleep(inner.config.error_backoff) => {}
            }
        }
    }
    debug!(agent_id = %inner.agent_id, "Heartbeat loop exited");
}

struct TaskIntake {
    name: String,
    inner: Arc<RuntimeInner>,
}

#[async_trait]
impl EventHandler for TaskIntake {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()> {
        match &envelope.payload {
            Message::TaskAssigned(task) => {
                self.inner.execute_task(task.clone()).await;
            }
            other => {
                warn!(
                    agent_id = %self.inner.agent_id,
                    kind = other.kind(),
                    "Dropping non-task payload on task topic"
                );
            }
        }
        Ok(())
    }
}
