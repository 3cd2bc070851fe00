// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Decomposer Agent
//!
//! Splits a goal into three to five typed sub-tasks using structured
//! generation, persists them in one batch and announces
//! `workflow.tasks_generated`.
//!
//! Generation never blocks progress: a failed call, unparseable output or
//! an empty list all degrade to a single `Research (Fallback)` task. Without
//! a provider the decomposer emits a fixed research and implementation pair.

use async_trait::async_trait;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use orion_core::domain::agent::AgentId;
use orion_core::domain::events::{
    DecomposeRequest, Envelope, LogLevel, Message, TaskAssignment, TasksGenerated, Topic,
};
use orion_core::domain::llm::{generate_structured, LLMProvider};
use orion_core::domain::node_config::AgentsConfig;
use orion_core::domain::repository::{GoalRepository, TaskRepository};
use orion_core::domain::task::Task;
use orion_core::infrastructure::event_bus::{EventBus, EventHandler, Subscription};

use super::runtime::{announce, AgentRuntime, RuntimeConfig, RuntimeError, TaskProcessor};
use super::Agent;

/// Upper bound on sub-tasks kept from one decomposition.
pub const MAX_TASKS: usize = 5;

/// Task types a decomposition may produce.
pub const TASK_KINDS: [&str; 4] = ["RESEARCH", "DESIGN", "CODING", "REVIEW"];

/// Structured output requested from the model.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct TaskDecomposition {
    pub tasks: Vec<TaskDraft>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct TaskDraft {
    pub title: String,
    /// One of RESEARCH, DESIGN, CODING, REVIEW
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

impl TaskDraft {
    fn new(title: impl Into<String>, kind: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: kind.to_string(),
            description: description.into(),
        }
    }

    fn into_task(self, request: &DecomposeRequest) -> Task {
        let kind = normalize_kind(&self.kind, &self.title);
        Task::new(
            request.goal_id,
            self.title,
            kind,
            json!({ "description": self.description }),
        )
    }
}

pub struct Decomposer {
    runtime: AgentRuntime,
    inner: Arc<DecomposerInner>,
    subscription: Mutex<Option<Subscription>>,
}

struct DecomposerInner {
    agent_id: AgentId,
    bus: EventBus,
    goals: Arc<dyn GoalRepository>,
    tasks: Arc<dyn TaskRepository>,
    llm: Option<Arc<dyn LLMProvider>>,
}

impl Decomposer {
    pub fn new(
        agent_id: AgentId,
        bus: EventBus,
        goals: Arc<dyn GoalRepository>,
        tasks: Arc<dyn TaskRepository>,
        llm: Option<Arc<dyn LLMProvider>>,
        config: &AgentsConfig,
    ) -> Self {
        let inner = Arc::new(DecomposerInner {
            agent_id: agent_id.clone(),
            bus: bus.clone(),
            goals,
            tasks,
            llm,
        });
        let runtime = AgentRuntime::new(agent_id, bus, Arc::new(DirectInbox), RuntimeConfig::from(config));
        Self {
            runtime,
            inner,
            subscription: Mutex::new(None),
        }
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    /// Decompose one goal outside the bus, returning the number of tasks stored.
    pub async fn decompose(&self, request: &DecomposeRequest) -> anyhow::Result<usize> {
        self.inner.decompose(request).await
    }
}

#[async_trait]
impl Agent for Decomposer {
    fn agent_id(&self) -> &AgentId {
        self.runtime.agent_id()
    }

    async fn start(&self) -> Result<(), RuntimeError> {
        self.runtime.start().await?;
        let subscription = self.inner.bus.subscribe(
            Topic::Decompose(self.inner.agent_id.clone()),
            Arc::new(DecomposeIntake {
                name: format!("{}.decompose", self.inner.agent_id),
                inner: self.inner.clone(),
            }),
        );
        *self.subscription.lock() = Some(subscription);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
        self.runtime.stop().await;
    }
}

struct DirectInbox;

#[async_trait]
impl TaskProcessor for DirectInbox {
    async fn process_task(&self, _task: &TaskAssignment) -> anyhow::Result<Value> {
        Ok(json!({ "status": "ok" }))
    }
}

struct DecomposeIntake {
    name: String,
    inner: Arc<DecomposerInner>,
}

#[async_trait]
impl EventHandler for DecomposeIntake {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()> {
        let Message::DecomposeRequested(request) = &envelope.payload else {
            return Ok(());
        };
        self.inner.decompose(request).await.map(|_| ())
    }
}

impl DecomposerInner {
    async fn log(&self, level: LogLevel, message: impl Into<String>) {
        announce(&self.bus, &self.agent_id, level, message).await
    }

    async fn decompose(&self, request: &DecomposeRequest) -> anyhow::Result<usize> {
        self.log(
            LogLevel::Info,
            format!("Starting task decomposition for '{}'...", request.title),
        )
        .await;

        if self.goals.find_by_id(request.goal_id).await?.is_none() {
            self.log(
                LogLevel::Error,
                format!("Goal {} not found during decomposition.", request.goal_id),
            )
            .await;
            return Ok(0);
        }

        let tasks: Vec<Task> = self
            .draft(request)
            .await
            .into_iter()
            .map(|draft| draft.into_task(request))
            .collect();

        if let Err(e) = self.tasks.save_all(&tasks).await {
            self.log(LogLevel::Error, format!("Failed to save tasks: {}", e)).await;
            return Err(e.into());
        }
        self.log(
            LogLevel::Success,
            format!("Decomposed goal into {} tasks.", tasks.len()),
        )
        .await;

        let generated = Message::TasksGenerated(TasksGenerated {
            goal_id: request.goal_id,
            task_count: tasks.len(),
        });
        self.bus
            .publish(Topic::TasksGenerated, generated, self.agent_id.as_str())
            .await?;
        Ok(tasks.len())
    }

    async fn draft(&self, request: &DecomposeRequest) -> Vec<TaskDraft> {
        let Some(llm) = &self.llm else {
            return vec![
                TaskDraft::new(format!("Research {}", request.title), "RESEARCH", "Default task"),
                TaskDraft::new(format!("Implement {}", request.title), "CODING", "Default task"),
            ];
        };

        self.log(LogLevel::Info, "Consulting language model...").await;
        let prompt = decomposition_prompt(&self.agent_id, request);
        match generate_structured::<TaskDecomposition>(llm.as_ref(), &prompt).await {
            Ok(decomposition) if !decomposition.tasks.is_empty() => {
                let mut drafts = decomposition.tasks;
                drafts.truncate(MAX_TASKS);
                self.log(
                    LogLevel::Success,
                    format!("Generated {} tasks.", drafts.len()),
                )
                .await;
                drafts
            }
            Ok(_) => {
                self.log(LogLevel::Warning, "Model returned no tasks. Using fallback.")
                    .await;
                vec![fallback_draft()]
            }
            Err(e) => {
                self.log(LogLevel::Error, format!("LLM error: {}", e)).await;
                vec![fallback_draft()]
            }
        }
    }
}

fn decomposition_prompt(agent_id: &AgentId, request: &DecomposeRequest) -> String {
    format!(
        "Goal: {}\nContext: {}\nYou are {}, a task decomposition expert. Break down the following \
         goal into 3-5 distinct, executable technical tasks. Types: RESEARCH, DESIGN, CODING, \
         REVIEW. Return JSON matching the schema.",
        request.title, request.description, agent_id
    )
}

/// Uppercase `raw`; anything outside [`TASK_KINDS`] becomes RESEARCH.
fn normalize_kind(raw: &str, title: &str) -> String {
    let kind = raw.trim().to_ascii_uppercase();
    if TASK_KINDS.contains(&kind.as_str()) {
        kind
    } else {
        warn!(kind = %raw, title = %title, "Unknown task type from model, using RESEARCH");
        "RESEARCH".to_string()
    }
}

fn fallback_draft() -> TaskDraft {
    TaskDraft::new(
        "Research (Fallback)",
        "RESEARCH",
        "Investigation needed due to LLM error.",
    )
}
