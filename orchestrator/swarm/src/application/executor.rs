// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Executor Agent
//!
//! Carries out assigned tasks with one structured generation call each and
//! reports `"<summary> | <first 50 chars of output>..."` as the result.
//! Generation errors are returned to the runtime, which turns them into
//! `FAILED` results.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use orion_core::domain::agent::AgentId;
use orion_core::domain::events::{LogLevel, TaskAssignment};
use orion_core::domain::llm::{parse_structured, GenerationOptions, LLMProvider};
use orion_core::domain::node_config::AgentsConfig;
use orion_core::infrastructure::event_bus::EventBus;

use super::runtime::{announce, AgentRuntime, RuntimeConfig, RuntimeError, TaskProcessor};
use super::Agent;

/// Characters of raw output kept in the reported result.
const PREVIEW_CHARS: usize = 50;

/// Structured output requested from the model.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct TaskOutcome {
    pub summary: String,
    pub output: String,
}

impl TaskOutcome {
    /// Accept structured output, or keep free text as the output.
    fn from_completion(text: &str) -> Self {
        parse_structured(text).unwrap_or_else(|_| Self {
            summary: "Generated content.".to_string(),
            output: text.to_string(),
        })
    }

    fn report(&self) -> String {
        let preview: String = self.output.chars().take(PREVIEW_CHARS).collect();
        format!("{} | {}...", self.summary, preview)
    }
}

pub struct Executor {
    runtime: AgentRuntime,
}

impl Executor {
    pub fn new(
        agent_id: AgentId,
        bus: EventBus,
        llm: Option<Arc<dyn LLMProvider>>,
        config: &AgentsConfig,
    ) -> Self {
        let processor = Arc::new(ExecutionProcessor {
            agent_id: agent_id.clone(),
            bus: bus.clone(),
            llm,
        });
        Self {
            runtime: AgentRuntime::new(agent_id, bus, processor, RuntimeConfig::from(config)),
        }
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }
}

#[async_trait]
impl Agent for Executor {
    fn agent_id(&self) -> &AgentId {
        self.runtime.agent_id()
    }

    async fn start(&self) -> Result<(), RuntimeError> {
        self.runtime.start().await
    }

    async fn stop(&self) {
        self.runtime.stop().await
    }
}

pub struct ExecutionProcessor {
    agent_id: AgentId,
    bus: EventBus,
    llm: Option<Arc<dyn LLMProvider>>,
}

impl ExecutionProcessor {
    async fn outcome(&self, task: &TaskAssignment) -> anyhow::Result<TaskOutcome> {
        let Some(llm) = &self.llm else {
            return Ok(TaskOutcome {
                summary: format!("Executed {}", task.title),
                output: "Mock output content.".to_string(),
            });
        };

        let prompt = format!(
            "You are {}, an expert autonomous agent. Execute the assigned task strictly based on \
             the inputs. Provide a summary and the detailed output.\nTask: {}\nDetails: {}",
            self.agent_id, task.title, task.payload
        );
        let response = llm
            .generate(&prompt, &GenerationOptions::structured::<TaskOutcome>())
            .await?;
        announce(
            &self.bus,
            &self.agent_id,
            LogLevel::Success,
            "Language model completed task.",
        )
        .await;
        Ok(TaskOutcome::from_completion(&response.text))
    }
}

#[async_trait]
impl TaskProcessor for ExecutionProcessor {
    async fn process_task(&self, task: &TaskAssignment) -> anyhow::Result<Value> {
        announce(
            &self.bus,
            &self.agent_id,
            LogLevel::Info,
            format!("Starting execution of '{}'...", task.title),
        )
        .await;

        let outcome = self.outcome(task).await?;

        announce(
            &self.bus,
            &self.agent_id,
            LogLevel::Success,
            format!("Completed '{}'.", task.title),
        )
        .await;
        Ok(Value::String(outcome.report()))
    }
}
