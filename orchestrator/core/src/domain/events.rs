// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bus Topics, Messages and Envelopes
//!
//! Every bus event travels inside an [`Envelope`]. The payload is a closed
//! [`Message`] union and each [`Topic`] accepts exactly one variant, so a
//! handler subscribed to a topic can match on the payload without guessing.
//!
//! ## Topic catalogue
//!
//! | Topic | Payload | Producer | Consumer |
//! |-------|---------|----------|----------|
//! | `workflow.goal_started` | [`GoalStarted`] | Workflow engine | Coordinator |
//! | `workflow.state_change` | [`StateChanged`] | Workflow engine | Coordinator, observers |
//! | `agent.<id>.decompose` | [`DecomposeRequest`] | Coordinator | Decomposer |
//! | `workflow.tasks_generated` | [`TasksGenerated`] | Decomposer | Coordinator |
//! | `agents.<id>.task` | [`TaskAssignment`] | Coordinator | Agent runtime |
//! | `workflow.task_result` | [`TaskResult`] | Agent runtime | Coordinator |
//! | `system.heartbeat` | [`AgentHeartbeat`] | Agent runtime | Liveness monitor |
//! | `agent.log` | [`AgentLog`] | Any agent | Log sinks |
//!
//! The `agent.` / `agents.` prefix split is part of the wire contract.
//!
//! ## Wire format
//!
//! ```json
//! {"id": "…", "topic": "workflow.goal_started",
//!  "payload": {"goal_id": "…", "title": "…", "timestamp": "…"},
//!  "timestamp": "…", "source_id": "system"}
//! ```
//!
//! The payload carries no tag; it is decoded according to the topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::agent::{AgentHeartbeat, AgentId};
use crate::domain::goal::GoalId;
use crate::domain::task::{Task, TaskId, TaskStatus};
use crate::domain::workflow::WorkflowState;

/// `source_id` used by components that are not agents (the workflow engine).
pub const SYSTEM_SOURCE: &str = "system";

// ============================================================================
// Topics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    GoalStarted,
    StateChange,
    /// Decomposition requests addressed to one decomposer
    Decompose(AgentId),
    TasksGenerated,
    /// Task assignments addressed to one agent runtime
    AgentTask(AgentId),
    TaskResult,
    Heartbeat,
    AgentLog,
}

impl Topic {
    /// True if `message` is the payload variant this topic carries.
    ///
    /// On an agent task topic an explicit `assigned_to` must name the same
    /// agent the topic addresses.
    pub fn accepts(&self, message: &Message) -> bool {
        match (self, message) {
            (Topic::GoalStarted, Message::GoalStarted(_))
            | (Topic::StateChange, Message::StateChanged(_))
            | (Topic::Decompose(_), Message::DecomposeRequested(_))
            | (Topic::TasksGenerated, Message::TasksGenerated(_))
            | (Topic::TaskResult, Message::TaskResult(_))
            | (Topic::Heartbeat, Message::Heartbeat(_))
            | (Topic::AgentLog, Message::AgentLog(_)) => true,
            (Topic::AgentTask(agent), Message::TaskAssigned(task)) => task
                .assigned_to
                .as_ref()
                .map_or(true, |assignee| assignee == agent),
            _ => false,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::GoalStarted => f.write_str("workflow.goal_started"),
            Topic::StateChange => f.write_str("workflow.state_change"),
            Topic::Decompose(agent) => write!(f, "agent.{agent}.decompose"),
            Topic::TasksGenerated => f.write_str("workflow.tasks_generated"),
            Topic::AgentTask(agent) => write!(f, "agents.{agent}.task"),
            Topic::TaskResult => f.write_str("workflow.task_result"),
            Topic::Heartbeat => f.write_str("system.heartbeat"),
            Topic::AgentLog => f.write_str("agent.log"),
        }
    }
}

impl FromStr for Topic {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || EnvelopeError::UnknownTopic(s.to_string());
        let topic = match s {
            "workflow.goal_started" => Topic::GoalStarted,
            "workflow.state_change" => Topic::StateChange,
            "workflow.tasks_generated" => Topic::TasksGenerated,
            "workflow.task_result" => Topic::TaskResult,
            "system.heartbeat" => Topic::Heartbeat,
            "agent.log" => Topic::AgentLog,
            _ => {
                let parts: Vec<&str> = s.split('.').collect();
                match parts.as_slice() {
                    ["agent", id, "decompose"] => {
                        Topic::Decompose(AgentId::new(*id).map_err(|_| unknown())?)
                    }
                    ["agents", id, "task"] => {
                        Topic::AgentTask(AgentId::new(*id).map_err(|_| unknown())?)
                    }
                    _ => return Err(unknown()),
                }
            }
        };
        Ok(topic)
    }
}

impl TryFrom<String> for Topic {
    type Error = EnvelopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalStarted {
    pub goal_id: GoalId,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

/// Record of a committed phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChanged {
    pub goal_id: GoalId,
    pub previous_state: WorkflowState,
    pub new_state: WorkflowState,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecomposeRequest {
    pub goal_id: GoalId,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksGenerated {
    pub goal_id: GoalId,
    pub task_count: usize,
}

/// Work item delivered on `agents.<id>.task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<AgentId>,
}

impl From<&Task> for TaskAssignment {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            kind: task.kind.clone(),
            title: task.title.clone(),
            payload: task.payload.clone(),
            assigned_to: task.assigned_to.clone(),
        }
    }
}

/// Outcome of one task execution. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub agent_id: AgentId,
}

impl TaskResult {
    pub fn completed(task_id: TaskId, agent_id: AgentId, result: Value) -> Self {
        Self {
            task_id,
            status: TaskStatus::Completed,
            result: Some(result),
            error: None,
            agent_id,
        }
    }

    pub fn failed(task_id: TaskId, agent_id: AgentId, error: impl Into<String>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            result: None,
            error: Some(error.into()),
            agent_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLog {
    pub agent_id: AgentId,
    pub level: LogLevel,
    pub message: String,
}

// ============================================================================
// Message union
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    GoalStarted(GoalStarted),
    StateChanged(StateChanged),
    DecomposeRequested(DecomposeRequest),
    TasksGenerated(TasksGenerated),
    TaskAssigned(TaskAssignment),
    TaskResult(TaskResult),
    Heartbeat(AgentHeartbeat),
    AgentLog(AgentLog),
}

impl Message {
    /// Decode an untagged JSON payload using the topic it arrived on.
    pub fn decode(topic: &Topic, payload: Value) -> Result<Self, EnvelopeError> {
        let invalid = |source| EnvelopeError::InvalidPayload {
            topic: topic.to_string(),
            source,
        };
        let message = match topic {
            Topic::GoalStarted => Message::GoalStarted(serde_json::from_value(payload).map_err(invalid)?),
            Topic::StateChange => Message::StateChanged(serde_json::from_value(payload).map_err(invalid)?),
            Topic::Decompose(_) => {
                Message::DecomposeRequested(serde_json::from_value(payload).map_err(invalid)?)
            }
            Topic::TasksGenerated => {
                Message::TasksGenerated(serde_json::from_value(payload).map_err(invalid)?)
            }
            Topic::AgentTask(_) => Message::TaskAssigned(serde_json::from_value(payload).map_err(invalid)?),
            Topic::TaskResult => Message::TaskResult(serde_json::from_value(payload).map_err(invalid)?),
            Topic::Heartbeat => Message::Heartbeat(serde_json::from_value(payload).map_err(invalid)?),
            Topic::AgentLog => Message::AgentLog(serde_json::from_value(payload).map_err(invalid)?),
        };
        Ok(message)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::GoalStarted(_) => "GoalStarted",
            Message::StateChanged(_) => "StateChanged",
            Message::DecomposeRequested(_) => "DecomposeRequested",
            Message::TasksGenerated(_) => "TasksGenerated",
            Message::TaskAssigned(_) => "TaskAssigned",
            Message::TaskResult(_) => "TaskResult",
            Message::Heartbeat(_) => "Heartbeat",
            Message::AgentLog(_) => "AgentLog",
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Immutable bus event. Handlers receive it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct Envelope {
    pub id: Uuid,
    pub topic: Topic,
    pub payload: Message,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
}

impl Envelope {
    /// Wrap a payload, checking that it belongs on `topic`.
    pub fn new(
        topic: Topic,
        payload: Message,
        source_id: impl Into<String>,
    ) -> Result<Self, EnvelopeError> {
        if !topic.accepts(&payload) {
            return Err(EnvelopeError::PayloadMismatch {
                topic: topic.to_string(),
                kind: payload.kind(),
            });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            topic,
            payload,
            timestamp: Utc::now(),
            source_id: source_id.into(),
        })
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    id: Uuid,
    topic: String,
    payload: Value,
    timestamp: DateTime<Utc>,
    source_id: String,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let topic: Topic = raw.topic.parse()?;
        let payload = Message::decode(&topic, raw.payload)?;
        if !topic.accepts(&payload) {
            return Err(EnvelopeError::PayloadMismatch {
                topic: topic.to_string(),
                kind: payload.kind(),
            });
        }
        Ok(Self {
            id: raw.id,
            topic,
            payload,
            timestamp: raw.timestamp,
            source_id: raw.source_id,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("Payload {kind} is not accepted on topic '{topic}'")]
    PayloadMismatch { topic: String, kind: &'static str },

    #[error("Invalid payload for topic '{topic}': {source}")]
    InvalidPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}
