// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm Application Layer
//!
//! Agent runtime, the three coordination agents, liveness tracking and the
//! orchestrator that wires them together.

pub mod coordinator;
pub mod decomposer;
pub mod executor;
pub mod liveness;
pub mod orchestrator;
pub mod runtime;

use async_trait::async_trait;
use orion_core::domain::agent::AgentId;

pub use coordinator::Coordinator;
pub use decomposer::Decomposer;
pub use executor::Executor;
pub use liveness::HeartbeatMonitor;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use runtime::{AgentRuntime, RuntimeConfig, RuntimeError, TaskProcessor};

/// A bus participant with a start/stop lifecycle.
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_id(&self) -> &AgentId;

    async fn start(&self) -> Result<(), RuntimeError>;

    /// Release subscriptions and stop heartbeating. In-flight work finishes.
    async fn stop(&self);
}
