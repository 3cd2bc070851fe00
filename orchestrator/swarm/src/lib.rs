// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `orion-swarm`: Coordination Agents
//!
//! The agents that move a goal through its phases, and the runtime they share.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `SwarmRoster` (agent id per role) |
//! | [`application`] | Application | `AgentRuntime`, `Coordinator`, `Decomposer`, `Executor`, `HeartbeatMonitor`, `Orchestrator` |
//!
//! ## Goal Lifecycle
//!
//! ```text
//! submit_goal ─► goal_started ─► Coordinator approves ─► state_change(TASK_DECOMPOSITION)
//!   ─► Decomposer stores sub-tasks ─► tasks_generated ─► Coordinator assigns
//!   ─► Executor runs each task ─► task_result ─► Coordinator records outcome
//! ```
//!
//! Every hop is an envelope on the `orion-core` event bus; agents never call
//! each other directly.

pub mod application;
pub mod domain;

pub use application::{Agent, Orchestrator, OrchestratorError};
pub use domain::*;
