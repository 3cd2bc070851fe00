// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Domain Model
//!
//! This module defines the fixed phase graph every Goal moves through.
//!
//! # Architectural Context
//!
//! - **Bounded Context:** Workflow Context
//! - **Aggregate Root:** Goal (the phase lives on the goal)
//! - **Mutated by:** `crate::application::workflow_engine::WorkflowEngine`
//!
//! # Phase Graph
//!
//! | From | Allowed targets |
//! |------|-----------------|
//! | `INITIALIZATION` | `TASK_DECOMPOSITION` |
//! | `TASK_DECOMPOSITION` | `DESIGN_IMPLEMENTATION` |
//! | `DESIGN_IMPLEMENTATION` | `EXECUTION_MONITORING` |
//! | `EXECUTION_MONITORING` | `META_COMMUNICATION`, `INTEGRATION`, `EXECUTION_MONITORING`, `SUSPENDED` |
//! | `META_COMMUNICATION` | `EXECUTION_MONITORING`, `INITIALIZATION` |
//! | `INTEGRATION` | `COMPLETED` |
//! | `SUSPENDED` | `INITIALIZATION`, `EXECUTION_MONITORING` (manual recovery) |
//! | `COMPLETED` | none |
//!
//! The graph is static; a transition is legal iff the target is listed in
//! [`WorkflowState::allowed_targets`] of the current phase.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Value Objects: Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Initialization,
    TaskDecomposition,
    DesignImplementation,
    ExecutionMonitoring,
    MetaCommunication,
    Integration,
    Suspended,
    Completed,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 8] = [
        Self::Initialization,
        Self::TaskDecomposition,
        Self::DesignImplementation,
        Self::ExecutionMonitoring,
        Self::MetaCommunication,
        Self::Integration,
        Self::Suspended,
        Self::Completed,
    ];

    /// Legal next phases (adjacency list of the phase graph)
    pub fn allowed_targets(self) -> &'static [WorkflowState] {
        use WorkflowState::*;
        match self {
            Initialization => &[TaskDecomposition],
            TaskDecomposition => &[DesignImplementation],
            DesignImplementation => &[ExecutionMonitoring],
            ExecutionMonitoring => &[
                MetaCommunication,
                Integration,
                ExecutionMonitoring,
                Suspended,
            ],
            MetaCommunication => &[ExecutionMonitoring, Initialization],
            Integration => &[Completed],
            Suspended => &[Initialization, ExecutionMonitoring],
            Completed => &[],
        }
    }

    pub fn can_transition_to(self, target: WorkflowState) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Check if a phase is terminal (no outgoing transitions)
    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialization => "INITIALIZATION",
            Self::TaskDecomposition => "TASK_DECOMPOSITION",
            Self::DesignImplementation => "DESIGN_IMPLEMENTATION",
            Self::ExecutionMonitoring => "EXECUTION_MONITORING",
            Self::MetaCommunication => "META_COMMUNICATION",
            Self::Integration => "INTEGRATION",
            Self::Suspended => "SUSPENDED",
            Self::Completed => "COMPLETED",
        }
    }

    /// Validate an edge of the phase graph.
    pub fn validate_transition(self, target: WorkflowState) -> Result<(), TransitionError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(TransitionError::IllegalTransition {
                from: self,
                to: target,
            })
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = UnknownWorkflowState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownWorkflowState(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown workflow state '{0}'")]
pub struct UnknownWorkflowState(pub String);

// ============================================================================
// Domain Errors
// ============================================================================

/// A phase transition was refused, either by the graph or by a guard.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Invalid transition: {from} -> {to}")]
    IllegalTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error("Transition rejected by guard '{guard}': {reason}")]
    GuardRejected { guard: String, reason: String },

    #[error("Guard '{guard}' raised error: {source}")]
    GuardFailed {
        guard: String,
        #[source]
        source: anyhow::Error,
    },
}
