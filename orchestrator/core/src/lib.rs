// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Orion Coordination Core
//!
//! In-process event bus, phase-gated workflow state machine and the domain
//! primitives shared by every agent.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - `domain`: goals, tasks, phases, bus topics and messages, ports
//! - `application`: the workflow engine
//! - `infrastructure`: event bus, in-memory repositories, LLM adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
