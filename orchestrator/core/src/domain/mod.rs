// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: records, value objects and the ports the application layer
//! depends on. Nothing in here performs I/O.

pub mod agent;
pub mod events;
pub mod goal;
pub mod guards;
pub mod llm;
pub mod node_config;
pub mod repository;
pub mod task;
pub mod workflow;
