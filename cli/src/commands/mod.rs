// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Orion CLI

pub mod config;
pub mod llm;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::llm::LlmCommand;
pub use self::run::RunArgs;

use anyhow::{Context, Result};
use orion_core::domain::node_config::NodeConfig;
use std::path::PathBuf;

/// Load configuration from the `--config` path or by discovery.
pub(crate) fn load_config(config_override: Option<PathBuf>) -> Result<NodeConfig> {
    NodeConfig::load_or_default(config_override).context("Failed to load configuration")
}
