// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Language model provider commands
//!
//! Commands: health, aliases

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use orion_core::infrastructure::llm::ProviderRegistry;

use super::load_config;

#[derive(Subcommand)]
pub enum LlmCommand {
    /// Check that every enabled provider is reachable
    Health,

    /// List the model aliases the registry resolves
    Aliases,
}

pub async fn handle_command(command: LlmCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_override)?;
    let registry = ProviderRegistry::from_config(&config).context("Failed to build provider registry")?;

    match command {
        LlmCommand::Health => health(&registry).await,
        LlmCommand::Aliases => {
            let mut aliases = registry.available_aliases();
            aliases.sort();
            if aliases.is_empty() {
                println!("{}", "No model aliases configured.".yellow());
            }
            for alias in aliases {
                println!("  {}", alias);
            }
            Ok(())
        }
    }
}

async fn health(registry: &ProviderRegistry) -> Result<()> {
    if registry.is_empty() {
        println!("{}", "No LLM providers configured.".yellow());
        return Ok(());
    }

    let mut results: Vec<_> = registry.health_check_all().await.into_iter().collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut unhealthy = 0;
    for (name, result) in results {
        match result {
            Ok(()) => println!("  {} {}", "✓".green(), name),
            Err(e) => {
                unhealthy += 1;
                println!("  {} {}: {}", "✗".red(), name, e);
            }
        }
    }

    if unhealthy > 0 {
        anyhow::bail!("{} provider(s) failed the health check", unhealthy);
    }
    Ok(())
}
