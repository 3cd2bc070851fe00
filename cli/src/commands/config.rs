// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use orion_core::domain::node_config::{NodeConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE};

use super::load_config;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write the default configuration as YAML
    Generate {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, force } => generate(output, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = load_config(config_override.clone())?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./{}", DEFAULT_CONFIG_FILE);
        println!();
    }

    println!("{}", "Agents:".bold());
    println!("  Coordinator: {}", config.agents.coordinator_id);
    println!("  Decomposer:  {}", config.agents.decomposer_id);
    println!("  Executor:    {}", config.agents.executor_id);
    println!("  Heartbeat:   {:?}", config.agents.heartbeat_interval);
    println!("  Advance on completion: {}", config.agents.advance_on_completion);
    println!();

    println!("{}", "Event Bus:".bold());
    println!("  Queue capacity: {}", config.bus.queue_capacity);
    println!("  Max in flight:  {}", config.bus.max_in_flight);
    println!();

    println!("{}", "LLM Providers:".bold());
    if config.llm_providers.is_empty() {
        println!("  {}", "(none, agents produce placeholder output)".dimmed());
    }
    for provider in &config.llm_providers {
        let state = if provider.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!("  {} ({}, {})", provider.name.bold(), provider.provider_type, state);
        println!("    Endpoint: {}", provider.endpoint);
        for model in &provider.models {
            println!("      - {} → {}", model.alias, model.model);
        }
    }
    println!();

    println!("{}", "LLM Selection:".bold());
    println!("  Default alias: {}", config.llm_selection.default_alias);
    if let Some(fallback) = &config.llm_selection.fallback_provider {
        println!("  Fallback provider: {}", fallback);
    }
    println!("  Max retries: {}", config.llm_selection.max_retries);

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    // Loading validates.
    load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to replace it)", output.display());
    }

    let yaml = NodeConfig::default()
        .to_yaml_string()
        .context("Failed to render default configuration")?;
    std::fs::write(&output, yaml)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );
    Ok(())
}
