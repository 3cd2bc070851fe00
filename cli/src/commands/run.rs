// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Run one goal through an in-process swarm
//!
//! Starts the node, streams `agent.log` to the terminal, submits the goal and
//! waits until every generated task has settled (or the timeout elapses),
//! then prints the final task table.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use orion_core::domain::events::{AgentLog, LogLevel, Message, Topic};
use orion_core::domain::llm::LLMProvider;
use orion_core::domain::repository::TaskRepository;
use orion_core::domain::task::{Task, TaskStatus};
use orion_core::domain::workflow::WorkflowState;
use orion_core::infrastructure::llm::ProviderRegistry;
use orion_swarm::Orchestrator;

use super::load_config;

#[derive(Args)]
pub struct RunArgs {
    /// Goal title
    #[arg(long)]
    title: String,

    /// Goal description
    #[arg(long)]
    description: String,

    /// Seconds to wait for the goal's tasks to settle
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Skip language model providers and use placeholder output
    #[arg(long)]
    offline: bool,

    /// Print the final tasks as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: RunArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_override)?;

    let llm: Option<Arc<dyn LLMProvider>> = if args.offline {
        None
    } else {
        let registry = ProviderRegistry::from_config(&config)
            .context("Failed to build provider registry")?;
        if registry.is_empty() {
            warn!("No LLM provider available, running with placeholder output");
            None
        } else {
            Some(Arc::new(registry))
        }
    };

    let swarm = Orchestrator::new(&config, llm).context("Failed to build swarm")?;
    let console = swarm.bus().subscribe_fn(Topic::AgentLog, "cli-console", |envelope| async move {
        if let Message::AgentLog(log) = &envelope.payload {
            print_log(log);
        }
        Ok::<(), anyhow::Error>(())
    });
    swarm.start().await.context("Failed to start swarm")?;

    let goal_id = swarm
        .submit_goal(&args.title, &args.description)
        .await
        .context("Failed to submit goal")?;
    println!("{} {}", "Goal submitted:".bold(), goal_id);

    let timeout = Duration::from_secs(args.timeout);
    let settled = tokio::select! {
        settled = swarm.await_settled(goal_id, timeout) => settled?,
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "Interrupted.".yellow());
            false
        }
    };
    if settled && config.agents.advance_on_completion {
        // The phase change follows the last result asynchronously.
        swarm
            .await_phase(goal_id, WorkflowState::DesignImplementation, Duration::from_secs(5))
            .await?;
    }

    let goal = swarm.engine().get_goal(goal_id).await?;
    let tasks = swarm.tasks().find_by_goal(goal_id).await?;
    swarm.stop().await;
    console.unsubscribe();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else {
        println!();
        println!("{} {} ({})", "Goal:".bold(), goal.title, goal.phase());
        print_tasks(&tasks);
    }

    if !settled {
        anyhow::bail!("Goal {} did not settle within {}s", goal_id, args.timeout);
    }
    Ok(())
}

fn print_log(log: &AgentLog) {
    let level = match log.level {
        LogLevel::Debug => log.level.to_string().dimmed(),
        LogLevel::Info => log.level.to_string().blue(),
        LogLevel::Success => log.level.to_string().green(),
        LogLevel::Warning => log.level.to_string().yellow(),
        LogLevel::Error => log.level.to_string().red(),
    };
    println!("[{}] {:<8} {}", log.agent_id.to_string().bold(), level, log.message);
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("  {}", "(no tasks)".dimmed());
        return;
    }
    for task in tasks {
        let status = match task.status() {
            TaskStatus::Completed => task.status().to_string().green(),
            TaskStatus::Failed => task.status().to_string().red(),
            _ => task.status().to_string().yellow(),
        };
        println!("  {:<10} {:<9} {}", status, task.kind, task.title);
        if let Some(result) = &task.result {
            println!("             {}", result.to_string().dimmed());
        }
    }
}
