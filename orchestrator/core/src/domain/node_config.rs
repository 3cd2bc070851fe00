// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for an Orion coordination node:
// - Event bus sizing (queue capacity, handler concurrency)
// - Agent roster and timing (heartbeat, backoff, feasibility delay)
// - LLM provider configuration (BYOLLM support, "env:VAR" api keys)
// - LLM selection (default alias, fallback provider, retries)
//
// Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::agent::AgentId;

pub const CONFIG_PATH_ENV: &str = "ORION_CONFIG_PATH";
pub const DEFAULT_CONFIG_FILE: &str = "orion-config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    /// LLM provider configurations
    #[serde(default)]
    pub llm_providers: Vec<LLMProviderConfig>,

    #[serde(default)]
    pub llm_selection: LLMSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Envelopes buffered per subscription; further envelopes are dropped
    /// for that subscription until it drains
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Concurrent handler invocations per subscription
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_coordinator_id")]
    pub coordinator_id: String,

    #[serde(default = "default_decomposer_id")]
    pub decomposer_id: String,

    #[serde(default = "default_executor_id")]
    pub executor_id: String,

    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// Pause after a failed heartbeat publish
    #[serde(default = "default_error_backoff", with = "humantime_serde")]
    pub error_backoff: Duration,

    /// Pause between observing a new goal and approving it
    #[serde(default = "default_feasibility_delay", with = "humantime_serde")]
    pub feasibility_delay: Duration,

    /// Advance TASK_DECOMPOSITION -> DESIGN_IMPLEMENTATION once every task is terminal
    #[serde(default = "default_true")]
    pub advance_on_completion: bool,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            coordinator_id: default_coordinator_id(),
            decomposer_id: default_decomposer_id(),
            executor_id: default_executor_id(),
            heartbeat_interval: default_heartbeat_interval(),
            error_backoff: default_error_backoff(),
            feasibility_delay: default_feasibility_delay(),
            advance_on_completion: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Unique provider name (e.g., "ollama-local", "openai")
    pub name: String,

    /// Provider type: "ollama", "openai" or "openai-compatible"
    #[serde(rename = "type")]
    pub provider_type: String,

    /// API endpoint URL
    pub endpoint: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Models served by this provider
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Alias the agents ask for (e.g., "default", "fast")
    pub alias: String,

    /// Actual model identifier for the provider API
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMSelection {
    /// Model alias the Decomposer and Executor use
    #[serde(default = "default_model_alias")]
    pub default_alias: String,

    /// Provider tried once after the primary exhausts its retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries in milliseconds (doubled per attempt)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for LLMSelection {
    fn default() -> Self {
        Self {
            default_alias: default_model_alias(),
            fallback_provider: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_in_flight() -> usize {
    64
}

fn default_coordinator_id() -> String {
    "Director".to_string()
}

fn default_decomposer_id() -> String {
    "Lyra".to_string()
}

fn default_executor_id() -> String {
    "GPTASe".to_string()
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_error_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_feasibility_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_true() -> bool {
    true
}

fn default_model_alias() -> String {
    "default".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Load configuration from YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. ORION_CONFIG_PATH environment variable
    /// 2. ./orion-config.yaml (working directory)
    pub fn discover() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from(format!("./{DEFAULT_CONFIG_FILE}"));
        if cwd.exists() {
            return Some(cwd);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::load(&path)?
        } else if let Some(path) = Self::discover() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::load(&path)?
        } else {
            tracing::warn!("No configuration file found. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ORION_HEARTBEAT_INTERVAL") {
            match humantime_serde::re::humantime::parse_duration(&val) {
                Ok(interval) => {
                    tracing::info!("Environment override: ORION_HEARTBEAT_INTERVAL={}", val);
                    self.agents.heartbeat_interval = interval;
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid value for ORION_HEARTBEAT_INTERVAL: '{}' ({}). Ignoring.",
                        val,
                        e
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("ORION_ADVANCE_ON_COMPLETION") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => self.agents.advance_on_completion = true,
                "false" | "0" | "no" | "off" => self.agents.advance_on_completion = false,
                _ => tracing::warn!(
                    "Invalid value for ORION_ADVANCE_ON_COMPLETION: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.queue_capacity == 0 {
            return Err(ConfigError::Invalid("bus.queue_capacity must be at least 1".into()));
        }
        if self.bus.max_in_flight == 0 {
            return Err(ConfigError::Invalid("bus.max_in_flight must be at least 1".into()));
        }

        let roster = [
            ("coordinator_id", &self.agents.coordinator_id),
            ("decomposer_id", &self.agents.decomposer_id),
            ("executor_id", &self.agents.executor_id),
        ];
        for (field, id) in roster {
            AgentId::new(id.as_str())
                .map_err(|e| ConfigError::Invalid(format!("agents.{field}: {e}")))?;
        }
        if self.agents.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "agents.heartbeat_interval must be greater than zero".into(),
            ));
        }

        for provider in &self.llm_providers {
            if provider.name.is_empty() {
                return Err(ConfigError::Invalid("LLM provider name cannot be empty".into()));
            }
            if provider.endpoint.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "LLM provider endpoint cannot be empty for: {}",
                    provider.name
                )));
            }
            if provider.models.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "LLM provider must have at least one model: {}",
                    provider.name
                )));
            }
            for model in &provider.models {
                if model.alias.is_empty() || model.model.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "Model alias and identifier are required in provider: {}",
                        provider.name
                    )));
                }
            }
        }

        if let Some(fallback) = &self.llm_selection.fallback_provider {
            if !self.llm_providers.iter().any(|p| &p.name == fallback) {
                return Err(ConfigError::Invalid(format!(
                    "Fallback provider '{fallback}' not found in llm_providers"
                )));
            }
        }
        if self.llm_selection.max_retries == 0 {
            return Err(ConfigError::Invalid("llm_selection.max_retries must be at least 1".into()));
        }

        Ok(())
    }
}
