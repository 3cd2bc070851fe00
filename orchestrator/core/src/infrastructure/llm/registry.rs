// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Registry - Model Alias Resolution and Provider Management
//
// Resolves model aliases to provider instances and wraps every call with
// retries (exponential backoff) and a single fallback attempt. The registry
// is itself an `LLMProvider` that serves the configured default alias, so the
// agents never see more than one provider.

use crate::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider};
use crate::domain::node_config::{LLMProviderConfig, LLMSelection, NodeConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
    alias_map: HashMap<String, String>, // alias -> provider_name
    default_alias: String,
    fallback_provider: Option<String>,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl ProviderRegistry {
    /// Empty registry using the given selection policy
    pub fn new(selection: &LLMSelection) -> Self {
        Self {
            providers: HashMap::new(),
            alias_map: HashMap::new(),
            default_alias: selection.default_alias.clone(),
            fallback_provider: selection.fallback_provider.clone(),
            max_retries: selection.max_retries.max(1),
            retry_delay_ms: selection.retry_delay_ms,
        }
    }

    /// Create provider registry from node configuration
    pub fn from_config(config: &NodeConfig) -> anyhow::Result<Self> {
        let mut registry = Self::new(&config.llm_selection);

        info!("Initializing LLM provider registry");

        for provider_config in &config.llm_providers {
            if !provider_config.enabled {
                info!("Provider '{}' disabled, skipping", provider_config.name);
                continue;
            }

            match Self::create_provider(provider_config) {
                Ok(provider) => {
                    let aliases: Vec<&str> =
                        provider_config.models.iter().map(|m| m.alias.as_str()).collect();
                    registry.register(&provider_config.name, provider, &aliases);
                }
                Err(e) => {
                    warn!("Failed to initialize provider '{}': {}", provider_config.name, e);
                }
            }
        }

        if registry.providers.is_empty() {
            warn!("No LLM providers configured - agents will fall back to default output");
        }

        Ok(registry)
    }

    /// Add a provider instance and map `aliases` to it
    pub fn register(&mut self, name: &str, provider: Arc<dyn LLMProvider>, aliases: &[&str]) {
        for alias in aliases {
            info!("Mapping alias '{}' -> {}", alias, name);
            self.alias_map.insert((*alias).to_string(), name.to_string());
        }
        self.providers.insert(name.to_string(), provider);
    }

    fn create_provider(config: &LLMProviderConfig) -> anyhow::Result<Arc<dyn LLMProvider>> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let model = config
            .models
            .first()
            .ok_or_else(|| anyhow::anyhow!("No models configured"))?
            .model
            .clone();

        let provider: Arc<dyn LLMProvider> = match config.provider_type.as_str() {
            "ollama" => Arc::new(OllamaAdapter::new(config.endpoint.clone(), model)),
            // OpenAI-compatible APIs (LM Studio, vLLM, etc.)
            "openai" | "openai-compatible" => Arc::new(
                OpenAIAdapter::new(config.endpoint.clone(), api_key, model)
                    .with_provider_name(&config.name),
            ),
            other => anyhow::bail!("Unsupported provider type: {}", other),
        };

        Ok(provider)
    }

    /// Generate text using a model alias
    pub async fn generate_with_alias(
        &self,
        alias: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        let provider_name = self
            .alias_map
            .get(alias)
            .ok_or_else(|| LLMError::ModelNotFound(format!("Model alias '{}' not found", alias)))?;
        let provider = self.providers.get(provider_name).ok_or_else(|| {
            LLMError::Provider(format!("Provider '{}' not found", provider_name))
        })?;

        let mut last_error = None;
        for attempt in 0..self.max_retries {
            match provider.generate(prompt, options).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        "Generation failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    let transient = e.is_transient();
                    last_error = Some(e);
                    if !transient || attempt + 1 == self.max_retries {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(
                        self.retry_delay_ms.saturating_mul(2_u64.saturating_pow(attempt)),
                    ))
                    .await;
                }
            }
        }

        if let Some(fallback) = self.fallback_provider.as_ref().filter(|f| *f != provider_name) {
            if let Some(fallback_provider) = self.providers.get(fallback) {
                info!("Trying fallback provider: {}", fallback);
                return fallback_provider.generate(prompt, options).await;
            }
        }

        Err(last_error.unwrap_or_else(|| LLMError::Provider("Unknown error".into())))
    }

    /// Check health of all providers
    pub async fn health_check_all(&self) -> HashMap<String, Result<(), LLMError>> {
        let mut results = HashMap::new();
        for (name, provider) in &self.providers {
            info!("Health checking provider: {}", name);
            results.insert(name.clone(), provider.health_check().await);
        }
        results
    }

    pub fn available_aliases(&self) -> Vec<String> {
        self.alias_map.keys().cloned().collect()
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.alias_map.contains_key(alias)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl LLMProvider for ProviderRegistry {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        self.generate_with_alias(&self.default_alias, prompt, options)
            .await
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let provider_name = self.alias_map.get(&self.default_alias).ok_or_else(|| {
            LLMError::ModelNotFound(format!("Model alias '{}' not found", self.default_alias))
        })?;
        match self.providers.get(provider_name) {
            Some(provider) => provider.health_check().await,
            None => Err(LLMError::Provider(format!(
                "Provider '{}' not found",
                provider_name
            ))),
        }
    }
}

/// Resolve API key from config (supports "env:VAR_NAME" syntax)
fn resolve_api_key(key: Option<&str>) -> anyhow::Result<String> {
    match key {
        Some(k) => match k.strip_prefix("env:") {
            Some(var_name) => std::env::var(var_name)
                .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
            None => Ok(k.to_string()),
        },
        // Local providers run without auth
        None => Ok(String::new()),
    }
}
