// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Text Generation Port
//!
//! Domain interface for the natural-language generation capability used by
//! the Decomposer and Executor agents. Vendor HTTP bindings live in
//! `crate::infrastructure::llm`.
//!
//! Structured generation passes a JSON schema through
//! [`GenerationOptions::response_schema`]; providers that support constrained
//! output forward it, and [`parse_structured`] turns the returned text into a
//! typed value either way.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Domain interface for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the LLM
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError>;

    /// Check if provider is healthy and accessible
    async fn health_check(&self) -> Result<(), LLMError>;
}

/// Options for LLM generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,

    /// Sequences that stop generation
    pub stop_sequences: Option<Vec<String>>,

    /// JSON schema the completion must conform to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(4096),
            temperature: Some(0.7),
            stop_sequences: None,
            response_schema: None,
        }
    }
}

impl GenerationOptions {
    /// Request JSON output shaped like `T`.
    pub fn structured<T: JsonSchema>() -> Self {
        Self {
            response_schema: Some(schema_for::<T>()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Generated text
    pub text: String,

    pub usage: TokenUsage,

    /// Provider name (e.g., "openai", "ollama")
    pub provider: String,

    /// Model used (e.g., "gpt-4o", "llama3.2")
    pub model: String,

    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason why generation stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural completion (model decided to stop)
    Stop,

    /// Hit max_tokens limit
    Length,

    /// Blocked by content filter
    ContentFilter,
}

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The completion did not match the requested structure.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LLMError {
    /// Whether a retry against the same provider may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LLMError::Network(_) | LLMError::RateLimit | LLMError::Provider(_))
    }
}

/// JSON schema of `T` as a plain JSON value.
pub fn schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}

/// Parse a completion as JSON, tolerating a surrounding Markdown code fence.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, LLMError> {
    let trimmed = strip_code_fence(text.trim());
    serde_json::from_str(trimmed).map_err(|e| LLMError::InvalidResponse(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Generate and parse a structured completion in one call.
pub async fn generate_structured<T>(
    provider: &dyn LLMProvider,
    prompt: &str,
) -> Result<T, LLMError>
where
    T: JsonSchema + DeserializeOwned,
{
    let options = GenerationOptions::structured::<T>();
    let response = provider.generate(prompt, &options).await?;
    parse_structured(&response.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Outcome {
        summary: String,
        output: String,
    }

    #[test]
    fn test_parse_plain_json() {
        let parsed: Outcome = parse_structured(r#"{"summary": "s", "output": "o"}"#).unwrap();
        assert_eq!(parsed.summary, "s");
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"summary\": \"s\", \"output\": \"o\"}\n```\n";
        let parsed: Outcome = parse_structured(text).unwrap();
        assert_eq!(parsed.output, "o");
    }

    #[test]
    fn test_parse_prose_is_invalid_response() {
        let err = parse_structured::<Outcome>("Here is the answer").unwrap_err();
        assert!(matches!(err, LLMError::InvalidResponse(_)));
    }

    #[test]
    fn test_structured_options_carry_schema() {
        let options = GenerationOptions::structured::<Outcome>();
        let schema = options.response_schema.unwrap();
        assert!(schema["properties"]["summary"].is_object());
        assert_eq!(options.temperature, Some(0.7));
    }
}
