// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates between the domain `LLMProvider` port and one
// vendor HTTP API. `ProviderRegistry` puts retries and fallback in front.

pub mod ollama;
pub mod openai;
pub mod registry;

pub use registry::ProviderRegistry;
