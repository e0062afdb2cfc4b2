//! Generative backend used by the LLM secondary extractor and by batch
//! enrichment.
//!
//! Anthropic and OpenAI models are reached through rig-core; `RigAdapter`
//! turns a rig completion model into an [`LlmProvider`]. No backend is built
//! unless `LLM_API_KEY` is set.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "gpt" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Read `LLM_BACKEND`, `LLM_API_KEY` and `LLM_MODEL`.
    ///
    /// Returns `Ok(None)` when no API key is set: the LLM stages are optional.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(key) = std::env::var("LLM_API_KEY") else {
            return Ok(None);
        };
        if key.trim().is_empty() {
            return Ok(None);
        }
        let backend_raw = std::env::var("LLM_BACKEND").unwrap_or_else(|_| "anthropic".into());
        let backend = LlmBackend::parse(&backend_raw).ok_or_else(|| ConfigError::InvalidValue {
            key: "LLM_BACKEND".to_string(),
            message: format!("unknown backend '{backend_raw}'"),
        })?;
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| match backend {
            LlmBackend::Anthropic => "claude-3-5-haiku-latest".to_string(),
            LlmBackend::OpenAi => "gpt-4o-mini".to_string(),
        });
        Ok(Some(Self {
            backend,
            api_key: secrecy::SecretString::from(key),
            model,
        }))
    }
}

/// Build the provider for the configured backend.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn client_error(provider: &str, e: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason: format!("client setup: {e}"),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret())
            .map_err(|e| client_error("anthropic", e))?;
    tracing::info!(backend = "anthropic", model = %config.model, "LLM backend ready");
    Ok(Arc::new(RigAdapter::new(
        client.completion_model(&config.model),
        &config.model,
    )))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret())
            .map_err(|e| client_error("openai", e))?;
    tracing::info!(backend = "openai", model = %config.model, "LLM backend ready");
    Ok(Arc::new(RigAdapter::new(
        client.completion_model(&config.model),
        &config.model,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_provider_constructs_without_network() {
        // rig-core clients accept any string as API key at construction time.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-3-5-haiku-latest".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "claude-3-5-haiku-latest");
    }

    #[test]
    fn openai_provider_constructs_without_network() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o-mini".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4o-mini");
    }

    #[test]
    fn backend_names() {
        assert_eq!(LlmBackend::parse("OpenAI"), Some(LlmBackend::OpenAi));
        assert_eq!(LlmBackend::parse("claude"), Some(LlmBackend::Anthropic));
        assert_eq!(LlmBackend::parse("mistral"), None);
    }
}
