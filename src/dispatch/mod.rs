//! LLM dispatch: provider adapters and the registry that routes assembled payloads to them.
//!
//! Providers are registered only when configured (API key present, runtime URL set, or mock
//! enabled). The registry never inspects payload text; it forwards what the chat service hands it.

mod anthropic;
mod mock;
mod ollama;
mod openai;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderConfig;

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Every provider name the relay knows how to talk to.
pub const KNOWN_PROVIDERS: [&str; 4] = ["openai", "anthropic", "ollama", "mock"];

/// Token cap requested from hosted providers.
const MAX_COMPLETION_TOKENS: u32 = 2_000;

/// Errors surfaced while handing a payload to a provider.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The requested provider name is not one the relay supports.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    /// The provider is supported but has no credentials or endpoint configured.
    #[error("Provider {0} is not configured")]
    NotConfigured(String),
    /// The provider could not be reached.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    /// The provider answered with an error status.
    #[error("Provider request failed: {0}")]
    RequestFailed(String),
    /// The provider response could not be decoded.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Provider answer plus the identifiers that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResponse {
    /// Generated text.
    pub content: String,
    /// Model that served the request.
    pub model: String,
    /// Provider that served the request.
    pub provider: String,
}

/// Interface implemented by every LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Registry key for this provider.
    fn name(&self) -> &'static str;

    /// Model used when the caller does not name one.
    fn default_model(&self) -> &str;

    /// Models this provider advertises.
    async fn available_models(&self) -> Vec<String>;

    /// Send `prompt` to `model` and return the generated text.
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, DispatchError>;
}

/// Configured providers, in registration order.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// Register every provider whose configuration is present.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, DispatchError> {
        let http = build_http_client(config.request_timeout_secs)?;
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        if let Some(api_key) = &config.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                http.clone(),
                config.openai_base_url.clone(),
                api_key.clone(),
            )));
        }
        if let Some(api_key) = &config.anthropic_api_key {
            providers.push(Box::new(AnthropicProvider::new(
                http.clone(),
                config.anthropic_base_url.clone(),
                api_key.clone(),
            )));
        }
        if let Some(base_url) = &config.ollama_url {
            providers.push(Box::new(OllamaProvider::new(http, base_url.clone())));
        }
        if config.include_mock {
            providers.push(Box::new(MockProvider));
        }

        let registry = Self::with_providers(providers);
        tracing::info!(providers = ?registry.names(), "Registered LLM providers");
        Ok(registry)
    }

    /// Build a registry from explicit providers.
    pub fn with_providers(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Names of registered providers.
    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }

    fn get(&self, name: &str) -> Result<&dyn LlmProvider, DispatchError> {
        if let Some(provider) = self.providers.iter().find(|provider| provider.name() == name) {
            return Ok(provider.as_ref());
        }
        if KNOWN_PROVIDERS.contains(&name) {
            Err(DispatchError::NotConfigured(name.to_string()))
        } else {
            Err(DispatchError::UnknownProvider(name.to_string()))
        }
    }

    /// Map of registered provider name to the models it advertises.
    pub async fn available(&self) -> BTreeMap<String, Vec<String>> {
        let mut available = BTreeMap::new();
        for provider in &self.providers {
            available.insert(provider.name().to_string(), provider.available_models().await);
        }
        available
    }

    /// Forward `prompt` to the named provider, using its default model when none is given.
    pub async fn send(
        &self,
        prompt: &str,
        provider: &str,
        model: Option<&str>,
    ) -> Result<DispatchResponse, DispatchError> {
        let backend = self.get(provider)?;
        let model = model
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| backend.default_model())
            .to_string();

        tracing::info!(
            provider = backend.name(),
            model = %model,
            payload_chars = prompt.chars().count(),
            "Dispatching chat payload"
        );
        let content = backend.generate(prompt, &model).await.map_err(|error| {
            tracing::warn!(provider = backend.name(), model = %model, error = %error, "Dispatch failed");
            error
        })?;

        Ok(DispatchResponse {
            content,
            model,
            provider: backend.name().to_string(),
        })
    }
}

fn build_http_client(timeout_secs: u64) -> Result<Client, DispatchError> {
    Client::builder()
        .user_agent("llm-relay/dispatch")
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|error| DispatchError::Unavailable(format!("failed to build HTTP client: {error}")))
}

/// Transport failure. The reqwest error names internal endpoints, so it is logged, not returned.
fn transport_error(provider: &'static str, error: reqwest::Error) -> DispatchError {
    tracing::warn!(provider, error = %error, "Provider request could not be sent");
    DispatchError::Unavailable(format!("{provider} is unreachable"))
}

/// Body that does not match the provider's response schema.
fn decode_error(provider: &'static str, error: reqwest::Error) -> DispatchError {
    tracing::warn!(provider, error = %error, "Provider response could not be decoded");
    DispatchError::InvalidResponse(format!("{provider} returned an unreadable response"))
}

/// Turn a non-success status into a [`DispatchError`], logging the body rather than returning it.
async fn check_status(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, DispatchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider, %status, body = %body, "Provider returned error status");
    Err(DispatchError::RequestFailed(format!("{provider} returned {status}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_only() -> ProviderRegistry {
        ProviderRegistry::from_config(&ProviderConfig {
            include_mock: true,
            ..ProviderConfig::default()
        })
        .expect("registry")
    }

    #[test]
    fn only_configured_providers_are_registered() {
        let registry = ProviderRegistry::from_config(&ProviderConfig {
            anthropic_api_key: Some("key".into()),
            include_mock: true,
            ..ProviderConfig::default()
        })
        .expect("registry");
        assert_eq!(registry.names(), ["anthropic", "mock"]);

        let empty = ProviderRegistry::from_config(&ProviderConfig::default()).expect("registry");
        assert!(empty.names().is_empty());
    }

    #[tokio::test]
    async fn unknown_and_unconfigured_providers_are_distinguished() {
        let registry = mock_only();
        let unknown = registry
            .send("hi", "skynet", None)
            .await
            .expect_err("unknown");
        assert!(matches!(unknown, DispatchError::UnknownProvider(ref name) if name == "skynet"));

        let missing = registry
            .send("hi", "openai", None)
            .await
            .expect_err("not configured");
        assert!(matches!(missing, DispatchError::NotConfigured(ref name) if name == "openai"));
    }

    #[tokio::test]
    async fn send_falls_back_to_default_model() {
        let registry = mock_only();
        let response = registry.send("hello", "mock", Some("  ")).await.expect("mock");
        assert_eq!(response.provider, "mock");
        assert_eq!(response.model, "mock-model-1");
        assert_eq!(response.content, "Mock response to: hello");

        let named = registry
            .send("hello", "mock", Some("mock-model-2"))
            .await
            .expect("mock");
        assert_eq!(named.model, "mock-model-2");
    }

    #[tokio::test]
    async fn available_lists_models_per_provider() {
        let available = mock_only().available().await;
        assert_eq!(
            available.get("mock").map(Vec::as_slice),
            Some(["mock-model-1".to_string(), "mock-model-2".to_string()].as_slice())
        );
    }
}
