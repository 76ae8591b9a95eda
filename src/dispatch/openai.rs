use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{
    DispatchError, LlmProvider, MAX_COMPLETION_TOKENS, check_status, decode_error, transport_error,
};

const MODELS: [&str; 5] = [
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4-turbo",
    "gpt-4",
    "gpt-3.5-turbo",
];

/// OpenAI-compatible chat completions API.
pub struct OpenAiProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    /// Build a provider for the API at `base_url`.
    pub fn new(http: Client, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn default_model(&self) -> &str {
        "gpt-3.5-turbo"
    }

    async fn available_models(&self) -> Vec<String> {
        MODELS.iter().map(|model| model.to_string()).collect()
    }

    async fn generate(&self, prompt: &str, model: &str) -> Result<String, DispatchError> {
        let payload = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": MAX_COMPLETION_TOKENS,
            "temperature": 0.7,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| transport_error(self.name(), error))?;
        let response = check_status(self.name(), response).await?;

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|error| decode_error(self.name(), error))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| DispatchError::InvalidResponse("OpenAI response had no content".into()))
    }
}
