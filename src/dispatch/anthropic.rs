use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{
    DispatchError, LlmProvider, MAX_COMPLETION_TOKENS, check_status, decode_error, transport_error,
};

const API_VERSION: &str = "2023-06-01";

const MODELS: [&str; 3] = [
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

/// Anthropic messages API.
pub struct AnthropicProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl AnthropicProvider {
    /// Build a provider for the API at `base_url`.
    pub fn new(http: Client, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        "claude-3-sonnet-20240229"
    }

    async fn available_models(&self) -> Vec<String> {
        MODELS.iter().map(|model| model.to_string()).collect()
    }

    async fn generate(&self, prompt: &str, model: &str) -> Result<String, DispatchError> {
        let payload = json!({
            "model": model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|error| transport_error(self.name(), error))?;
        let response = check_status(self.name(), response).await?;

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|error| decode_error(self.name(), error))?;

        let text: Vec<String> = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(DispatchError::InvalidResponse(
                "Anthropic response had no text content".into(),
            ));
        }
        Ok(text.join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn text_blocks_are_joined() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/messages")
                    .header("x-api-key", "key-test")
                    .header("anthropic-version", API_VERSION);
                then.status(200).json_body(json!({
                    "content": [
                        {"type": "text", "text": "Part one. "},
                        {"type": "tool_use", "id": "x", "name": "noop", "input": {}},
                        {"type": "text", "text": "Part two."}
                    ]
                }));
            })
            .await;

        let provider =
            AnthropicProvider::new(Client::new(), server.base_url(), "key-test".into());
        let content = provider
            .generate("Hello", "claude-3-haiku-20240307")
            .await
            .expect("message");

        mock.assert_async().await;
        assert_eq!(content, "Part one. Part two.");
    }

    #[tokio::test]
    async fn server_errors_are_request_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(529).body("overloaded");
            })
            .await;

        let provider =
            AnthropicProvider::new(Client::new(), server.base_url(), "key-test".into());
        let error = provider
            .generate("Hello", "claude-3-haiku-20240307")
            .await
            .expect_err("overloaded");
        assert!(matches!(error, DispatchError::RequestFailed(ref message) if message.contains("529")));
    }
}
