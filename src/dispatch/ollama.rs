use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{DispatchError, LlmProvider, check_status, decode_error, transport_error};

const FALLBACK_MODELS: [&str; 3] = ["llama2", "mistral", "codellama"];

/// Local Ollama runtime reached over its HTTP API.
pub struct OllamaProvider {
    http: Client,
    base_url: String,
}

impl OllamaProvider {
    /// Build a provider for the runtime at `base_url`.
    pub fn new(http: Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        "llama2"
    }

    /// Installed models from `/api/tags`, or a fixed list when the runtime cannot be queried.
    async fn available_models(&self) -> Vec<String> {
        let installed = async {
            let response = self.http.get(self.endpoint("/api/tags")).send().await.ok()?;
            if !response.status().is_success() {
                return None;
            }
            let tags: TagsResponse = response.json().await.ok()?;
            Some(tags.models.into_iter().map(|entry| entry.name).collect::<Vec<_>>())
        }
        .await;

        match installed {
            Some(models) => models,
            None => {
                tracing::debug!(base_url = %self.base_url, "Ollama tags unavailable; using fallback list");
                FALLBACK_MODELS.iter().map(|model| model.to_string()).collect()
            }
        }
    }

    async fn generate(&self, prompt: &str, model: &str) -> Result<String, DispatchError> {
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .http
            .post(self.endpoint("/api/generate"))
            .json(&payload)
            .send()
            .await
            .map_err(|error| transport_error(self.name(), error))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(DispatchError::Unavailable(format!(
                "Ollama model {model} not found"
            )));
        }
        let response = check_status(self.name(), response).await?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|error| decode_error(self.name(), error))?;

        if !body.done {
            return Err(DispatchError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    fn provider(server: &MockServer) -> OllamaProvider {
        OllamaProvider::new(Client::new(), server.base_url())
    }

    #[tokio::test]
    async fn generate_sends_non_streaming_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"model": "mistral", "stream": false}"#);
                then.status(200).json_body(json!({
                    "response": " Local answer ",
                    "done": true
                }));
            })
            .await;

        let content = provider(&server)
            .generate("Summarize", "mistral")
            .await
            .expect("generation");

        mock.assert_async().await;
        assert_eq!(content, "Local answer");
    }

    #[tokio::test]
    async fn missing_model_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404).body("model not found");
            })
            .await;

        let error = provider(&server)
            .generate("Summarize", "ghost")
            .await
            .expect_err("404");
        assert!(matches!(error, DispatchError::Unavailable(ref message) if message.contains("ghost")));
    }

    #[tokio::test]
    async fn models_come_from_tags_endpoint() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200).json_body(json!({
                    "models": [{"name": "llama3:8b"}, {"name": "phi3"}]
                }));
            })
            .await;

        assert_eq!(provider(&server).available_models().await, ["llama3:8b", "phi3"]);
    }

    #[tokio::test]
    async fn models_fall_back_when_runtime_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(500);
            })
            .await;

        assert_eq!(
            provider(&server).available_models().await,
            ["llama2", "mistral", "codellama"]
        );
    }

    #[tokio::test]
    async fn unreachable_runtime_does_not_expose_endpoint() {
        let error = OllamaProvider::new(Client::new(), "http://127.0.0.1:1".into())
            .generate("Summarize", "mistral")
            .await
            .expect_err("connection refused");

        let message = error.to_string();
        assert!(matches!(error, DispatchError::Unavailable(_)));
        assert_eq!(message, "Provider unavailable: ollama is unreachable");
        assert!(!message.contains("127.0.0.1"));
    }
}
