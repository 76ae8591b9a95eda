use async_trait::async_trait;

use super::{DispatchError, LlmProvider};

const ECHO_CHARS: usize = 50;

/// Offline provider that echoes the start of the payload. Registered only when enabled.
pub struct MockProvider;

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model-1"
    }

    async fn available_models(&self) -> Vec<String> {
        vec!["mock-model-1".into(), "mock-model-2".into()]
    }

    async fn generate(&self, prompt: &str, _model: &str) -> Result<String, DispatchError> {
        let head: String = prompt.chars().take(ECHO_CHARS).collect();
        let ellipsis = if prompt.chars().count() > ECHO_CHARS { "..." } else { "" };
        Ok(format!("Mock response to: {head}{ellipsis}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn long_payloads_are_cut_with_ellipsis() {
        let prompt = "x".repeat(60);
        let content = MockProvider.generate(&prompt, "mock-model-1").await.expect("echo");
        assert_eq!(content, format!("Mock response to: {}...", "x".repeat(50)));
    }
}
