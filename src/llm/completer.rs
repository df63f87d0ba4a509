//! Text-in/text-out completion with a hard deadline.

use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, LlmProvider};

/// The completion client the intake machine talks to.
///
/// Sends exactly the text it is given as a single user message and gives up
/// after `timeout`.
#[derive(Clone)]
pub struct TextCompleter {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl TextCompleter {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Complete `text`. Fails with `LlmError::Timeout` if the backend takes
    /// longer than the configured deadline.
    pub async fn complete_text(&self, text: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::new(text);
        match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(result) => result.map(|response| response.content),
            Err(_) => Err(LlmError::Timeout {
                provider: self.provider.model_name().to_string(),
                timeout: self.timeout,
            }),
        }
    }
}
