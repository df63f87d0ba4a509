//! Provider-agnostic completion types.

use async_trait::async_trait;

use crate::error::LlmError;

/// A single-turn completion request: the user's text, sent as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// A completion response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub content: String,
}

/// A text-in/text-out generative backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Run one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_not_trimmed() {
        let request = CompletionRequest::new("  What is 2+2?\n");
        assert_eq!(request.prompt, "  What is 2+2?\n");
    }
}
