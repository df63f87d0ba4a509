//! Bridges rig-core completion models to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::completion::{CompletionModel, Prompt};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Wraps any rig `CompletionModel` (Gemini, OpenAI, Anthropic, ...).
///
/// Each call builds a throwaway agent: the relay sends one prompt per turn
/// with no history, so there is nothing to keep between calls.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M> RigAdapter<M>
where
    M: CompletionModel,
{
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let agent = AgentBuilder::new(self.model.clone()).build();

        let content = agent
            .prompt(request.prompt.as_str())
            .await
            .map_err(|e| classify_error(self.provider, &e.to_string()))?;

        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.provider.to_string(),
                reason: "empty completion".to_string(),
            });
        }

        tracing::debug!(
            provider = self.provider,
            model = %self.model_name,
            chars = content.len(),
            "Completion received"
        );

        Ok(CompletionResponse { content })
    }
}

/// Map a rig error message onto our taxonomy.
fn classify_error(provider: &str, reason: &str) -> LlmError {
    let lower = reason.to_ascii_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("api key not valid")
        || lower.contains("invalid api key")
        || lower.contains("unauthorized")
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_auth_errors() {
        let err = classify_error("gemini", "HTTP 400: API key not valid. Please pass a valid API key.");
        assert!(matches!(err, LlmError::AuthFailed { ref provider } if provider == "gemini"));

        let err = classify_error("openai", "ProviderError: 401 Unauthorized");
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn classify_other_errors_keep_reason() {
        let err = classify_error("gemini", "HttpError: quota exceeded (429)");
        match err {
            LlmError::RequestFailed { provider, reason } => {
                assert_eq!(provider, "gemini");
                assert!(reason.contains("quota exceeded"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
