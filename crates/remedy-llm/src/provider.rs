use async_trait::async_trait;

use crate::{ChatRequest, ChatResponse};

// ---------------------------------------------------------------------------
// ChatProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, remedy_types::RemedyError>;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ChatProvider>);

impl DynProvider {
    pub fn new(provider: impl ChatProvider + 'static) -> Self {
        Self(Box::new(provider))
    }
}

#[async_trait]
impl ChatProvider for DynProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, remedy_types::RemedyError> {
        tracing::debug!(
            provider = %self.0.name(),
            messages = request.messages.len(),
            "LLM request"
        );
        let response = self.0.complete(request).await?;
        tracing::debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish = ?response.finish_reason,
            "LLM response"
        );
        Ok(response)
    }

    fn name(&self) -> &str {
        self.0.name()
    }

    fn default_model(&self) -> &str {
        self.0.default_model()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, Usage};
    use std::sync::Arc;

    struct MockProvider;

    #[async_trait]
    impl ChatProvider for MockProvider {
        async fn complete(
            &self,
            _request: &ChatRequest,
        ) -> Result<ChatResponse, remedy_types::RemedyError> {
            Ok(ChatResponse {
                id: "mock-resp-1".into(),
                text: "{\"recommendation\": \"retry\"}".into(),
                usage: Usage::default(),
                model: "mock-model".into(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }
    }

    #[tokio::test]
    async fn dyn_provider_complete() {
        let provider = DynProvider::new(MockProvider);
        let req = ChatRequest::new("system", "user");
        let resp = provider.complete(&req).await.unwrap();
        assert_eq!(resp.id, "mock-resp-1");
        assert_eq!(resp.finish_reason, FinishReason::EndTurn);
    }

    #[test]
    fn dyn_provider_capability_methods() {
        let provider = DynProvider::new(MockProvider);
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.default_model(), "mock-model");
    }

    struct RejectingProvider;

    #[async_trait]
    impl ChatProvider for RejectingProvider {
        async fn complete(
            &self,
            _request: &ChatRequest,
        ) -> Result<ChatResponse, remedy_types::RemedyError> {
            Err(remedy_types::RemedyError::AuthError {
                provider: "rejecting".into(),
            })
        }

        fn name(&self) -> &str {
            "rejecting"
        }

        fn default_model(&self) -> &str {
            "none"
        }
    }

    #[tokio::test]
    async fn dyn_provider_passes_errors_through() {
        let provider: Arc<dyn ChatProvider> = Arc::new(DynProvider::new(RejectingProvider));
        let err = provider
            .complete(&ChatRequest::new("s", "u").json())
            .await
            .unwrap_err();
        assert!(err.is_terminal());
    }
}
