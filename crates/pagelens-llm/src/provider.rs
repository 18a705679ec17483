use async_trait::async_trait;

use pagelens_types::PagelensError;

use crate::{Request, Response};

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn complete(&self, request: &Request) -> Result<Response, PagelensError>;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ProviderAdapter>);

impl DynProvider {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self(Box::new(provider))
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, PagelensError> {
        self.0.complete(request).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn default_model(&self) -> &str {
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

    struct MockProvider;

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        async fn complete(&self, request: &Request) -> Result<Response, PagelensError> {
            Ok(Response {
                id: "mock-resp-1".into(),
                text: format!("echo: {}", request.messages[0].content),
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
        let resp = provider
            .complete(&Request::prompt("mock-model", "hi"))
            .await
            .unwrap();
        assert_eq!(resp.id, "mock-resp-1");
        assert_eq!(resp.text, "echo: hi");
        assert_eq!(resp.finish_reason, FinishReason::EndTurn);
    }

    #[test]
    fn dyn_provider_metadata() {
        let provider = DynProvider::new(MockProvider);
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.default_model(), "mock-model");
    }

    #[tokio::test]
    async fn dyn_provider_shared_across_tasks() {
        let provider = std::sync::Arc::new(DynProvider::new(MockProvider));
        let handle = tokio::spawn({
            let provider = provider.clone();
            async move { provider.complete(&Request::prompt("mock-model", "here")).await }
        });
        assert_eq!(handle.await.unwrap().unwrap().text, "echo: here");

        let resp = provider
            .complete(&Request::prompt("mock-model", "there"))
            .await
            .unwrap();
        assert_eq!(resp.text, "echo: there");
    }
}
