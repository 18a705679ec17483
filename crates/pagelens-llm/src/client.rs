use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use pagelens_types::PagelensError;

use crate::{complete_with_retry, BackoffPolicy, DynProvider, ProviderAdapter, Request, Response};

// ---------------------------------------------------------------------------
// TextGenerator
// ---------------------------------------------------------------------------

/// The single capability the analysis pipeline needs: prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, PagelensError>;
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request) {}
    fn after(&self, _request: &Request, _response: &mut Response) {}
}

// ---------------------------------------------------------------------------
// Built-in middleware: LoggingMiddleware
// ---------------------------------------------------------------------------

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, request: &mut Request) {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            prompt_chars = request.prompt_chars(),
            "LLM request"
        );
    }

    fn after(&self, _request: &Request, response: &mut Response) {
        tracing::debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish = ?response.finish_reason,
            "LLM response"
        );
    }
}

// ---------------------------------------------------------------------------
// Built-in middleware: UsageTrackingMiddleware
// ---------------------------------------------------------------------------

/// Accumulates token usage. Clones share the same counters.
#[derive(Clone)]
pub struct UsageTrackingMiddleware {
    total_input: Arc<AtomicU64>,
    total_output: Arc<AtomicU64>,
    requests: Arc<AtomicU64>,
}

impl UsageTrackingMiddleware {
    pub fn new() -> Self {
        Self {
            total_input: Arc::new(AtomicU64::new(0)),
            total_output: Arc::new(AtomicU64::new(0)),
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input.load(Ordering::Relaxed)
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

impl Default for UsageTrackingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for UsageTrackingMiddleware {
    fn after(&self, _request: &Request, response: &mut Response) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_input
            .fetch_add(response.usage.input_tokens, Ordering::Relaxed);
        self.total_output
            .fetch_add(response.usage.output_tokens, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// GenerationSettings
// ---------------------------------------------------------------------------

/// Per-request defaults applied by [`LlmClient::generate`].
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Empty means "use the provider's default model".
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_retries: usize,
    pub backoff: BackoffPolicy,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: Some(0.7),
            max_tokens: None,
            max_retries: 2,
            backoff: BackoffPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

/// Generation client over a single provider.
pub struct LlmClient {
    provider: DynProvider,
    settings: GenerationSettings,
    middleware: Vec<Box<dyn Middleware>>,
}

impl LlmClient {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self {
            provider: DynProvider::new(provider),
            settings: GenerationSettings::default(),
            middleware: Vec::new(),
        }
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, PagelensError> {
        let mut req = request.clone();
        if req.model.is_empty() {
            req.model = self.provider.default_model().to_string();
        }

        for m in &self.middleware {
            m.before(&mut req);
        }

        let mut resp = complete_with_retry(
            || self.provider.complete(&req),
            self.settings.max_retries,
            &self.settings.backoff,
        )
        .await?;

        for m in &self.middleware {
            m.after(&req, &mut resp);
        }

        Ok(resp)
    }

    /// Create from the environment: a Groq chat-completions provider keyed by `GROQ_API_KEY`.
    pub fn from_env() -> Result<Self, PagelensError> {
        let adapter = crate::ChatCompletionsAdapter::from_env()?;
        Ok(Self::new(adapter))
    }

    fn build_request(&self, prompt: &str) -> Request {
        let mut request = Request::prompt(self.settings.model.clone(), prompt);
        request.temperature = self.settings.temperature;
        request.max_tokens = self.settings.max_tokens;
        request
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String, PagelensError> {
        let request = self.build_request(prompt);
        let response = self.complete(&request).await?;
        Ok(response.text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, Usage};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct MockProvider {
        name: &'static str,
        call_count: Arc<AtomicUsize>,
        fail_first: usize,
        seen: Arc<Mutex<Vec<Request>>>,
    }

    impl MockProvider {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                call_count: Arc::new(AtomicUsize::new(0)),
                fail_first: 0,
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        async fn complete(&self, request: &Request) -> Result<Response, PagelensError> {
            let n = self.call_count.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            if n < self.fail_first {
                return Err(PagelensError::ProviderError {
                    provider: self.name.into(),
                    status: 503,
                    message: "busy".into(),
                    retryable: true,
                });
            }
            Ok(Response {
                id: "mock-resp".into(),
                text: format!("{} says hi", self.name),
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 20,
                    total_tokens: 30,
                },
                model: request.model.clone(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        fn name(&self) -> &str {
            self.name
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }
    }

    fn no_backoff() -> GenerationSettings {
        GenerationSettings {
            backoff: BackoffPolicy::None,
            ..GenerationSettings::default()
        }
    }

    #[tokio::test]
    async fn generate_uses_default_provider_and_settings() {
        let provider = MockProvider::new("mock");
        let seen = provider.seen.clone();
        let client = LlmClient::new(provider).with_settings(no_backoff());

        let text = client.generate("Classify this").await.unwrap();
        assert_eq!(text, "mock says hi");

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "mock-model");
        assert_eq!(requests[0].messages[0].content, "Classify this");
        assert_eq!(requests[0].temperature, Some(0.7));
    }

    #[tokio::test]
    async fn explicit_model_overrides_provider_default() {
        let provider = MockProvider::new("mock");
        let seen = provider.seen.clone();
        let client = LlmClient::new(provider).with_settings(GenerationSettings {
            model: "llama-custom".into(),
            ..no_backoff()
        });

        client.generate("x").await.unwrap();
        assert_eq!(seen.lock().unwrap()[0].model, "llama-custom");
        assert_eq!(client.provider_name(), "mock");
    }

    #[tokio::test]
    async fn retryable_errors_are_invisible_to_callers() {
        let mut provider = MockProvider::new("flaky");
        provider.fail_first = 2;
        let calls = provider.call_count.clone();
        let client = LlmClient::new(provider).with_settings(no_backoff());

        assert_eq!(client.generate("x").await.unwrap(), "flaky says hi");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded_by_settings() {
        let mut provider = MockProvider::new("down");
        provider.fail_first = 10;
        let calls = provider.call_count.clone();
        let settings = GenerationSettings {
            max_retries: 1,
            ..no_backoff()
        };
        let client = LlmClient::new(provider).with_settings(settings);

        let err = client.generate("x").await.unwrap_err();
        assert!(matches!(err, PagelensError::ProviderError { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn usage_tracking_accumulates_tokens() {
        let tracker = UsageTrackingMiddleware::new();
        let client = LlmClient::new(MockProvider::new("mock"))
            .with_middleware(LoggingMiddleware)
            .with_middleware(tracker.clone())
            .with_settings(no_backoff());

        client.generate("a").await.unwrap();
        client.generate("b").await.unwrap();

        assert_eq!(tracker.requests(), 2);
        assert_eq!(tracker.total_input_tokens(), 20);
        assert_eq!(tracker.total_output_tokens(), 40);
    }
}
