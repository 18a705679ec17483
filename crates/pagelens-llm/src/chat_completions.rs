use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::{FinishReason, Message, ProviderAdapter, Request, Response, Role, Usage};
use pagelens_types::PagelensError;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai";
pub const GROQ_DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
pub const GROQ_API_KEY_VAR: &str = "GROQ_API_KEY";

const PROVIDER_NAME: &str = "groq";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// ChatCompletionsAdapter
// ---------------------------------------------------------------------------

/// Adapter for OpenAI-compatible `/v1/chat/completions` endpoints (Groq by default).
#[derive(Debug)]
pub struct ChatCompletionsAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl ChatCompletionsAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: GROQ_BASE_URL.to_string(),
            default_model: GROQ_DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read the API key from `GROQ_API_KEY`. Absence is a startup failure.
    pub fn from_env() -> Result<Self, PagelensError> {
        let key = std::env::var(GROQ_API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PagelensError::MissingCredential {
                var: GROQ_API_KEY_VAR.into(),
            })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = model;
        self
    }

    /// Per-request timeout enforced by the HTTP client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request.messages.iter().map(convert_message).collect();

        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let mut body = json!({
            "model": model,
            "messages": messages,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        if !request.stop_sequences.is_empty() {
            body["stop"] = json!(request.stop_sequences);
        }

        body
    }

    fn parse_response(&self, body: serde_json::Value) -> Result<Response, PagelensError> {
        let choice = body["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .ok_or_else(|| self.invalid("response has no choices"))?;

        let text = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| self.invalid("first choice has no text content"))?
            .to_string();

        let finish_reason = match choice["finish_reason"].as_str() {
            Some("length") => FinishReason::MaxTokens,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("stop") if choice["stop_sequence"].is_string() => FinishReason::StopSequence,
            _ => FinishReason::EndTurn,
        };

        let usage_obj = &body["usage"];
        let input_tokens = usage_obj["prompt_tokens"].as_u64().unwrap_or(0);
        let output_tokens = usage_obj["completion_tokens"].as_u64().unwrap_or(0);
        let total_tokens = usage_obj["total_tokens"]
            .as_u64()
            .unwrap_or(input_tokens + output_tokens);

        Ok(Response {
            id: body["id"].as_str().unwrap_or("").to_string(),
            text,
            usage: Usage {
                input_tokens,
                output_tokens,
                total_tokens,
            },
            model: body["model"].as_str().unwrap_or("").to_string(),
            finish_reason,
        })
    }

    fn invalid(&self, message: impl Into<String>) -> PagelensError {
        PagelensError::InvalidResponse {
            provider: PROVIDER_NAME.to_string(),
            message: message.into(),
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> PagelensError {
        if e.is_timeout() {
            PagelensError::RequestTimeout {
                provider: PROVIDER_NAME.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            PagelensError::ProviderError {
                provider: PROVIDER_NAME.to_string(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Message conversion
// ---------------------------------------------------------------------------

fn convert_message(msg: &Message) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    json!({
        "role": role,
        "content": msg.content,
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(
    provider: &str,
    status: reqwest::StatusCode,
    retry_after: Option<&str>,
    body: &str,
) -> PagelensError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = retry_after
                .and_then(|v| v.trim().parse::<f64>().ok())
                .or_else(|| {
                    serde_json::from_str::<serde_json::Value>(body)
                        .ok()
                        .and_then(|v| v["error"]["retry_after"].as_f64())
                })
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            PagelensError::RateLimited {
                provider: provider.into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => PagelensError::AuthError {
            provider: provider.into(),
        },
        500 | 502 | 503 | 504 => PagelensError::ProviderError {
            provider: provider.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => PagelensError::ProviderError {
            provider: provider.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for ChatCompletionsAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, PagelensError> {
        let body = self.build_request_body(request);

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = resp.status();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let response_body = resp.text().await.map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(map_error(
                PROVIDER_NAME,
                status,
                retry_after.as_deref(),
                &response_body,
            ));
        }

        let json: serde_json::Value = serde_json::from_str(&response_body)
            .map_err(|e| self.invalid(format!("Failed to parse response JSON: {e}")))?;

        self.parse_response(json)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
