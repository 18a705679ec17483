//! Shared types, errors, state, and failure ledger for the pagelens pipeline.
//!
//! This crate provides the foundational types used across all other pagelens crates:
//! - `PagelensError` — unified error taxonomy
//! - `SharedState` — the write-once record threaded through every stage of a run
//! - `PartialUpdate` — the field mapping a stage contributes back into the state
//! - `StageFailure` — one entry of the per-run failure ledger

mod ledger;
mod state;

pub use ledger::{FailureKind, StageFailure};
pub use state::{Field, FieldKind, FieldValue, PartialUpdate, SharedState};

use serde::{Deserialize, Serialize};

/// Why a page could not be fetched and cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchReason {
    InvalidUrl,
    Network,
    HttpStatus,
    Parse,
    EmptyContent,
}

impl std::fmt::Display for FetchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetchReason::InvalidUrl => "invalid_url",
            FetchReason::Network => "network",
            FetchReason::HttpStatus => "http_status",
            FetchReason::Parse => "parse",
            FetchReason::EmptyContent => "empty_content",
        };
        f.write_str(s)
    }
}

/// Coarse classification of a generation failure, as seen by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationReason {
    Timeout,
    RateLimit,
    InvalidResponse,
}

/// Unified error type for all pagelens subsystems.
#[derive(Debug, thiserror::Error)]
pub enum PagelensError {
    // === Fetch Errors ===
    #[error("Failed to fetch {url} ({reason}): {message}")]
    Fetch {
        url: String,
        reason: FetchReason,
        message: String,
    },

    // === Generation Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("Generation failed after {attempts} attempts")]
    RetriesExhausted { attempts: usize },

    // === Stage Errors ===
    #[error("Stage '{stage}' could not parse generated text: {message}")]
    ParseError { stage: String, message: String },

    // === Pipeline Errors ===
    #[error("Pipeline definition invalid: {0}")]
    PipelineDefinition(String),

    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<PagelensError>,
    },

    #[error("Stage '{stage}' violated ownership of field '{field}': {message}")]
    OwnershipViolation {
        stage: String,
        field: String,
        message: String,
    },

    // === Configuration Errors ===
    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential { var: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl PagelensError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PagelensError::RateLimited { .. }
                | PagelensError::RequestTimeout { .. }
                | PagelensError::ProviderError { retryable: true, .. }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PagelensError::AuthError { .. }
                | PagelensError::MissingCredential { .. }
                | PagelensError::PipelineDefinition(_)
                | PagelensError::OwnershipViolation { .. }
        )
    }

    /// Maps a generation-client failure onto the pipeline's failure taxonomy.
    ///
    /// Returns `None` for errors that do not originate from the generation client.
    pub fn generation_reason(&self) -> Option<GenerationReason> {
        match self {
            PagelensError::RequestTimeout { .. } => Some(GenerationReason::Timeout),
            PagelensError::RateLimited { .. } => Some(GenerationReason::RateLimit),
            PagelensError::ProviderError { .. }
            | PagelensError::AuthError { .. }
            | PagelensError::InvalidResponse { .. } => Some(GenerationReason::InvalidResponse),
            PagelensError::RetriesExhausted { .. } => Some(GenerationReason::Timeout),
            _ => None,
        }
    }

    /// Convenience constructor for fetch failures.
    pub fn fetch(url: impl Into<String>, reason: FetchReason, message: impl Into<String>) -> Self {
        PagelensError::Fetch {
            url: url.into(),
            reason,
            message: message.into(),
        }
    }
}

/// A convenience alias for `Result<T, PagelensError>`.
pub type Result<T> = std::result::Result<T, PagelensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_fetch() {
        let err = PagelensError::fetch("https://example.com", FetchReason::HttpStatus, "HTTP 404");
        assert_eq!(
            err.to_string(),
            "Failed to fetch https://example.com (http_status): HTTP 404"
        );
    }

    #[test]
    fn error_display_provider_error() {
        let err = PagelensError::ProviderError {
            provider: "groq".into(),
            status: 500,
            message: "internal server error".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "Provider groq returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_rate_limited() {
        let err = PagelensError::RateLimited {
            provider: "groq".into(),
            retry_after_ms: 3000,
        };
        assert_eq!(err.to_string(), "Rate limited by groq, retry after 3000ms");
    }

    #[test]
    fn error_display_parse_error() {
        let err = PagelensError::ParseError {
            stage: "extract_tags".into(),
            message: "expected a comma-separated list".into(),
        };
        assert_eq!(
            err.to_string(),
            "Stage 'extract_tags' could not parse generated text: expected a comma-separated list"
        );
    }

    #[test]
    fn error_display_stage_failed_wraps_source() {
        let err = PagelensError::StageFailed {
            stage: "summarize".into(),
            source: Box::new(PagelensError::RequestTimeout {
                provider: "groq".into(),
                timeout_ms: 60_000,
            }),
        };
        assert_eq!(
            err.to_string(),
            "Stage 'summarize' failed: Request to groq timed out after 60000ms"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn error_display_missing_credential() {
        let err = PagelensError::MissingCredential {
            var: "GROQ_API_KEY".into(),
        };
        assert_eq!(
            err.to_string(),
            "Missing credential: environment variable GROQ_API_KEY is not set"
        );
    }

    #[test]
    fn fetch_reason_display_is_snake_case() {
        assert_eq!(FetchReason::EmptyContent.to_string(), "empty_content");
        assert_eq!(FetchReason::InvalidUrl.to_string(), "invalid_url");
        assert_eq!(
            serde_json::to_string(&FetchReason::HttpStatus).unwrap(),
            "\"http_status\""
        );
    }

    // --- is_retryable ---

    #[test]
    fn retryable_rate_limited_and_timeout() {
        let rate = PagelensError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 1000,
        };
        let timeout = PagelensError::RequestTimeout {
            provider: "x".into(),
            timeout_ms: 1000,
        };
        assert!(rate.is_retryable());
        assert!(timeout.is_retryable());
    }

    #[test]
    fn not_retryable_provider_error_when_not_flagged() {
        let err = PagelensError::ProviderError {
            provider: "x".into(),
            status: 400,
            message: "bad request".into(),
            retryable: false,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn not_retryable_invalid_response() {
        let err = PagelensError::InvalidResponse {
            provider: "x".into(),
            message: "no choices".into(),
        };
        assert!(!err.is_retryable());
    }

    // --- is_terminal ---

    #[test]
    fn terminal_auth_and_definition_errors() {
        assert!(PagelensError::AuthError { provider: "x".into() }.is_terminal());
        assert!(PagelensError::PipelineDefinition("bad".into()).is_terminal());
        assert!(!PagelensError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 0
        }
        .is_terminal());
    }

    // --- generation_reason ---

    #[test]
    fn generation_reason_maps_collaborator_failures() {
        let timeout = PagelensError::RequestTimeout {
            provider: "x".into(),
            timeout_ms: 5,
        };
        let rate = PagelensError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 5,
        };
        let invalid = PagelensError::InvalidResponse {
            provider: "x".into(),
            message: "garbage".into(),
        };
        assert_eq!(timeout.generation_reason(), Some(GenerationReason::Timeout));
        assert_eq!(rate.generation_reason(), Some(GenerationReason::RateLimit));
        assert_eq!(
            invalid.generation_reason(),
            Some(GenerationReason::InvalidResponse)
        );
    }

    #[test]
    fn generation_reason_none_for_non_generation_errors() {
        let err = PagelensError::ParseError {
            stage: "s".into(),
            message: "m".into(),
        };
        assert_eq!(err.generation_reason(), None);
        assert_eq!(PagelensError::Other("x".into()).generation_reason(), None);
    }

    // --- From impls ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PagelensError = io_err.into();
        assert!(matches!(err, PagelensError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: PagelensError = json_err.into();
        assert!(matches!(err, PagelensError::Json(_)));
    }
}
