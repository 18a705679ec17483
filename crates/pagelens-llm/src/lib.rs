//! Text-generation client for pagelens.
//!
//! Provides the `ProviderAdapter` trait, `DynProvider` wrapper, an OpenAI-compatible
//! chat-completions adapter (Groq by default), a middleware chain, retry with
//! backoff, and `LlmClient`, which implements the `TextGenerator` seam the
//! pipeline engine depends on.

mod chat_completions;
mod client;
mod provider;
mod retry;
mod types;

pub use chat_completions::{
    ChatCompletionsAdapter, GROQ_API_KEY_VAR, GROQ_BASE_URL, GROQ_DEFAULT_MODEL,
};
pub use client::*;
pub use provider::*;
pub use retry::{complete_with_retry, BackoffPolicy};
pub use types::*;
