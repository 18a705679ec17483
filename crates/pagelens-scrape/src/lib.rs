//! Fetch-and-clean: turn a URL into readable plain text.
//!
//! [`PageFetcher`] is the seam the driver depends on; [`HttpFetcher`] is the
//! production implementation. [`clean_html`] and the artifact helpers are pure
//! and usable on their own.

mod artifact;
mod clean;
mod http;

pub use artifact::{artifact_file_name, write_artifact};
pub use clean::{clean_html, collapse_whitespace};
pub use http::{HttpFetcher, DEFAULT_USER_AGENT};

use async_trait::async_trait;
use pagelens_types::Result;

/// Fetch a page and return its cleaned text.
///
/// Implementations must never return empty text: a page without readable
/// content is a `FetchReason::EmptyContent` failure.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
    fn name(&self) -> &str;
}
