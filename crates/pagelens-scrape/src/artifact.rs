use std::path::{Path, PathBuf};

use pagelens_types::{FetchReason, PagelensError, Result};

/// File name for a page's cleaned-text artifact: `<host>.txt`, with `_<port>`
/// appended when the URL names a port explicitly.
pub fn artifact_file_name(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| PagelensError::fetch(url, FetchReason::InvalidUrl, e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| PagelensError::fetch(url, FetchReason::InvalidUrl, "URL has no host"))?;
    Ok(match parsed.port() {
        Some(port) => format!("{host}_{port}.txt"),
        None => format!("{host}.txt"),
    })
}

/// Write cleaned text to `<dir>/<host>.txt`, creating `dir` if needed.
pub fn write_artifact(dir: &Path, url: &str, text: &str) -> Result<PathBuf> {
    let path = dir.join(artifact_file_name(url)?);
    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, text)?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "Wrote page artifact");
    Ok(path)
}
