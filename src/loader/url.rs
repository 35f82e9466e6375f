//! Plain URL loading.

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::transport::{HttpRequest, HttpTransport};
use crate::core::VectorError;

/// Fetches a document with a single GET.
///
/// `file://` URLs and bare absolute paths are read from the local file
/// system instead. No retries are attempted.
pub struct UrlLoader<'a> {
    transport: &'a dyn HttpTransport,
}

impl<'a> UrlLoader<'a> {
    /// Create a loader on top of a transport.
    pub fn new(transport: &'a dyn HttpTransport) -> Self {
        Self {
            transport,
        }
    }

    /// Fetch the raw body of `url`.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = local_path(url) {
            return tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()));
        }

        let response = self.transport.get(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(VectorError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            }
            .into());
        }
        Ok(response.body)
    }

    /// Fetch `url` and decode the body as UTF-8.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let body = self.fetch(url).await?;
        String::from_utf8(body).map_err(|e| {
            VectorError::DocumentParseError {
                url: url.to_string(),
                reason: format!("body is not valid UTF-8: {e}"),
            }
            .into()
        })
    }
}

/// The local path a URL refers to, if it is not an HTTP URL.
pub fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    let path = PathBuf::from(url);
    path.is_absolute().then_some(path)
}
