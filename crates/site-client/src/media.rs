//! Resolve media paths returned by the backend into fetchable URLs.

use crate::client::ApiClient;
use crate::config::ClientConfig;

/// Resolve `path` against `base`.
///
/// An empty path yields an empty string. Paths that already start with
/// `http` are returned unchanged. Anything else is appended to `base`.
#[must_use]
pub fn media_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    if path.starts_with("http") {
        return path.to_string();
    }
    format!("{base}{path}")
}

impl ClientConfig {
    /// [`media_url`] against this config's base URL.
    #[must_use]
    pub fn media_url(&self, path: &str) -> String {
        media_url(&self.base_url, path)
    }
}

impl ApiClient {
    /// [`media_url`] against the client's base URL.
    #[must_use]
    pub fn media_url(&self, path: &str) -> String {
        self.config().media_url(path)
    }
}
