//! Site client configuration.
//!
//! Configuration is loaded from environment variables. The backend base URL
//! is selected per environment (`SITE_ENV`) from a local/production pair and
//! is always stored without a trailing slash.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default per-request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reserved path segment identifying admin-scoped endpoints.
pub const DEFAULT_ADMIN_PREFIX: &str = "/api/admin/";

/// Runtime environment used to pick the backend base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development backend (`SITE_API_BASE_URL_LOCAL`).
    Development,
    /// Deployed backend (`SITE_API_BASE_URL_PROD`).
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidEnvironment(format!(
                "SITE_ENV must be 'development' or 'production', got '{other}'"
            ))),
        }
    }

    fn base_url_var(self) -> &'static str {
        match self {
            Self::Development => "SITE_API_BASE_URL_LOCAL",
            Self::Production => "SITE_API_BASE_URL_PROD",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    #[error("Invalid HTTP timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Site client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Backend base URL without trailing slash (e.g. `https://api.amarjessore.org`).
    pub base_url: String,

    /// Per-request timeout (default: 15s).
    pub http_timeout: Duration,

    /// Connection timeout (default: 5s).
    pub connect_timeout: Duration,

    /// Path segment that marks a request as admin-scoped.
    pub admin_prefix: String,

    /// Token file location; `None` keeps tokens in memory only.
    pub token_store_path: Option<PathBuf>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("http_timeout", &self.http_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("admin_prefix", &self.admin_prefix)
            .field("token_store_path", &self.token_store_path)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration with default timeouts.
    ///
    /// Trailing slashes are stripped from `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            token_store_path: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidEnvironment` for an unknown `SITE_ENV`
    /// - `ConfigError::MissingEnvVar` if the selected base URL is unset
    /// - `ConfigError::InvalidBaseUrl` if it is not an http(s) URL
    /// - `ConfigError::InvalidTimeout` for a malformed or zero timeout
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let environment = match vars.get("SITE_ENV") {
            Some(value) => Environment::parse(value)?,
            None => Environment::Development,
        };

        let base_url_var = environment.base_url_var();
        let raw_base_url = vars
            .get(base_url_var)
            .ok_or_else(|| ConfigError::MissingEnvVar(base_url_var.to_string()))?;

        let base_url = normalize_base_url(raw_base_url);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(format!(
                "{base_url_var} must start with http:// or https://, got '{base_url}'"
            )));
        }

        let http_timeout = if let Some(value_str) = vars.get("SITE_HTTP_TIMEOUT_MS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTimeout(format!(
                    "SITE_HTTP_TIMEOUT_MS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidTimeout(
                    "SITE_HTTP_TIMEOUT_MS must be greater than 0".to_string(),
                ));
            }

            Duration::from_millis(value)
        } else {
            DEFAULT_HTTP_TIMEOUT
        };

        let token_store_path = vars
            .get("SITE_TOKEN_STORE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            base_url,
            http_timeout,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            token_store_path,
        })
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the admin path segment.
    #[must_use]
    pub fn with_admin_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.admin_prefix = prefix.into();
        self
    }

    /// Persist tokens to a file at `path`.
    #[must_use]
    pub fn with_token_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_store_path = Some(path.into());
        self
    }

    /// Resolve a request path against the base URL.
    ///
    /// Absolute `http(s)://` targets are returned unchanged.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_new_strips_trailing_slashes() {
        let config = ClientConfig::new("https://api.example.org///");
        assert_eq!(config.base_url, "https://api.example.org");
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(config.admin_prefix, "/api/admin/");
    }

    #[test]
    fn test_development_is_default_environment() {
        let config = ClientConfig::from_vars(&vars(&[
            ("SITE_API_BASE_URL_LOCAL", "http://127.0.0.1:8000/"),
            ("SITE_API_BASE_URL_PROD", "https://api.example.org"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://127.0.0.1:8000");
        assert!(config.token_store_path.is_none());
    }

    #[test]
    fn test_production_uses_prod_url() {
        let config = ClientConfig::from_vars(&vars(&[
            ("SITE_ENV", "production"),
            ("SITE_API_BASE_URL_LOCAL", "http://127.0.0.1:8000"),
            ("SITE_API_BASE_URL_PROD", "https://api.example.org/"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://api.example.org");
    }

    #[test]
    fn test_missing_base_url_for_selected_env() {
        let result = ClientConfig::from_vars(&vars(&[
            ("SITE_ENV", "prod"),
            ("SITE_API_BASE_URL_LOCAL", "http://127.0.0.1:8000"),
        ]));

        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvVar(ref v)) if v == "SITE_API_BASE_URL_PROD"
        ));
    }

    #[test]
    fn test_unknown_environment_rejected() {
        let result = ClientConfig::from_vars(&vars(&[
            ("SITE_ENV", "staging"),
            ("SITE_API_BASE_URL_LOCAL", "http://127.0.0.1:8000"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidEnvironment(_))));
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let result =
            ClientConfig::from_vars(&vars(&[("SITE_API_BASE_URL_LOCAL", "ftp://example.org")]));
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_timeout_parsing() {
        let config = ClientConfig::from_vars(&vars(&[
            ("SITE_API_BASE_URL_LOCAL", "http://127.0.0.1:8000"),
            ("SITE_HTTP_TIMEOUT_MS", "2500"),
        ]))
        .unwrap();
        assert_eq!(config.http_timeout, Duration::from_millis(2500));

        let zero = ClientConfig::from_vars(&vars(&[
            ("SITE_API_BASE_URL_LOCAL", "http://127.0.0.1:8000"),
            ("SITE_HTTP_TIMEOUT_MS", "0"),
        ]));
        assert!(matches!(zero, Err(ConfigError::InvalidTimeout(_))));

        let garbage = ClientConfig::from_vars(&vars(&[
            ("SITE_API_BASE_URL_LOCAL", "http://127.0.0.1:8000"),
            ("SITE_HTTP_TIMEOUT_MS", "soon"),
        ]));
        assert!(matches!(garbage, Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn test_token_store_path() {
        let config = ClientConfig::from_vars(&vars(&[
            ("SITE_API_BASE_URL_LOCAL", "http://127.0.0.1:8000"),
            ("SITE_TOKEN_STORE_PATH", "/tmp/site-tokens.json"),
        ]))
        .unwrap();
        assert_eq!(
            config.token_store_path,
            Some(PathBuf::from("/tmp/site-tokens.json"))
        );
    }

    #[test]
    fn test_url_for() {
        let config = ClientConfig::new("http://localhost:8000/");
        assert_eq!(
            config.url_for("/api/news/"),
            "http://localhost:8000/api/news/"
        );
        assert_eq!(
            config.url_for("api/news/"),
            "http://localhost:8000/api/news/"
        );
        assert_eq!(
            config.url_for("https://cdn.example.org/x"),
            "https://cdn.example.org/x"
        );
    }
}
