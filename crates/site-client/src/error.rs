//! Normalized error type for every client call.
//!
//! Whatever went wrong (no response, an error status, an unreadable body, a
//! failed token refresh) callers receive one [`ApiError`] carrying a
//! human-readable message and, when a response was obtained, its status.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Fallback message when nothing better is available.
pub const GENERIC_FAILURE_MESSAGE: &str = "Request failed";

/// Category of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response was obtained (connect failure, timeout, reset).
    Transport,
    /// The server answered with a non-2xx status.
    Http,
    /// A 2xx response whose body could not be decoded.
    Decode,
    /// The token refresh call failed; the session has been torn down.
    RefreshFailed,
    /// The call performing the refresh was dropped before it settled.
    RefreshAbandoned,
    /// The token store could not be read or written.
    Store,
    /// The request could not be built (e.g. bad multipart part).
    InvalidRequest,
    /// The HTTP client could not be constructed.
    Configuration,
}

/// Uniform error shape surfaced to calling code.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    /// What kind of failure this is.
    pub kind: ErrorKind,

    /// Human-readable message, preferring server-supplied detail.
    pub message: String,

    /// HTTP status, if a response was obtained.
    pub status: Option<u16>,

    /// Server error body, kept verbatim for validation-error rendering.
    pub body: Option<Value>,
}

impl ApiError {
    /// Build an error of `kind` with a plain message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// Normalize a transport failure (no response obtained).
    #[must_use]
    pub fn transport(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "Request timed out".to_string()
        } else {
            let text = err.to_string();
            if text.is_empty() {
                GENERIC_FAILURE_MESSAGE.to_string()
            } else {
                text
            }
        };

        Self {
            kind: ErrorKind::Transport,
            message,
            status: err.status().map(|s| s.as_u16()),
            body: None,
        }
    }

    /// Normalize an error response from its status and raw body.
    ///
    /// The message prefers the server's `detail`, then `message`, then the
    /// first `non_field_errors` entry, then a status-derived fallback.
    #[must_use]
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let body: Option<Value> = serde_json::from_slice(body).ok();
        let message = body
            .as_ref()
            .and_then(server_message)
            .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));

        Self {
            kind: ErrorKind::Http,
            message,
            status: Some(status.as_u16()),
            body,
        }
    }

    /// Normalize a body that could not be decoded.
    #[must_use]
    pub fn decode(status: StatusCode, err: &serde_json::Error) -> Self {
        Self {
            kind: ErrorKind::Decode,
            message: format!("Invalid response body: {err}"),
            status: Some(status.as_u16()),
            body: None,
        }
    }

    /// Re-tag an error as a refresh failure, keeping message and status.
    #[must_use]
    pub fn into_refresh_failure(self) -> Self {
        Self {
            kind: ErrorKind::RefreshFailed,
            ..self
        }
    }

    /// `true` for a 401 response.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(StatusCode::UNAUTHORIZED.as_u16())
    }

    /// `true` for a 403 response.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.status == Some(StatusCode::FORBIDDEN.as_u16())
    }

    /// Message suitable for inline display on an admin screen.
    #[must_use]
    pub fn user_message(&self) -> String {
        if self.is_unauthorized() {
            "Unauthorized (login required)".to_string()
        } else if self.is_forbidden() {
            "Forbidden (not authorized)".to_string()
        } else {
            self.message.clone()
        }
    }

    /// Serialized server body, for surfacing validation errors verbatim.
    #[must_use]
    pub fn body_text(&self) -> Option<String> {
        self.body.as_ref().map(Value::to_string)
    }
}

fn server_message(body: &Value) -> Option<String> {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    non_empty(body.get("detail"))
        .or_else(|| non_empty(body.get("message")))
        .or_else(|| {
            body.get("non_field_errors")
                .and_then(Value::as_array)
                .and_then(|errs| non_empty(errs.first()))
        })
}
