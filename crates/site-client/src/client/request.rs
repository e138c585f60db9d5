//! Request envelope and response wrapper.
//!
//! An [`ApiRequest`] is a replayable description of one outbound call. It is
//! never mutated once issued: a retry is a new envelope produced by
//! [`ApiRequest::retry`] with the attempt counter bumped.

use crate::error::{ApiError, ErrorKind};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Replayable request body.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<MultipartPart>),
}

/// One field of a multipart form.
#[derive(Clone)]
pub struct MultipartPart {
    name: String,
    value: PartValue,
}

#[derive(Clone)]
enum PartValue {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

impl MultipartPart {
    /// Plain text field.
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: PartValue::Text(value.into()),
        }
    }

    /// File field.
    #[must_use]
    pub fn file(name: impl Into<String>, file_name: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            value: PartValue::File {
                file_name: file_name.into(),
                content_type: None,
                bytes,
            },
        }
    }

    /// Set the MIME type of a file field. No effect on text fields.
    #[must_use]
    pub fn with_content_type(mut self, mime: impl Into<String>) -> Self {
        if let PartValue::File { content_type, .. } = &mut self.value {
            *content_type = Some(mime.into());
        }
        self
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for MultipartPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("MultipartPart");
        s.field("name", &self.name);
        match &self.value {
            PartValue::Text(value) => s.field("text_len", &value.len()),
            PartValue::File {
                file_name,
                content_type,
                bytes,
            } => s
                .field("file_name", file_name)
                .field("content_type", content_type)
                .field("bytes", &bytes.len()),
        };
        s.finish()
    }
}

/// Build a fresh `reqwest` form from replayable parts.
pub(crate) fn build_form(parts: &[MultipartPart]) -> Result<Form, ApiError> {
    parts.iter().try_fold(Form::new(), |form, part| {
        let name = part.name.clone();
        match &part.value {
            PartValue::Text(value) => Ok(form.text(name, value.clone())),
            PartValue::File {
                file_name,
                content_type,
                bytes,
            } => {
                let mut file_part = Part::bytes(bytes.to_vec()).file_name(file_name.clone());
                if let Some(mime) = content_type {
                    file_part = file_part.mime_str(mime).map_err(|e| {
                        ApiError::new(
                            ErrorKind::InvalidRequest,
                            format!("Invalid content type '{mime}': {e}"),
                        )
                    })?;
                }
                Ok(form.part(name, file_part))
            }
        }
    })
}

/// Outbound call envelope.
#[derive(Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: RequestBody,
    headers: HeaderMap,
    attempt: u8,
}

impl ApiRequest {
    /// Create a request for `path` (relative to the base URL, or absolute).
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            headers: HeaderMap::new(),
            attempt: 0,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidRequest` if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| {
            ApiError::new(
                ErrorKind::InvalidRequest,
                format!("Failed to serialize request body: {e}"),
            )
        })?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    /// Attach a multipart body.
    #[must_use]
    pub fn multipart(mut self, parts: Vec<MultipartPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    /// Add a header sent on every attempt.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Zero for the original call, one for its single retry.
    #[must_use]
    pub fn attempt(&self) -> u8 {
        self.attempt
    }

    /// `true` if this envelope is already a retry.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }

    /// A copy of this request marked as the next attempt.
    #[must_use]
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            RequestBody::Empty => "empty",
            RequestBody::Json(_) => "json",
            RequestBody::Multipart(_) => "multipart",
        };
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("body", &body)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// Successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Decode the body as JSON.
    ///
    /// An empty body (e.g. `204 No Content`) decodes as JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Decode` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let result = if self.body.is_empty() {
            serde_json::from_value(Value::Null)
        } else {
            serde_json::from_slice(&self.body)
        };
        result.map_err(|e| ApiError::decode(self.status, &e))
    }
}
