//! Login and logout.
//!
//! Login talks to the token endpoint on the bare HTTP client: a failed login
//! must never enter the refresh protocol, and no stale bearer is sent.

use crate::client::ApiClient;
use crate::error::{ApiError, ErrorKind};
use crate::secret::{ExposeSecret, SecretString};
use crate::session::SessionEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument, warn};

/// Token obtain endpoint.
pub const LOGIN_PATH: &str = "/api/auth/token/";

/// Admin credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access: Option<SecretString>,
    #[serde(default)]
    refresh: Option<SecretString>,
}

fn non_empty(token: Option<SecretString>) -> Option<SecretString> {
    token.filter(|t| !t.expose_secret().is_empty())
}

impl ApiClient {
    /// Obtain a token pair and persist it.
    ///
    /// Any previously stored tokens are cleared first, so a failed login
    /// leaves the session logged out.
    ///
    /// # Errors
    ///
    /// - the normalized [`ApiError`] if the backend rejects the credentials
    /// - `ErrorKind::Decode` with "Invalid login response" if either token
    ///   is missing
    /// - `ErrorKind::Store` if the tokens cannot be persisted
    #[instrument(skip_all, fields(username = %credentials.username.trim()))]
    pub async fn login(&self, credentials: &Credentials) -> Result<(), ApiError> {
        self.tokens().clear()?;

        let url = self.config().url_for(LOGIN_PATH);
        let response = self
            .http()
            .post(&url)
            .json(&LoginRequest {
                username: credentials.username.trim(),
                password: credentials.password.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| ApiError::transport(&e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| ApiError::transport(&e))?;

        if !status.is_success() {
            let err = ApiError::from_response(status, &body);
            warn!(target: "site.auth", status = status.as_u16(), "Login rejected");
            return Err(err);
        }

        let parsed: LoginResponse =
            serde_json::from_slice(&body).map_err(|e| ApiError::decode(status, &e))?;

        let (Some(access), Some(refresh)) = (non_empty(parsed.access), non_empty(parsed.refresh))
        else {
            warn!(target: "site.auth", "Login response missing tokens");
            return Err(ApiError {
                status: Some(status.as_u16()),
                ..ApiError::new(ErrorKind::Decode, "Invalid login response")
            });
        };

        self.tokens().set_tokens(Some(&access), Some(&refresh))?;
        info!(target: "site.auth", "Logged in");
        self.events().emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Drop both tokens and announce the logout.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Store` if the token store cannot be cleared.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.tokens().clear()?;
        info!(target: "site.auth", "Logged out");
        self.events().emit(SessionEvent::LoggedOut);
        Ok(())
    }
}
