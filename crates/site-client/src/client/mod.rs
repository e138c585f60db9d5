//! Authenticated HTTP client.
//!
//! Every call goes through [`ApiClient::execute`], which:
//!
//! 1. attaches `Authorization: Bearer <token>` when an access token is stored,
//! 2. normalizes any failure into an [`ApiError`],
//! 3. on a `401` from an admin-scoped endpoint (first attempt, refresh token
//!    present) enters the single-flight refresh protocol in
//!    [`crate::refresh`], then replays the request once with the new token.
//!
//! If the refresh itself fails, both tokens are purged, queued callers are
//! rejected with the refresh error, and a [`SessionEvent::Expired`] is
//! published for the host to route to its login screen.
//!
//! # Example
//!
//! ```rust,ignore
//! use site_client::{ApiClient, ClientConfig};
//!
//! let client = ApiClient::from_config(ClientConfig::from_env()?)?;
//! let mut events = client.subscribe();
//!
//! let banners: serde_json::Value = client.get_json("/api/admin/banners/").await?;
//! ```

pub mod request;
pub mod scope;

pub use request::{ApiRequest, ApiResponse, MultipartPart, RequestBody};

use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorKind};
use crate::refresh::{RefreshState, RefreshTicket};
use crate::secret::{bearer, ExposeSecret, SecretString};
use crate::session::{SessionEvent, SessionEvents};
use crate::token_store::{FileTokenStore, MemoryTokenStore, SessionTokens, TokenStore};
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

/// Token refresh endpoint.
pub const REFRESH_PATH: &str = "/api/auth/refresh/";

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access: Option<SecretString>,
}

struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    tokens: SessionTokens,
    refresh: RefreshState,
    events: SessionEvents,
}

/// Authenticated client for the site backend.
///
/// Cheap to clone; clones share the token store, refresh state and session
/// event channel. Separate instances share nothing.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.inner.config)
            .field("tokens", &self.inner.tokens)
            .field("refresh", &self.inner.refresh)
            .finish()
    }
}

impl ApiClient {
    /// Create a client backed by `store`.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Configuration` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                ApiError::new(
                    ErrorKind::Configuration,
                    format!("Failed to build HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                tokens: SessionTokens::new(store),
                refresh: RefreshState::new(),
                events: SessionEvents::new(),
            }),
        })
    }

    /// Create a client whose store follows `config.token_store_path`.
    ///
    /// # Errors
    ///
    /// - `ErrorKind::Store` if the token file cannot be opened
    /// - `ErrorKind::Configuration` if the HTTP client cannot be built
    pub fn from_config(config: ClientConfig) -> Result<Self, ApiError> {
        let store: Arc<dyn TokenStore> = match &config.token_store_path {
            Some(path) => Arc::new(FileTokenStore::open(path)?),
            None => Arc::new(MemoryTokenStore::new()),
        };
        Self::new(config, store)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The session's access/refresh tokens.
    #[must_use]
    pub fn tokens(&self) -> &SessionTokens {
        &self.inner.tokens
    }

    /// Refresh-cycle state (for inspection).
    #[must_use]
    pub fn refresh_state(&self) -> &RefreshState {
        &self.inner.refresh
    }

    /// Subscribe to session lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn events(&self) -> &SessionEvents {
        &self.inner.events
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// `true` if `path` addresses an admin-scoped endpoint.
    #[must_use]
    pub fn is_admin_path(&self, path: &str) -> bool {
        scope::is_admin_call(path, &self.inner.config.admin_prefix)
    }

    // =========================================================================
    // Convenience wrappers
    // =========================================================================

    /// `GET path` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`] from [`ApiClient::execute`] or decoding.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    /// Send `body` as JSON with `method` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`] from [`ApiClient::execute`] or decoding.
    pub async fn send_json<B, T>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(method, path).json(body)?;
        self.execute(request).await?.json()
    }

    /// Send a multipart form with `method` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`] from [`ApiClient::execute`] or decoding.
    pub async fn send_multipart<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        parts: Vec<MultipartPart>,
    ) -> Result<T, ApiError> {
        let request = ApiRequest::new(method, path).multipart(parts);
        self.execute(request).await?.json()
    }

    /// `DELETE path`, discarding the body.
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`] from [`ApiClient::execute`].
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(ApiRequest::delete(path)).await.map(|_| ())
    }

    // =========================================================================
    // Core
    // =========================================================================

    /// Issue `request`, refreshing the access token once on an admin `401`.
    ///
    /// # Errors
    ///
    /// The normalized [`ApiError`] of the final attempt. For queued callers
    /// whose refresh failed, the refresh error; for the caller that ran the
    /// failed refresh, the error of its original `401`.
    #[instrument(skip_all, fields(method = %request.method(), path = %request.path()))]
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let access = self.inner.tokens.access();

        let err = match self.send_once(&request, access.as_ref()).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if self.is_refresh_candidate(&request, &err) {
            self.refresh_and_replay(&request, err).await
        } else {
            Err(err)
        }
    }

    /// `true` if `err` on `request` qualifies for a refresh.
    fn is_refresh_candidate(&self, request: &ApiRequest, err: &ApiError) -> bool {
        if err.kind != ErrorKind::Http || !err.is_unauthorized() {
            return false;
        }
        if !self.is_admin_path(request.path()) {
            debug!(target: "site.client", "401 on public endpoint, not refreshing");
            return false;
        }
        if request.is_retry() {
            debug!(
                target: "site.client",
                attempt = request.attempt(),
                "401 on retried request, not refreshing again"
            );
            return false;
        }
        if self.inner.tokens.refresh().is_none() {
            debug!(target: "site.client", "401 without refresh token, session unauthenticated");
            return false;
        }
        true
    }

    async fn refresh_and_replay(
        &self,
        request: &ApiRequest,
        original_err: ApiError,
    ) -> Result<ApiResponse, ApiError> {
        let retry = request.retry();

        let leader = match self.inner.refresh.join() {
            RefreshTicket::Waiter(pending) => {
                let access = pending.wait().await?;
                return self.send_once(&retry, Some(&access)).await;
            }
            RefreshTicket::Leader(leader) => leader,
        };

        // A cycle that failed since our 401 may have purged the tokens.
        let Some(refresh_token) = self.inner.tokens.refresh() else {
            debug!(target: "site.client", "Refresh token gone before refresh started");
            leader.fail(&original_err);
            return Err(original_err);
        };

        match self.request_new_access(&refresh_token).await {
            Ok(access) => {
                if let Err(e) = self.inner.tokens.set_access(&access) {
                    warn!(
                        target: "site.client",
                        error = %e,
                        "Failed to persist refreshed access token"
                    );
                }
                leader.succeed(&access);
                self.send_once(&retry, Some(&access)).await
            }
            Err(refresh_err) => {
                // Purge before returning to idle.
                self.teardown(&refresh_err);
                leader.fail(&refresh_err);
                Err(original_err)
            }
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Sent on the bare HTTP client: no bearer, no refresh protocol.
    #[instrument(skip_all)]
    async fn request_new_access(&self, refresh: &SecretString) -> Result<SecretString, ApiError> {
        let url = self.inner.config.url_for(REFRESH_PATH);

        let response = self
            .inner
            .http
            .post(&url)
            .json(&RefreshRequest {
                refresh: refresh.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| {
                warn!(target: "site.refresh", error = %e, "Refresh request failed");
                ApiError::transport(&e).into_refresh_failure()
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(&e).into_refresh_failure())?;

        if !status.is_success() {
            warn!(target: "site.refresh", status = %status, "Refresh rejected by backend");
            return Err(ApiError::from_response(status, &body).into_refresh_failure());
        }

        let parsed: RefreshResponse = serde_json::from_slice(&body)
            .map_err(|e| ApiError::decode(status, &e).into_refresh_failure())?;

        match parsed.access {
            Some(access) if !access.expose_secret().is_empty() => {
                debug!(target: "site.refresh", "Access token refreshed");
                Ok(access)
            }
            _ => Err(ApiError::new(
                ErrorKind::RefreshFailed,
                "No access token in refresh response",
            )),
        }
    }

    /// Purge both tokens and tell the host the session is over.
    fn teardown(&self, err: &ApiError) {
        if let Err(e) = self.inner.tokens.clear() {
            warn!(target: "site.client", error = %e, "Failed to clear tokens during teardown");
        }
        warn!(target: "site.client", reason = %err.message, "Session expired");
        self.inner.events.emit(SessionEvent::Expired {
            reason: err.message.clone(),
        });
    }

    /// Send one attempt of `request` with `access` as bearer (if any).
    async fn send_once(
        &self,
        request: &ApiRequest,
        access: Option<&SecretString>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.inner.config.url_for(request.path());

        let mut builder = self
            .inner
            .http
            .request(request.method().clone(), &url)
            .headers(request.headers().clone());

        if let Some(access) = access {
            builder = builder.header(AUTHORIZATION, bearer(access));
        }

        builder = match request.body() {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(request::build_form(parts)?),
        };

        let response = builder.send().await.map_err(|e| {
            debug!(
                target: "site.client",
                error = %e,
                attempt = request.attempt(),
                "HTTP request failed"
            );
            ApiError::transport(&e)
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| ApiError::transport(&e))?;

        if status.is_success() {
            debug!(
                target: "site.client",
                status = status.as_u16(),
                attempt = request.attempt(),
                "Request succeeded"
            );
            Ok(ApiResponse::new(status, headers, body))
        } else {
            debug!(
                target: "site.client",
                status = status.as_u16(),
                attempt = request.attempt(),
                authenticated = access.is_some(),
                "Request returned error status"
            );
            Err(ApiError::from_response(status, &body))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::token_store::TokenKey;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_with(server: &MockServer, store: MemoryTokenStore) -> ApiClient {
        ApiClient::new(ClientConfig::new(server.uri()), Arc::new(store)).unwrap()
    }

    #[tokio::test]
    async fn test_attaches_bearer_when_token_stored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin/banners/"))
            .and(header("authorization", "Bearer A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with(&server, MemoryTokenStore::with_tokens("A", "R"));
        let value: serde_json::Value = client.get_json("/api/admin/banners/").await.unwrap();
        assert!(value.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_authorization_header_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/news/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = client_with(&server, MemoryTokenStore::new());
        client.execute(ApiRequest::get("/api/news/")).await.unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received
            .iter()
            .any(|r| r.headers.contains_key("authorization")));
    }

    #[tokio::test]
    async fn test_refresh_then_replay_with_new_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/admin/news/"))
            .and(header("authorization", "Bearer A"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": "Given token not valid for any token type"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(body_json(serde_json::json!({ "refresh": "R" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access": "B" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/admin/news/"))
            .and(header("authorization", "Bearer B"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "id": 1 }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with(&server, MemoryTokenStore::with_tokens("A", "R"));
        let value: serde_json::Value = client.get_json("/api/admin/news/").await.unwrap();

        assert_eq!(value, serde_json::json!([{ "id": 1 }]));
        assert_eq!(client.tokens().access().unwrap().expose_secret(), "B");
        assert_eq!(client.tokens().refresh().unwrap().expose_secret(), "R");
        assert!(!client.refresh_state().is_refreshing());
    }

    #[tokio::test]
    async fn test_public_401_never_refreshes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stories/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_with(&server, MemoryTokenStore::with_tokens("A", "R"));
        let err = client.execute(ApiRequest::get("/api/stories/")).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(client.tokens().access().unwrap().expose_secret(), "A");
    }

    #[tokio::test]
    async fn test_refresh_missing_access_tears_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin/impacts/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": "Authentication credentials were not provided."
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with(&server, MemoryTokenStore::with_tokens("A", "R"));
        let mut events = client.subscribe();

        let err = client
            .execute(ApiRequest::get("/api/admin/impacts/"))
            .await
            .unwrap_err();

        // Leader reports its original 401
        assert_eq!(err.status, Some(401));
        assert_eq!(err.message, "Authentication credentials were not provided.");
        assert!(client.tokens().access().is_none());
        assert!(client.tokens().refresh().is_none());

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            SessionEvent::Expired {
                reason: "No access token in refresh response".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_non_401_errors_pass_through() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/admin/stories/4/"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "detail": "You do not have permission to perform this action."
            })))
            .mount(&server)
            .await;

        let client = client_with(&server, MemoryTokenStore::with_tokens("A", "R"));
        let err = client.delete("/api/admin/stories/4/").await.unwrap_err();

        assert!(err.is_forbidden());
        assert_eq!(
            err.message,
            "You do not have permission to perform this action."
        );
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin/banners/"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let config =
            ClientConfig::new(server.uri()).with_http_timeout(Duration::from_millis(100));
        let client = ApiClient::new(
            config,
            Arc::new(MemoryTokenStore::with_tokens("A", "R")),
        )
        .unwrap();

        let err = client
            .execute(ApiRequest::get("/api/admin/banners/"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transport);
        assert_eq!(err.status, None);
        assert_eq!(err.message, "Request timed out");
    }

    #[tokio::test]
    async fn test_multipart_replayed_after_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/admin/programs/"))
            .and(header("authorization", "Bearer A"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access": "B" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/admin/programs/"))
            .and(header("authorization", "Bearer B"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": 9 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with(&server, MemoryTokenStore::with_tokens("A", "R"));
        let parts = vec![
            MultipartPart::text("title", "Health camp"),
            MultipartPart::file("image", "camp.png", bytes::Bytes::from_static(b"png"))
                .with_content_type("image/png"),
        ];

        let created: serde_json::Value = client
            .send_multipart(reqwest::Method::POST, "/api/admin/programs/", parts)
            .await
            .unwrap();
        assert_eq!(created["id"], 9);

        let received = server.received_requests().await.unwrap();
        let replay = received.last().unwrap();
        let body = String::from_utf8_lossy(&replay.body);
        assert!(body.contains("Health camp"));
        assert!(body.contains("camp.png"));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let client = ApiClient::new(
            ClientConfig::new("http://localhost:8000"),
            Arc::new(MemoryTokenStore::with_tokens("access-secret", "refresh-secret")),
        )
        .unwrap();

        let debug = format!("{client:?}");
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
        assert!(debug.contains("localhost:8000"));
    }

    #[test]
    fn test_from_config_uses_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"{"token": "A", "refresh": "R"}"#).unwrap();

        let config = ClientConfig::new("http://localhost:8000").with_token_store_path(&path);
        let client = ApiClient::from_config(config).unwrap();
        assert!(client.tokens().is_authenticated());

        client.tokens().clear().unwrap();
        let store = FileTokenStore::open(&path).unwrap();
        assert!(store.get(TokenKey::Access).is_none());
    }
}
