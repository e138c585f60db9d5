//! Mock site backend for integration tests.
//!
//! Wraps a `wiremock::MockServer` with the auth endpoints and admin
//! resources the client talks to.

use serde_json::{json, Value};
use site_client::{ApiClient, ClientConfig, MemoryTokenStore};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LOGIN_PATH: &str = "/api/auth/token/";
pub const REFRESH_PATH: &str = "/api/auth/refresh/";

/// Backend detail for an expired access token.
pub const TOKEN_NOT_VALID: &str = "Given token not valid for any token type";

/// Mock backend running on a random local port.
pub struct MockBackend {
    server: MockServer,
}

impl MockBackend {
    /// Start an empty mock backend.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the backend.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// The underlying server, for mounting custom mocks.
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Client configuration pointing at this backend.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.uri())
    }

    /// Client with an in-memory store pre-loaded with `access` / `refresh`.
    pub fn client_with_tokens(&self, access: &str, refresh: &str) -> anyhow::Result<ApiClient> {
        let store = Arc::new(MemoryTokenStore::with_tokens(access, refresh));
        ApiClient::new(self.config(), store)
            .map_err(|e| anyhow::anyhow!("Failed to build client: {}", e))
    }

    /// Client with an empty in-memory store.
    pub fn client_logged_out(&self) -> anyhow::Result<ApiClient> {
        ApiClient::new(self.config(), Arc::new(MemoryTokenStore::new()))
            .map_err(|e| anyhow::anyhow!("Failed to build client: {}", e))
    }

    // =========================================================================
    // Auth endpoints
    // =========================================================================

    /// Accept `username` / `password` and issue `access` / `refresh`.
    pub async fn mount_login(&self, username: &str, password: &str, access: &str, refresh: &str) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(json!({ "username": username, "password": password })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({
                    "access": access,
                    "refresh": refresh
                })),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer the refresh endpoint with `{ "access": new_access }` after `delay`.
    ///
    /// A delay keeps the refresh in flight long enough for concurrent
    /// callers to queue behind it.
    pub async fn mount_refresh_success(&self, new_access: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access": new_access }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Reject refresh attempts with `status` and a `detail` body after `delay`.
    pub async fn mount_refresh_failure(&self, status: u16, detail: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(json!({ "detail": detail }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Serve `body` at `GET resource` only for `Bearer valid_access`; any
    /// other caller receives `401`.
    pub async fn mount_rotating_admin(&self, resource: &str, valid_access: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(resource))
            .and(header("authorization", format!("Bearer {valid_access}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .with_priority(1)
            .mount(&self.server)
            .await;

        self.mount_unauthorized(resource).await;
    }

    /// Answer every request to `resource` with `401`.
    pub async fn mount_unauthorized(&self, resource: &str) {
        Mock::given(path(resource))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "detail": TOKEN_NOT_VALID })),
            )
            .with_priority(10)
            .mount(&self.server)
            .await;
    }

    /// Serve `body` at `GET resource` regardless of credentials.
    pub async fn mount_public(&self, resource: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(resource))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Number of requests that reached the refresh endpoint.
    pub async fn refresh_calls(&self) -> usize {
        self.requests_to(REFRESH_PATH).await.len()
    }

    /// `Authorization` header of each request to `resource`, in arrival order.
    pub async fn bearers_for(&self, resource: &str) -> Vec<Option<String>> {
        self.requests_to(resource)
            .await
            .iter()
            .map(|r| {
                r.headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }

    /// Paths of requests sent with `Bearer token`, in arrival order.
    pub async fn paths_with_bearer(&self, token: &str) -> Vec<String> {
        let expected = format!("Bearer {token}");
        self.server
            .received_requests()
            .await
            .expect("request recording is enabled")
            .iter()
            .filter(|r| {
                r.headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some(expected.as_str())
            })
            .map(|r| r.url.path().to_string())
            .collect()
    }

    /// Decoded JSON bodies of requests to the refresh endpoint.
    pub async fn refresh_bodies(&self) -> Vec<Value> {
        self.requests_to(REFRESH_PATH)
            .await
            .iter()
            .map(|r| serde_json::from_slice(&r.body).expect("refresh body is JSON"))
            .collect()
    }

    async fn requests_to(&self, resource: &str) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .expect("request recording is enabled")
            .into_iter()
            .filter(|r| r.url.path() == resource)
            .collect()
    }
}
