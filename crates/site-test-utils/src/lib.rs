//! # Site Test Utilities
//!
//! Shared test utilities for `site-client`.
//!
//! This crate provides:
//! - Mock backend (`MockBackend`) with token, refresh and admin endpoints
//! - Request inspection helpers (refresh call counts, bearer tokens seen)
//! - Tracing initialization for test output
//!
//! ## Usage
//!
//! ```rust,ignore
//! use site_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let backend = MockBackend::start().await;
//!     backend.mount_refresh_success("B", Duration::ZERO).await;
//!     backend.mount_rotating_admin("/api/admin/news/", "B", json!([])).await;
//!
//!     let client = backend.client_with_tokens("A", "R")?;
//!     client.get_json::<serde_json::Value>("/api/admin/news/").await?;
//!
//!     assert_eq!(backend.refresh_calls().await, 1);
//!     Ok(())
//! }
//! ```

pub mod mock_backend;

// Re-export commonly used items
pub use mock_backend::*;

/// Install a test tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "site=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
