//! Authenticated HTTP client for the Amar Jessore site backend.
//!
//! The public site and the admin dashboard both talk to the same REST+JWT
//! backend through [`client::ApiClient`]. The client attaches the stored
//! access token to every request, and when an admin endpoint answers `401`
//! it runs a single-flight refresh against `/api/auth/refresh/`, queueing
//! any other admin calls that hit `401` while the refresh is in flight.

#![warn(clippy::pedantic)]

/// Authentication flows (login, logout)
pub mod auth;

/// The authenticated HTTP client and its request envelope
pub mod client;

/// Client configuration loaded from the environment
pub mod config;

/// Typed wrappers for the site-content endpoints
pub mod endpoints;

/// Normalized error type returned by every client call
pub mod error;

/// Media path resolution against the backend base URL
pub mod media;

/// Single-flight refresh state machine
pub mod refresh;

/// Secret types for token values
pub mod secret;

/// Session lifecycle events
pub mod session;

mod sync;

/// Persistent access/refresh token storage
pub mod token_store;

pub use client::{ApiClient, ApiRequest, ApiResponse};
pub use config::ClientConfig;
pub use error::{ApiError, ErrorKind};
pub use session::SessionEvent;
pub use token_store::{FileTokenStore, MemoryTokenStore, SessionTokens, TokenKey, TokenStore};
