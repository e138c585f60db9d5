//! Secret types for access and refresh tokens.
//!
//! Re-exports [`secrecy`] so the rest of the crate (and hosts) name one path.
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` while carrying a token stays safe to log via `{:?}` or
//! tracing fields. Values are zeroized on drop.
//!
//! ```rust
//! use site_client::secret::{ExposeSecret, SecretString};
//!
//! let access = SecretString::from("eyJhbGciOi...");
//! assert!(format!("{access:?}").contains("REDACTED"));
//!
//! let header = format!("Bearer {}", access.expose_secret());
//! assert!(header.starts_with("Bearer eyJ"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Format a bearer `Authorization` header value.
#[must_use]
pub fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
