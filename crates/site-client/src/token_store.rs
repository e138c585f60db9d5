//! Persistent storage for the access and refresh tokens.
//!
//! Tokens live in a small key-value store under the keys `token` (access)
//! and `refresh`. The absence of either key means "logged out". Hosts pick
//! the backing store: [`MemoryTokenStore`] for process-local sessions or
//! [`FileTokenStore`] for sessions that survive restarts.

use crate::error::{ApiError, ErrorKind};
use crate::secret::{ExposeSecret, SecretString};
use crate::sync::MutexExt;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

/// Key under which a token is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKey {
    /// Short-lived access token (`token`).
    Access,
    /// Longer-lived refresh token (`refresh`).
    Refresh,
}

impl TokenKey {
    /// Storage key string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "token",
            Self::Refresh => "refresh",
        }
    }
}

/// Token store I/O failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Token store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Token store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::new(ErrorKind::Store, err.to_string())
    }
}

/// Durable key-value store holding the session tokens.
pub trait TokenStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: TokenKey) -> Option<String>;

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the value cannot be persisted.
    fn set(&self, key: TokenKey, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the removal cannot be persisted.
    fn remove(&self, key: TokenKey) -> Result<(), StoreError>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local token store.
#[derive(Default)]
pub struct MemoryTokenStore {
    values: Mutex<HashMap<TokenKey, String>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with both tokens.
    #[must_use]
    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        let values = HashMap::from([
            (TokenKey::Access, access.to_string()),
            (TokenKey::Refresh, refresh.to_string()),
        ]);
        Self {
            values: Mutex::new(values),
        }
    }
}

impl fmt::Debug for MemoryTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&'static str> = self
            .values
            .lock_or_recover()
            .keys()
            .map(|k| k.as_str())
            .collect();
        f.debug_struct("MemoryTokenStore")
            .field("keys", &keys)
            .finish()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: TokenKey) -> Option<String> {
        self.values.lock_or_recover().get(&key).cloned()
    }

    fn set(&self, key: TokenKey, value: &str) -> Result<(), StoreError> {
        self.values
            .lock_or_recover()
            .insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: TokenKey) -> Result<(), StoreError> {
        self.values.lock_or_recover().remove(&key);
        Ok(())
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// Token store persisted as a JSON object file.
///
/// The file is read once at [`FileTokenStore::open`] and rewritten (via a
/// temporary file and rename) on every mutation.
pub struct FileTokenStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileTokenStore {
    /// Open the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(
            target: "site.token_store",
            path = %path.display(),
            entries = values.len(),
            "Opened token store"
        );

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            warn!(
                target: "site.token_store",
                path = %self.path.display(),
                error = %e,
                "Failed to replace token file"
            );
            StoreError::from(e)
        })
    }
}

impl fmt::Debug for FileTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTokenStore")
            .field("path", &self.path)
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: TokenKey) -> Option<String> {
        self.values.lock_or_recover().get(key.as_str()).cloned()
    }

    fn set(&self, key: TokenKey, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock_or_recover();
        values.insert(key.as_str().to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: TokenKey) -> Result<(), StoreError> {
        let mut values = self.values.lock_or_recover();
        if values.remove(key.as_str()).is_none() {
            return Ok(());
        }
        self.persist(&values)
    }
}

// =============================================================================
// Session tokens
// =============================================================================

/// Typed view over a [`TokenStore`] for the access/refresh pair.
#[derive(Clone)]
pub struct SessionTokens {
    store: Arc<dyn TokenStore>,
}

impl SessionTokens {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Current access token, if one is stored.
    #[must_use]
    pub fn access(&self) -> Option<SecretString> {
        self.read(TokenKey::Access)
    }

    /// Current refresh token, if one is stored.
    #[must_use]
    pub fn refresh(&self) -> Option<SecretString> {
        self.read(TokenKey::Refresh)
    }

    /// `true` when both tokens are present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access().is_some() && self.refresh().is_some()
    }

    /// Store whichever of the two tokens are given.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if either value cannot be persisted.
    pub fn set_tokens(
        &self,
        access: Option<&SecretString>,
        refresh: Option<&SecretString>,
    ) -> Result<(), StoreError> {
        if let Some(access) = access {
            self.store.set(TokenKey::Access, access.expose_secret())?;
        }
        if let Some(refresh) = refresh {
            self.store.set(TokenKey::Refresh, refresh.expose_secret())?;
        }
        Ok(())
    }

    /// Replace the access token after a refresh.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the value cannot be persisted.
    pub fn set_access(&self, access: &SecretString) -> Result<(), StoreError> {
        self.store.set(TokenKey::Access, access.expose_secret())
    }

    /// Remove both tokens. Both removals are attempted even if one fails.
    ///
    /// # Errors
    ///
    /// Returns the first `StoreError` encountered.
    pub fn clear(&self) -> Result<(), StoreError> {
        let access = self.store.remove(TokenKey::Access);
        let refresh = self.store.remove(TokenKey::Refresh);
        access.and(refresh)
    }

    fn read(&self, key: TokenKey) -> Option<SecretString> {
        self.store
            .get(key)
            .filter(|v| !v.is_empty())
            .map(SecretString::from)
    }
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access", &self.access().map(|_| "[REDACTED]"))
            .field("refresh", &self.refresh().map(|_| "[REDACTED]"))
            .finish()
    }
}
