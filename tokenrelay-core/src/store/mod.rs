//! Credential storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`CredentialStore`] - Trait for durable per-principal credential storage
//! - [`MemoryStore`] - In-memory implementation for testing
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_store`] - Helper to select backend based on availability
//!
//! # Record Layout
//!
//! Each principal owns exactly one record: the JSON-serialized [`Credential`]
//! stored under the key `tokenrelay/{principal_id}`. Writes replace the whole
//! record, so readers never see a partially updated credential.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokenrelay_core::store::{CredentialStore, create_store};
//! use tokenrelay_core::{Credential, PrincipalId};
//!
//! let store = create_store(true); // Prefer keyring if available
//!
//! store.upsert(&Credential::new("alice", "ya29.token")).await?;
//! let record = store.fetch(&PrincipalId::new("alice")).await?;
//! assert!(record.is_some());
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::model::{Credential, PrincipalId};

mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use memory::MemoryStore;
#[cfg(feature = "keyring-store")]
pub use self::keyring::KeyringStore;

/// Prefix shared by every storage key.
pub const KEY_PREFIX: &str = "tokenrelay";

/// Storage key for a principal's credential record.
pub fn record_key(principal: &PrincipalId) -> String {
    format!("{}/{}", KEY_PREFIX, principal.as_str())
}

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend answered that no record exists.
    ///
    /// Some backends report absence as an error instead of an empty result;
    /// readers treat this exactly like `Ok(None)`.
    #[error("no credential record for {principal}")]
    NotFound { principal: String },

    /// Access to the record was denied.
    #[error("access denied to credential record: {key}")]
    AccessDenied { key: String },

    /// The backend could not be reached or did not answer in time.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// The stored record could not be serialized or parsed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

impl StoreError {
    /// Whether this error means "no record" rather than a failed read.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Durable per-principal credential storage.
///
/// Implementations include:
/// - [`MemoryStore`] - In-memory storage for testing
/// - [`KeyringStore`] (with `keyring-store` feature) - OS keyring
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve the credential record for a principal.
    ///
    /// Returns `Ok(None)` (or [`StoreError::NotFound`]) if no record exists.
    async fn fetch(&self, principal: &PrincipalId) -> Result<Option<Credential>, StoreError>;

    /// Insert or replace the record keyed by `credential.principal_id`.
    ///
    /// The write is atomic: concurrent upserts resolve to the last write.
    async fn upsert(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Delete the record for a principal.
    ///
    /// Returns `Ok(())` even if no record existed.
    async fn remove(&self, principal: &PrincipalId) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Box<T> {
    async fn fetch(&self, principal: &PrincipalId) -> Result<Option<Credential>, StoreError> {
        (**self).fetch(principal).await
    }

    async fn upsert(&self, credential: &Credential) -> Result<(), StoreError> {
        (**self).upsert(credential).await
    }

    async fn remove(&self, principal: &PrincipalId) -> Result<(), StoreError> {
        (**self).remove(principal).await
    }
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<T> {
    async fn fetch(&self, principal: &PrincipalId) -> Result<Option<Credential>, StoreError> {
        (**self).fetch(principal).await
    }

    async fn upsert(&self, credential: &Credential) -> Result<(), StoreError> {
        (**self).upsert(credential).await
    }

    async fn remove(&self, principal: &PrincipalId) -> Result<(), StoreError> {
        (**self).remove(principal).await
    }
}

/// Create a credential store with automatic backend selection.
///
/// - If `prefer_keyring` is `true` and the `keyring-store` feature is enabled,
///   attempts to create a [`KeyringStore`], falling back to [`MemoryStore`]
///   with a warning if the keyring is unavailable.
/// - Otherwise returns a [`MemoryStore`].
pub fn create_store(prefer_keyring: bool) -> Box<dyn CredentialStore> {
    #[cfg(feature = "keyring-store")]
    if prefer_keyring {
        match KeyringStore::try_new(KEY_PREFIX) {
            Ok(store) => {
                tracing::info!("Using OS keyring for credential storage");
                return Box::new(store);
            }
            Err(e) => {
                tracing::warn!(
                    "Keyring unavailable ({}), falling back to memory store. \
                     Credentials will not persist across restarts.",
                    e
                );
            }
        }
    }

    #[cfg(not(feature = "keyring-store"))]
    if prefer_keyring {
        tracing::warn!(
            "Keyring storage requested but keyring-store feature not enabled. \
             Using memory store. Credentials will not persist across restarts."
        );
    }

    tracing::debug!("Using in-memory credential storage");
    Box::new(MemoryStore::new())
}
