//! OS keyring-backed credential storage implementation.

use async_trait::async_trait;
use keyring::Entry;

use super::{CredentialStore, StoreError};
use crate::model::{Credential, PrincipalId};

/// Account name used for every entry.
const ENTRY_USER: &str = "tokenrelay";

/// Service suffix and value of the availability check entry.
const AVAILABILITY_MARKER: &str = "__availability__";

/// OS keyring-backed credential store.
///
/// This store uses the platform's native keyring service:
/// - macOS: Keychain
/// - Linux: Secret Service API (via libsecret)
/// - Windows: Credential Manager
///
/// Each principal's credential is one keyring entry whose password is the
/// JSON-serialized record, so an upsert replaces the record in one write.
///
/// # Example
///
/// ```rust,ignore
/// use tokenrelay_core::store::{KeyringStore, CredentialStore};
/// use tokenrelay_core::Credential;
///
/// let store = KeyringStore::try_new("tokenrelay").unwrap();
/// store.upsert(&Credential::new("alice", "ya29.token")).await.unwrap();
/// ```
pub struct KeyringStore {
    service_name: String,
}

impl KeyringStore {
    /// Try to create a new keyring store.
    ///
    /// Writes, re-reads and deletes a marker entry through two separate
    /// handles. Fails if the backend is missing, rejects the write, or does
    /// not hand the value back (the in-process mock backend keeps each
    /// handle's value to itself).
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        let marker = format!("{}/{}", service_name, AVAILABILITY_MARKER);
        let unavailable = |e: keyring::Error| StoreError::KeyringUnavailable {
            message: format!("keyring backend not available: {}", e),
        };

        Entry::new(&marker, ENTRY_USER)
            .and_then(|entry| entry.set_password(AVAILABILITY_MARKER))
            .map_err(unavailable)?;

        let reader = Entry::new(&marker, ENTRY_USER).map_err(unavailable)?;
        let persisted = matches!(reader.get_password().as_deref(), Ok(AVAILABILITY_MARKER));
        let _ = reader.delete_credential();

        if !persisted {
            return Err(StoreError::KeyringUnavailable {
                message: "keyring backend does not persist entries".to_string(),
            });
        }

        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn create_entry(&self, principal: &PrincipalId) -> Result<Entry, StoreError> {
        let service = format!("{}/{}", self.service_name, principal.as_str());
        Entry::new(&service, ENTRY_USER).map_err(|e| StoreError::BackendError {
            message: format!("failed to create keyring entry: {}", e),
        })
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

/// Map keyring failures onto store errors the resilient reader understands.
fn map_keyring_error(principal: &PrincipalId, err: keyring::Error) -> StoreError {
    match err {
        keyring::Error::NoEntry => StoreError::NotFound {
            principal: principal.to_string(),
        },
        keyring::Error::PlatformFailure(e) => StoreError::Unavailable {
            message: format!("platform keyring failure: {}", e),
        },
        keyring::Error::NoStorageAccess(e) => StoreError::Unavailable {
            message: format!("keyring storage not accessible: {}", e),
        },
        keyring::Error::Ambiguous(_) => StoreError::BackendError {
            message: format!("ambiguous keyring entry for {}", principal),
        },
        e => StoreError::BackendError {
            message: format!("keyring error: {}", e),
        },
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn fetch(&self, principal: &PrincipalId) -> Result<Option<Credential>, StoreError> {
        let entry = self.create_entry(principal)?;

        match entry.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(principal, e)),
        }
    }

    async fn upsert(&self, credential: &Credential) -> Result<(), StoreError> {
        let entry = self.create_entry(&credential.principal_id)?;
        let json = serde_json::to_string(credential)?;

        entry
            .set_password(&json)
            .map_err(|e| map_keyring_error(&credential.principal_id, e))
    }

    async fn remove(&self, principal: &PrincipalId) -> Result<(), StoreError> {
        let entry = self.create_entry(principal)?;

        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(principal, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests skip where no persistent keyring backend is reachable;
    // once a store exists, writes must be readable.

    #[test]
    fn test_keyring_store_creation() {
        match KeyringStore::try_new("tokenrelay-test") {
            Ok(store) => {
                assert_eq!(store.service_name, "tokenrelay-test");
            }
            Err(StoreError::KeyringUnavailable { .. }) => {}
            Err(e) => {
                panic!("unexpected error: {}", e);
            }
        }
    }

    #[test]
    fn test_no_entry_maps_to_not_found() {
        let err = map_keyring_error(&PrincipalId::new("alice"), keyring::Error::NoEntry);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_keyring_store_roundtrip() {
        let store = match KeyringStore::try_new("tokenrelay-test-ops") {
            Ok(s) => s,
            Err(_) => {
                eprintln!("Skipping test_keyring_store_roundtrip: keyring unavailable");
                return;
            }
        };

        let principal = format!(
            "test-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        let credential = Credential::new(principal.as_str(), "test-value");

        store.upsert(&credential).await.unwrap();

        let fetched = store.fetch(&credential.principal_id).await.unwrap();
        store.remove(&credential.principal_id).await.unwrap();

        let fetched = fetched.expect("keyring store lost a credential it accepted");
        assert_eq!(fetched.access_token.expose(), "test-value");
        let removed = store.fetch(&credential.principal_id).await.unwrap();
        assert!(removed.is_none());
    }
}
