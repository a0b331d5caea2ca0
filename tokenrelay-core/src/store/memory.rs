//! In-memory credential storage implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{CredentialStore, StoreError, record_key};
use crate::model::{Credential, PrincipalId};

/// In-memory credential store for testing and development.
///
/// This store is not persistent; data is lost when the process exits.
/// Records are kept serialized so every fetch returns a fresh copy, the same
/// as a remote key-value service would.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a memory store pre-populated with credentials.
    pub fn with_credentials(
        credentials: impl IntoIterator<Item = Credential>,
    ) -> Result<Self, StoreError> {
        let mut data = HashMap::new();
        for credential in credentials {
            data.insert(
                record_key(&credential.principal_id),
                serde_json::to_string(&credential)?,
            );
        }
        Ok(Self {
            data: RwLock::new(data),
        })
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.len())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn fetch(&self, principal: &PrincipalId) -> Result<Option<Credential>, StoreError> {
        let raw = self.data.read().get(&record_key(principal)).cloned();
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, credential: &Credential) -> Result<(), StoreError> {
        let json = serde_json::to_string(credential)?;
        self.data
            .write()
            .insert(record_key(&credential.principal_id), json);
        Ok(())
    }

    async fn remove(&self, principal: &PrincipalId) -> Result<(), StoreError> {
        self.data.write().remove(&record_key(principal));
        Ok(())
    }
}
