//! Credential lifecycle management.
//!
//! [`CredentialManager`] hands out currently valid credentials. It reads
//! through a [`ResilientReader`], refreshes expired access tokens via a
//! [`RefreshService`], and persists every refreshed credential before
//! returning it.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokenrelay_core::{CredentialManager, MemoryStore, PrincipalId, RelayConfig};
//!
//! let manager = CredentialManager::new(Arc::new(MemoryStore::new()), refresher, &RelayConfig::default())?;
//! let credential = manager.get_valid_credential(&PrincipalId::new("alice")).await?;
//! ```

use chrono::Duration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::config::RelayConfig;
use crate::error::ClassifiedError;
use crate::model::{Credential, PrincipalId};
use crate::reader::{ResilientReader, RetryPolicy};
use crate::refresh::{RefreshError, RefreshService};
use crate::store::CredentialStore;

/// Query parameter carrying the principal on the login URL.
const LOGIN_PRINCIPAL_PARAM: &str = "user_id";

type RefreshLocks = Mutex<HashMap<PrincipalId, Arc<tokio::sync::Mutex<()>>>>;

/// Produces valid credentials for principals, refreshing when needed.
///
/// # Type Parameters
///
/// * `S` - The credential store implementation
/// * `R` - The refresh service implementation
pub struct CredentialManager<S, R> {
    store: Arc<S>,
    reader: ResilientReader<S>,
    refresher: R,
    login_url: Url,
    expiry_buffer: Duration,
    refresh_locks: RefreshLocks,
}

impl<S: CredentialStore, R: RefreshService> CredentialManager<S, R> {
    /// Create a manager from configuration.
    ///
    /// Fails if the configuration does not validate.
    pub fn new(store: Arc<S>, refresher: R, config: &RelayConfig) -> Result<Self, ClassifiedError> {
        config
            .validate()
            .map_err(|e| ClassifiedError::unknown(e.to_string()))?;
        let login_url = config
            .login_url()
            .map_err(|e| ClassifiedError::unknown(e.to_string()))?;
        let expiry_buffer = Duration::try_seconds(config.expiry_buffer_secs).ok_or_else(|| {
            ClassifiedError::unknown(format!(
                "expiry buffer of {} seconds is out of range",
                config.expiry_buffer_secs
            ))
        })?;

        Ok(Self::with_parts(
            store,
            refresher,
            config.retry.clone(),
            login_url,
            expiry_buffer,
        ))
    }

    /// Create a manager from already-validated parts.
    pub fn with_parts(
        store: Arc<S>,
        refresher: R,
        retry: RetryPolicy,
        login_url: Url,
        expiry_buffer: Duration,
    ) -> Self {
        Self {
            reader: ResilientReader::new(Arc::clone(&store), retry),
            store,
            refresher,
            login_url,
            expiry_buffer,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// URL the principal should visit to (re)authorize.
    pub fn reauthorization_url(&self, principal: &PrincipalId) -> Url {
        let mut url = self.login_url.clone();
        url.query_pairs_mut()
            .append_pair(LOGIN_PRINCIPAL_PARAM, principal.as_str());
        url
    }

    fn authentication_error(&self, principal: &PrincipalId, message: String) -> ClassifiedError {
        ClassifiedError::authentication(message)
            .with_reauthorization_url(&self.reauthorization_url(principal))
    }

    fn needs_refresh(&self, credential: &Credential) -> bool {
        credential.expires_within(self.expiry_buffer)
    }

    /// Return a currently valid credential for the principal.
    ///
    /// 1. Absent record: `Authentication`, with a reauthorization URL.
    /// 2. Expired: refresh, persist, return the persisted credential. A failed
    ///    refresh is `Authentication`; a failed write is `Temporary`.
    /// 3. Otherwise the stored credential is returned as-is. A missing expiry
    ///    counts as valid.
    ///
    /// Store read failures surface as `Temporary`, never `Authentication`.
    pub async fn get_valid_credential(
        &self,
        principal: &PrincipalId,
    ) -> Result<Credential, ClassifiedError> {
        let credential = self.read_existing(principal).await?;

        if !self.needs_refresh(&credential) {
            tracing::debug!("Using stored access token for {}", principal);
            return Ok(credential);
        }

        let entry = self.refresh_lock(principal);
        let _guard = entry.mutex().lock().await;

        // Another request may have refreshed while this one waited.
        let current = self.read_existing(principal).await?;
        if !self.needs_refresh(&current) {
            tracing::debug!("Access token for {} was refreshed concurrently", principal);
            return Ok(current);
        }

        self.refresh_and_persist(principal, &current).await
    }

    async fn read_existing(&self, principal: &PrincipalId) -> Result<Credential, ClassifiedError> {
        match self.reader.read(principal).await? {
            Some(credential) => Ok(credential),
            None => {
                tracing::info!("No credential stored for {}", principal);
                Err(self.authentication_error(
                    principal,
                    format!("no credential stored for {}", principal),
                ))
            }
        }
    }

    async fn refresh_and_persist(
        &self,
        principal: &PrincipalId,
        credential: &Credential,
    ) -> Result<Credential, ClassifiedError> {
        tracing::info!("Access token expired for {}, attempting refresh", principal);

        let refreshed = match &credential.refresh_token {
            Some(refresh_token) => self.refresher.refresh(principal, refresh_token).await,
            None => Err(RefreshError::MissingRefreshToken {
                principal: principal.to_string(),
            }),
        };

        let grant = match refreshed {
            Ok(grant) => grant,
            Err(e) => {
                tracing::error!("Failed to refresh token for {}: {}", principal, e);
                return Err(self.authentication_error(
                    principal,
                    format!("{}; re-authorization required", e),
                ));
            }
        };

        let updated = grant.apply_to(credential);
        if let Err(e) = self.store.upsert(&updated).await {
            tracing::error!("Failed to persist refreshed credential for {}: {}", principal, e);
            return Err(ClassifiedError::temporary(format!(
                "refreshed credential for {} could not be persisted: {}",
                principal, e
            )));
        }

        tracing::info!("Successfully refreshed access token for {}", principal);
        Ok(updated)
    }

    fn refresh_lock<'a>(&'a self, principal: &'a PrincipalId) -> RefreshLockEntry<'a> {
        let mut locks = self.refresh_locks.lock();
        let mutex = Arc::clone(locks.entry(principal.clone()).or_default());
        RefreshLockEntry {
            locks: &self.refresh_locks,
            principal,
            mutex,
        }
    }

    /// Persist a credential produced by the authorization handshake.
    pub async fn store_credential(&self, credential: &Credential) -> Result<(), ClassifiedError> {
        self.store.upsert(credential).await.map_err(|e| {
            ClassifiedError::temporary(format!(
                "credential for {} could not be stored: {}",
                credential.principal_id, e
            ))
        })?;
        tracing::info!("Stored credential for {}", credential.principal_id);
        Ok(())
    }

    /// Delete a principal's credential. Succeeds if none was stored.
    pub async fn revoke(&self, principal: &PrincipalId) -> Result<(), ClassifiedError> {
        self.store.remove(principal).await.map_err(|e| {
            ClassifiedError::temporary(format!(
                "credential for {} could not be removed: {}",
                principal, e
            ))
        })?;
        tracing::info!("Revoked credential for {}", principal);
        Ok(())
    }

    #[cfg(test)]
    fn held_refresh_locks(&self) -> usize {
        self.refresh_locks.lock().len()
    }
}

/// A handle on one principal's refresh mutex.
///
/// Dropping the last handle removes the principal from the lock table, also
/// when the request is cancelled mid-refresh.
struct RefreshLockEntry<'a> {
    locks: &'a RefreshLocks,
    principal: &'a PrincipalId,
    mutex: Arc<tokio::sync::Mutex<()>>,
}

impl RefreshLockEntry<'_> {
    fn mutex(&self) -> &tokio::sync::Mutex<()> {
        &self.mutex
    }
}

impl Drop for RefreshLockEntry<'_> {
    fn drop(&mut self) {
        // Handles are only cloned under the table lock, so the count is stable here.
        let mut locks = self.locks.lock();
        if let Some(held) = locks.get(self.principal) {
            if Arc::ptr_eq(held, &self.mutex) && Arc::strong_count(held) == 2 {
                locks.remove(self.principal);
            }
        }
    }
}
