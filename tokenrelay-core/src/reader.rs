//! Retrying read path over a [`CredentialStore`].
//!
//! [`ResilientReader`] separates "the principal has no record" from "the store
//! could not answer". Absence is a normal outcome and is returned on the first
//! attempt; any other failure is retried with linear backoff and, once the
//! attempts are used up, reported as [`ErrorKind::Temporary`](crate::ErrorKind).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ClassifiedError;
use crate::model::{Credential, PrincipalId};
use crate::store::CredentialStore;

/// Default number of read attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff unit in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Retry settings for store reads.
///
/// Attempt `n` (1-based) that fails waits `n × base_delay` before attempt
/// `n + 1`, so delays strictly increase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms) * attempt
    }
}

/// Store reader with retry and absent/unavailable discrimination.
pub struct ResilientReader<S> {
    store: Arc<S>,
    policy: RetryPolicy,
}

impl<S> Clone for ResilientReader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy.clone(),
        }
    }
}

impl<S: CredentialStore> ResilientReader<S> {
    pub fn new(store: Arc<S>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Read a principal's credential.
    ///
    /// Returns `Ok(None)` when the store reports no record. Fails with a
    /// `Temporary` error only after every attempt failed.
    pub async fn read(&self, principal: &PrincipalId) -> Result<Option<Credential>, ClassifiedError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.store.fetch(principal).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_not_found() => {
                    tracing::debug!("No credential record for {}", principal);
                    return Ok(None);
                }
                Err(e) if attempt >= max_attempts => {
                    tracing::error!(
                        "Credential store read for {} failed after {} attempts: {}",
                        principal,
                        attempt,
                        e
                    );
                    return Err(ClassifiedError::temporary(format!(
                        "credential store unavailable after {} attempts: {}",
                        attempt, e
                    )));
                }
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        "Credential store read for {} failed (attempt {}/{}), retrying in {:?}: {}",
                        principal,
                        attempt,
                        max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    /// Store that replays scripted fetch outcomes and records when each
    /// fetch happened.
    struct ScriptedStore {
        outcomes: Mutex<VecDeque<Result<Option<Credential>, StoreError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedStore {
        fn new(outcomes: Vec<Result<Option<Credential>, StoreError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CredentialStore for ScriptedStore {
        async fn fetch(&self, _principal: &PrincipalId) -> Result<Option<Credential>, StoreError> {
            self.calls.lock().push(Instant::now());
            self.outcomes.lock().pop_front().unwrap_or(Ok(None))
        }

        async fn upsert(&self, _credential: &Credential) -> Result<(), StoreError> {
            Ok(())
        }

        async fn remove(&self, _principal: &PrincipalId) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn unavailable() -> Result<Option<Credential>, StoreError> {
        Err(StoreError::Unavailable {
            message: "connection reset".to_string(),
        })
    }

    fn reader(store: &Arc<ScriptedStore>) -> ResilientReader<ScriptedStore> {
        ResilientReader::new(Arc::clone(store), RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_retry_three_times_with_growing_delay() {
        let store = Arc::new(ScriptedStore::new(vec![unavailable(), unavailable(), unavailable()]));

        let err = reader(&store)
            .read(&PrincipalId::new("alice"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Temporary);
        let times = store.call_times();
        assert_eq!(times.len(), 3);

        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert!(first_gap >= Duration::from_secs(1) && first_gap < Duration::from_secs(2));
        assert!(second_gap >= Duration::from_secs(2) && second_gap < Duration::from_secs(3));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_record_is_not_retried() {
        let store = Arc::new(ScriptedStore::new(vec![Ok(None)]));

        let result = reader(&store).read(&PrincipalId::new("alice")).await.unwrap();

        assert!(result.is_none());
        assert_eq!(store.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_error_means_absent() {
        let store = Arc::new(ScriptedStore::new(vec![Err(StoreError::NotFound {
            principal: "alice".to_string(),
        })]));

        let result = reader(&store).read(&PrincipalId::new("alice")).await.unwrap();

        assert!(result.is_none());
        assert_eq!(store.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let credential = Credential::new("alice", "access");
        let store = Arc::new(ScriptedStore::new(vec![unavailable(), Ok(Some(credential.clone()))]));

        let result = reader(&store).read(&PrincipalId::new("alice")).await.unwrap();

        assert_eq!(result, Some(credential));
        assert_eq!(store.call_times().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy_does_not_sleep() {
        let store = Arc::new(ScriptedStore::new(vec![unavailable()]));
        let reader = ResilientReader::new(Arc::clone(&store), RetryPolicy::new(1, Duration::from_secs(5)));

        let start = Instant::now();
        let err = reader.read(&PrincipalId::new("alice")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Temporary);
        assert!(Instant::now() - start < Duration::from_secs(1));
    }

    #[test]
    fn test_delay_after_is_linear() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        assert_eq!(policy.delay_after(1), Duration::from_millis(250));
        assert_eq!(policy.delay_after(2), Duration::from_millis(500));
    }
}
