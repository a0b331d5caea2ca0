//! Request orchestration: the entry point for authenticated remote calls.

use std::error::Error as StdError;
use std::future::Future;
use tracing::Instrument;
use uuid::Uuid;

use crate::classify::classify;
use crate::error::{ClassifiedError, ErrorKind};
use crate::lifecycle::CredentialManager;
use crate::model::{Credential, PrincipalId};
use crate::refresh::RefreshService;
use crate::remote::RemoteSearch;
use crate::search::{FallbackSearch, SearchOutcome};
use crate::store::CredentialStore;

/// Obtains credentials for principals and runs remote operations with them.
///
/// Every failure that reaches the caller is a [`ClassifiedError`]. Remote
/// operations are never retried here; only credential store reads are.
pub struct RequestOrchestrator<S, R> {
    manager: CredentialManager<S, R>,
    search: FallbackSearch,
}

impl<S: CredentialStore, R: RefreshService> RequestOrchestrator<S, R> {
    pub fn new(manager: CredentialManager<S, R>, search: FallbackSearch) -> Self {
        Self { manager, search }
    }

    pub fn manager(&self) -> &CredentialManager<S, R> {
        &self.manager
    }

    pub fn search_engine(&self) -> &FallbackSearch {
        &self.search
    }

    /// Run `operation` with a valid credential for `principal`.
    ///
    /// Credential errors are returned unchanged. An operation error is
    /// classified; `Authentication` failures carry the principal's
    /// reauthorization URL.
    pub async fn invoke<T, E, F, Fut>(
        &self,
        principal: &PrincipalId,
        operation: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + Send + Sync + 'static,
    {
        let span = request_span(principal, "invoke");

        async move {
            let credential = self.manager.get_valid_credential(principal).await?;

            match operation(credential).await {
                Ok(value) => Ok(value),
                Err(e) => {
                    let classified = self.decorate(principal, classify(&e));
                    tracing::warn!(
                        "Remote operation failed ({}): {}",
                        classified.kind(),
                        classified.message()
                    );
                    Err(classified)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run a fallback search for `principal`.
    ///
    /// The credential is obtained once and shared by every plan step. An
    /// exhausted plan is an empty list, not an error.
    pub async fn search<RS: RemoteSearch>(
        &self,
        principal: &PrincipalId,
        raw_query: &str,
        max_results: usize,
        remote: &RS,
    ) -> Result<Vec<RS::Item>, ClassifiedError> {
        self.search_outcome(principal, raw_query, max_results, remote)
            .await
            .map(|outcome| outcome.items)
    }

    /// Like [`search`](Self::search), but reports which step matched.
    pub async fn search_outcome<RS: RemoteSearch>(
        &self,
        principal: &PrincipalId,
        raw_query: &str,
        max_results: usize,
        remote: &RS,
    ) -> Result<SearchOutcome<RS::Item>, ClassifiedError> {
        let span = request_span(principal, "search");

        async move {
            let credential = self.manager.get_valid_credential(principal).await?;
            Ok(self
                .search
                .search(remote, &credential, raw_query, max_results)
                .await)
        }
        .instrument(span)
        .await
    }

    fn decorate(&self, principal: &PrincipalId, error: ClassifiedError) -> ClassifiedError {
        if error.kind() == ErrorKind::Authentication && error.reauthorization_url().is_none() {
            error.with_reauthorization_url(&self.manager.reauthorization_url(principal))
        } else {
            error
        }
    }
}

fn request_span(principal: &PrincipalId, operation: &'static str) -> tracing::Span {
    tracing::info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        principal = %principal,
        operation
    )
}
