//! Integration tests for fallback search through the orchestrator.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokenrelay_core::{
    Credential, CredentialManager, FallbackSearch, MemoryStore, PrincipalId, QueryStep,
    RefreshError, RefreshService, RefreshedGrant, RelayConfig, RemoteError, RemoteItem,
    RemoteSearch, RequestOrchestrator, Secret,
};

struct NeverRefresh;

#[async_trait]
impl RefreshService for NeverRefresh {
    async fn refresh(
        &self,
        _principal: &PrincipalId,
        _refresh_token: &Secret,
    ) -> Result<RefreshedGrant, RefreshError> {
        Err(RefreshError::Misconfigured {
            message: "unused".to_string(),
        })
    }
}

/// A file index that, like a case-sensitive remote backend, only matches
/// `name contains '<term>'` queries whose term appears verbatim in a name.
struct FileIndex {
    files: Vec<&'static str>,
    unavailable: bool,
    queries: Mutex<Vec<String>>,
    tokens: Mutex<Vec<String>>,
}

impl FileIndex {
    fn new(files: Vec<&'static str>) -> Self {
        Self {
            files,
            unavailable: false,
            queries: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(Vec::new())
        }
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl RemoteSearch for FileIndex {
    type Item = RemoteItem;
    type Error = RemoteError;

    async fn search(
        &self,
        credential: &Credential,
        query: &str,
        page_size: usize,
    ) -> Result<Vec<RemoteItem>, RemoteError> {
        self.queries.lock().push(query.to_string());
        self.tokens
            .lock()
            .push(credential.access_token.expose().to_string());

        if self.unavailable {
            return Err(RemoteError::status(503, "Backend Error"));
        }

        // Only plain contains-queries are understood by this index.
        let Some(term) = query
            .strip_prefix("name contains '")
            .and_then(|rest| rest.strip_suffix('\''))
        else {
            return Ok(Vec::new());
        };

        Ok(self
            .files
            .iter()
            .filter(|name| name.contains(term))
            .take(page_size)
            .map(|name| RemoteItem::new(*name))
            .collect())
    }
}

async fn setup() -> RequestOrchestrator<MemoryStore, NeverRefresh> {
    let manager = CredentialManager::new(
        Arc::new(MemoryStore::new()),
        NeverRefresh,
        &RelayConfig::default(),
    )
    .unwrap();
    manager
        .store_credential(&Credential::new("alice", "alice-token"))
        .await
        .unwrap();
    RequestOrchestrator::new(manager, FallbackSearch::default())
}

fn alice() -> PrincipalId {
    PrincipalId::new("alice")
}

fn names(items: &[RemoteItem]) -> Vec<&str> {
    items.iter().map(|i| i.name.as_str()).collect()
}

#[tokio::test]
async fn test_lowercase_match_stops_after_second_step() {
    let orchestrator = setup().await;
    let index = FileIndex::new(vec!["sintes quarterly report", "unrelated"]);

    let items = orchestrator
        .search(&alice(), "name contains 'Sintes'", 10, &index)
        .await
        .unwrap();

    assert_eq!(names(&items), vec!["sintes quarterly report"]);
    assert_eq!(
        index.queries(),
        vec!["name contains 'Sintes'", "name contains 'sintes'"]
    );
}

#[tokio::test]
async fn test_no_match_runs_each_step_once() {
    let orchestrator = setup().await;
    let index = FileIndex::new(vec!["nothing relevant"]);

    let outcome = orchestrator
        .search_outcome(&alice(), "name contains 'Sintes'", 10, &index)
        .await
        .unwrap();

    assert!(outcome.items.is_empty());
    assert_eq!(outcome.matched_step, None);

    let queries = index.queries();
    assert_eq!(queries.len(), 6);
    let mut unique = queries.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 6);
}

#[tokio::test]
async fn test_prefix_match_is_filtered_case_insensitively() {
    let orchestrator = setup().await;
    // Neither "Quarterly" nor its case variants appear verbatim, but the
    // prefix "Quart" does.
    let index = FileIndex::new(vec!["QuartERLY plan", "Quartz notes", "Quarterly-ish"]);

    let outcome = orchestrator
        .search_outcome(&alice(), "name contains 'Quarterlyx'", 10, &index)
        .await
        .unwrap();

    assert!(outcome.items.is_empty());

    let outcome = orchestrator
        .search_outcome(&alice(), "name contains 'Quarterly'", 10, &index)
        .await
        .unwrap();

    assert_eq!(outcome.matched_step, Some(QueryStep::Verbatim));

    let index = FileIndex::new(vec!["QuartERLY plan", "Quartz notes"]);
    let outcome = orchestrator
        .search_outcome(&alice(), "name contains 'Quarterly'", 10, &index)
        .await
        .unwrap();

    assert_eq!(outcome.matched_step, Some(QueryStep::Prefix));
    assert_eq!(names(&outcome.items), vec!["QuartERLY plan"]);
}

#[tokio::test]
async fn test_failing_backend_yields_empty_result() {
    let orchestrator = setup().await;
    let index = FileIndex::unavailable();

    let items = orchestrator
        .search(&alice(), "name contains 'Sintes'", 5, &index)
        .await
        .unwrap();

    assert!(items.is_empty());
    assert_eq!(index.queries().len(), 6);
}

#[tokio::test]
async fn test_every_step_uses_the_same_credential() {
    let orchestrator = setup().await;
    let index = FileIndex::new(Vec::new());

    orchestrator
        .search(&alice(), "name contains 'Budget'", 5, &index)
        .await
        .unwrap();

    let tokens = index.tokens.lock().clone();
    assert_eq!(tokens.len(), 6);
    assert!(tokens.iter().all(|t| t == "alice-token"));
}

#[tokio::test]
async fn test_unknown_principal_fails_before_searching() {
    let orchestrator = setup().await;
    let index = FileIndex::new(vec!["sintes"]);

    let err = orchestrator
        .search(&PrincipalId::new("nobody"), "name contains 'sintes'", 5, &index)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), tokenrelay_core::ErrorKind::Authentication);
    assert!(index.queries().is_empty());
}
