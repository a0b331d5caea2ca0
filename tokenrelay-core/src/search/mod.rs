//! Fallback search.
//!
//! A search intent is expanded into a [`QueryPlan`] of progressively relaxed
//! queries. [`FallbackSearch`] runs the plan against a [`RemoteSearch`]
//! strictly in order and stops at the first step that yields any items.
//!
//! A step that fails is classified, logged and skipped; it never aborts the
//! plan. When every step comes back empty the outcome is an empty result,
//! not an error.

mod plan;

pub use plan::{ContainsQuery, QueryAttempt, QueryPlan, QueryStep, prefix_len};

use serde::{Deserialize, Serialize};

use crate::classify::classify;
use crate::model::Credential;
use crate::remote::{RemoteSearch, SearchHit};

/// Subtype restrictions used by the narrowing steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Item attribute the narrowing steps filter on.
    #[serde(default = "default_subtype_field")]
    pub subtype_field: String,

    /// Subtype value for document-shaped items.
    #[serde(default = "default_document_subtype")]
    pub document_subtype: String,

    /// Subtype value for tabular items.
    #[serde(default = "default_tabular_subtype")]
    pub tabular_subtype: String,
}

fn default_subtype_field() -> String {
    "mimeType".to_string()
}

fn default_document_subtype() -> String {
    "application/vnd.google-apps.document".to_string()
}

fn default_tabular_subtype() -> String {
    "application/vnd.google-apps.spreadsheet".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            subtype_field: default_subtype_field(),
            document_subtype: default_document_subtype(),
            tabular_subtype: default_tabular_subtype(),
        }
    }
}

/// Result of running a [`QueryPlan`].
#[derive(Debug, Clone)]
pub struct SearchOutcome<T> {
    /// Items from the first step that produced any, at most `max_results`.
    pub items: Vec<T>,
    /// The step that produced `items`, if any did.
    pub matched_step: Option<QueryStep>,
    /// Number of remote calls made.
    pub attempts: usize,
}

impl<T> SearchOutcome<T> {
    fn empty(attempts: usize) -> Self {
        Self {
            items: Vec::new(),
            matched_step: None,
            attempts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Runs query plans against a remote search.
#[derive(Debug, Clone, Default)]
pub struct FallbackSearch {
    config: SearchConfig,
}

impl FallbackSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Build the plan for a raw query without running it.
    pub fn plan(&self, raw_query: &str, max_results: usize) -> QueryPlan {
        QueryPlan::build(raw_query, max_results, &self.config)
    }

    /// Plan and run a search.
    pub async fn search<RS: RemoteSearch>(
        &self,
        remote: &RS,
        credential: &Credential,
        raw_query: &str,
        max_results: usize,
    ) -> SearchOutcome<RS::Item> {
        let plan = self.plan(raw_query, max_results);
        self.execute(&plan, remote, credential).await
    }

    /// Run a plan, stopping at the first step with results.
    pub async fn execute<RS: RemoteSearch>(
        &self,
        plan: &QueryPlan,
        remote: &RS,
        credential: &Credential,
    ) -> SearchOutcome<RS::Item> {
        let mut attempts = 0;

        for attempt in plan.attempts() {
            attempts += 1;
            tracing::debug!("Search step {}: {}", attempt.step, attempt.query);

            let items = match remote
                .search(credential, &attempt.query, attempt.page_size)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    let classified = classify(&e);
                    tracing::warn!(
                        "Search step {} failed ({}), trying next step: {}",
                        attempt.step,
                        classified.kind(),
                        classified.message()
                    );
                    continue;
                }
            };

            let items = narrow(items, attempt, plan.max_results());
            if !items.is_empty() {
                tracing::debug!(
                    "Search step {} matched {} item(s)",
                    attempt.step,
                    items.len()
                );
                return SearchOutcome {
                    items,
                    matched_step: Some(attempt.step),
                    attempts,
                };
            }
        }

        tracing::info!(
            "No results for {:?} after {} step(s)",
            plan.raw_query(),
            attempts
        );
        SearchOutcome::empty(attempts)
    }
}

fn narrow<T: SearchHit>(mut items: Vec<T>, attempt: &QueryAttempt, max_results: usize) -> Vec<T> {
    if let Some(filter) = &attempt.name_filter {
        let needle = filter.to_lowercase();
        items.retain(|item| item.name().to_lowercase().contains(&needle));
    }
    items.truncate(max_results);
    items
}
