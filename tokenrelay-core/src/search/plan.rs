//! Query plans: ordered query relaxations for one search intent.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use super::SearchConfig;

/// Minimum prefix length, and minimum term length for the prefix step.
const MIN_PREFIX_CHARS: usize = 4;

/// Page size multiplier for the prefix step, which filters client-side.
const PREFIX_PAGE_FACTOR: usize = 3;

static CONTAINS_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s+(?i:contains)\s+'((?:[^'\\]|\\.)*)'\s*$")
        .expect("contains-query pattern is valid")
});

/// One relaxation strategy, in plan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStep {
    /// The raw query as given.
    Verbatim,
    /// Term lower-cased.
    Lowercase,
    /// Term upper-cased.
    Uppercase,
    /// Truncated term prefix, filtered client-side on the full term.
    Prefix,
    /// Lower-cased term restricted to document-shaped items.
    DocumentsOnly,
    /// Lower-cased term restricted to tabular items.
    TabularOnly,
}

impl fmt::Display for QueryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryStep::Verbatim => "verbatim",
            QueryStep::Lowercase => "lowercase",
            QueryStep::Uppercase => "uppercase",
            QueryStep::Prefix => "prefix",
            QueryStep::DocumentsOnly => "documents_only",
            QueryStep::TabularOnly => "tabular_only",
        };
        f.write_str(name)
    }
}

/// A concrete remote call produced by one [`QueryStep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAttempt {
    pub step: QueryStep,
    /// Query string sent to the remote search.
    pub query: String,
    /// Page size requested from the remote search.
    pub page_size: usize,
    /// Keep only items whose name contains this text (case-insensitive).
    pub name_filter: Option<String>,
}

/// A `<field> contains '<term>'` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainsQuery {
    pub field: String,
    pub term: String,
}

impl ContainsQuery {
    /// Parse a raw query; `None` if it is not of the `contains` shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let captures = CONTAINS_QUERY.captures(raw)?;
        Some(Self {
            field: captures[1].to_string(),
            term: unescape(&captures[2]),
        })
    }

    /// Render the same shape around a different term.
    pub fn render(&self, term: &str) -> String {
        format!("{} contains '{}'", self.field, escape(term))
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Prefix length used by the prefix step for a term of `len` characters.
pub fn prefix_len(len: usize) -> usize {
    MIN_PREFIX_CHARS.max(len * 6 / 10)
}

/// Ordered, immutable list of query attempts for one search intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    raw_query: String,
    max_results: usize,
    attempts: Vec<QueryAttempt>,
}

impl QueryPlan {
    /// Build the plan for a raw query.
    ///
    /// Steps whose precondition does not hold are left out. A zero
    /// `max_results` yields an empty plan.
    pub fn build(raw_query: &str, max_results: usize, config: &SearchConfig) -> Self {
        let mut attempts = Vec::new();

        if max_results > 0 {
            attempts.push(QueryAttempt {
                step: QueryStep::Verbatim,
                query: raw_query.to_string(),
                page_size: max_results,
                name_filter: None,
            });

            if let Some(contains) = ContainsQuery::parse(raw_query) {
                attempts.extend(relaxations(&contains, max_results, config));
            }
        }

        Self {
            raw_query: raw_query.to_string(),
            max_results,
            attempts,
        }
    }

    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn attempts(&self) -> &[QueryAttempt] {
        &self.attempts
    }

    pub fn steps(&self) -> impl Iterator<Item = QueryStep> + '_ {
        self.attempts.iter().map(|a| a.step)
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

fn relaxations(
    contains: &ContainsQuery,
    max_results: usize,
    config: &SearchConfig,
) -> Vec<QueryAttempt> {
    let lower = contains.term.to_lowercase();
    let upper = contains.term.to_uppercase();
    let attempt = |step, query| QueryAttempt {
        step,
        query,
        page_size: max_results,
        name_filter: None,
    };

    let mut attempts = vec![
        attempt(QueryStep::Lowercase, contains.render(&lower)),
        attempt(QueryStep::Uppercase, contains.render(&upper)),
    ];

    let term_len = contains.term.chars().count();
    if term_len >= MIN_PREFIX_CHARS {
        let prefix: String = contains.term.chars().take(prefix_len(term_len)).collect();
        attempts.push(QueryAttempt {
            step: QueryStep::Prefix,
            query: contains.render(&prefix),
            page_size: max_results.saturating_mul(PREFIX_PAGE_FACTOR),
            name_filter: Some(contains.term.clone()),
        });
    }

    let narrowed = |subtype: &str| {
        format!(
            "{} and {} = '{}'",
            contains.render(&lower),
            config.subtype_field,
            escape(subtype)
        )
    };
    attempts.push(attempt(
        QueryStep::DocumentsOnly,
        narrowed(&config.document_subtype),
    ));
    attempts.push(attempt(
        QueryStep::TabularOnly,
        narrowed(&config.tabular_subtype),
    ));

    attempts
}
