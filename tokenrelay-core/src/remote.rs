//! Interfaces to the remote resource API.
//!
//! The core never interprets resource payloads. It only needs:
//! - [`RemoteError`] - a ready-made error type for remote operations
//! - [`RemoteSearch`] - the search operation used by the fallback engine
//! - [`SearchHit`] - access to an item's display name for client-side filtering

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Credential;

/// Failure reported by a remote resource operation.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote API answered with a non-success status.
    #[error("remote returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Status code, if the remote produced one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Turn a non-success response into a [`RemoteError::Status`].
    ///
    /// Successful responses are returned unchanged.
    #[cfg(feature = "http")]
    pub async fn from_response(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body
        };
        Err(RemoteError::status(status.as_u16(), message))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => RemoteError::status(status.as_u16(), err.to_string()),
            None => RemoteError::transport(err.to_string()),
        }
    }
}

/// An item returned by a remote search that exposes a display name.
pub trait SearchHit {
    fn name(&self) -> &str;
}

/// Generic search result: an identifier, a name, and whatever else the
/// remote API returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RemoteItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl SearchHit for RemoteItem {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Remote search operation used by the fallback query engine.
///
/// `query` is the remote API's query language (for example
/// `name contains 'budget'`); `page_size` caps the number of items returned.
#[async_trait]
pub trait RemoteSearch: Send + Sync {
    type Item: SearchHit + Send;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn search(
        &self,
        credential: &Credential,
        query: &str,
        page_size: usize,
    ) -> Result<Vec<Self::Item>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_item_keeps_extra_fields() {
        let json = serde_json::json!({
            "id": "1abc",
            "name": "Sintes Budget",
            "mimeType": "application/vnd.google-apps.spreadsheet"
        });

        let item: RemoteItem = serde_json::from_value(json).unwrap();
        assert_eq!(item.name(), "Sintes Budget");
        assert_eq!(item.id.as_deref(), Some("1abc"));
        assert_eq!(
            item.extra.get("mimeType").and_then(|v| v.as_str()),
            Some("application/vnd.google-apps.spreadsheet")
        );
    }

    #[test]
    fn test_remote_error_status_code() {
        assert_eq!(RemoteError::status(404, "gone").status_code(), Some(404));
        assert_eq!(RemoteError::transport("reset").status_code(), None);
        assert_eq!(
            RemoteError::status(429, "slow down").to_string(),
            "remote returned HTTP 429: slow down"
        );
    }
}
