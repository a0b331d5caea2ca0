//! Caller-facing error taxonomy.
//!
//! Every fallible core operation returns a [`ClassifiedError`]: a failure
//! tagged with exactly one [`ErrorKind`]. Lower layers keep their own error
//! enums and are converted at the component boundary, either explicitly or
//! through [`classify`](crate::classify::classify).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Semantic category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No usable credential; the principal must (re)authorize.
    Authentication,
    /// The remote resource does not exist.
    NotFound,
    /// The credential is valid but lacks access to the resource.
    PermissionDenied,
    /// Transient failure; the same call may succeed later.
    Temporary,
    /// The remote API is throttling requests.
    RateLimited,
    /// Anything that matched no other category.
    Unknown,
}

impl ErrorKind {
    /// All kinds.
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Authentication,
        ErrorKind::NotFound,
        ErrorKind::PermissionDenied,
        ErrorKind::Temporary,
        ErrorKind::RateLimited,
        ErrorKind::Unknown,
    ];

    /// Whether a caller may retry a call that failed with this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Temporary | ErrorKind::RateLimited)
    }

    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Temporary => "temporary",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Message used when a failure arrives without any detail.
    fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication required",
            ErrorKind::NotFound => "resource not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Temporary => "service temporarily unavailable",
            ErrorKind::RateLimited => "rate limit exceeded",
            ErrorKind::Unknown => "unknown error",
        }
    }

    /// What the caller should do about a failure of this kind.
    fn guidance(self) -> &'static str {
        match self {
            ErrorKind::Authentication => "Re-authorize this user before retrying.",
            ErrorKind::NotFound => "Check the identifier or search for the resource by name.",
            ErrorKind::PermissionDenied => {
                "The user's grant does not cover this resource; request access or broader scopes."
            }
            ErrorKind::Temporary => "This is transient; retry the request shortly.",
            ErrorKind::RateLimited => "Too many requests; wait before retrying.",
            ErrorKind::Unknown => "Unexpected failure; inspect the message for details.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure tagged with exactly one [`ErrorKind`].
///
/// The message is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reauthorization_url: Option<String>,
}

impl ClassifiedError {
    /// Create a classified error.
    ///
    /// A blank message is replaced by the kind's default description.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            kind.default_message().to_string()
        } else {
            message
        };
        Self {
            kind,
            message,
            status: None,
            reauthorization_url: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn temporary(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Temporary, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Record the remote status code that produced this error.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the URL the principal should visit to re-authorize.
    pub fn with_reauthorization_url(mut self, url: &Url) -> Self {
        self.reauthorization_url = Some(url.to_string());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Remote status code, when one was observed.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Where the principal can re-authorize, for `Authentication` errors.
    pub fn reauthorization_url(&self) -> Option<&str> {
        self.reauthorization_url.as_deref()
    }

    /// True only for `Temporary` and `RateLimited`.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Render the kind-specific, actionable message shown to callers.
    pub fn render(&self) -> String {
        match (self.kind, &self.reauthorization_url) {
            (ErrorKind::Authentication, Some(url)) => format!(
                "{} Re-authorize this user at {} and retry.",
                self.message, url
            ),
            (kind, _) => format!("{} {}", self.message, kind.guidance()),
        }
    }
}
