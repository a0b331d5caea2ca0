//! Domain model types for Tokenrelay.
//!
//! This module defines the core types used throughout the crate:
//! - [`PrincipalId`] - Identifier for the end user on whose behalf calls are made
//! - [`Credential`] - One principal's authorization grant

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::Secret;

/// Identifier for a principal (the end user a request acts for).
///
/// Principal IDs are stable across sessions and compared verbatim.
///
/// # Examples
///
/// ```
/// use tokenrelay_core::PrincipalId;
///
/// let alice = PrincipalId::new("alice@example.com");
/// assert_eq!(alice.as_str(), "alice@example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Create a new principal ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the principal ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PrincipalId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A principal's authorization grant.
///
/// A credential always carries an access token; there is no partially
/// written form. Stores persist the whole record under its principal ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// The principal this grant belongs to.
    pub principal_id: PrincipalId,

    /// Short-lived access token.
    pub access_token: Secret,

    /// Long-lived refresh token, absent if offline access was not granted.
    #[serde(default)]
    pub refresh_token: Option<Secret>,

    /// When the access token expires. `None` is treated as still valid.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,

    /// OAuth scopes granted to this credential.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When this record was last written.
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential holding only an access token.
    pub fn new(principal_id: impl Into<PrincipalId>, access_token: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            access_token: Secret::new(access_token),
            refresh_token: None,
            expiry: None,
            scopes: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token));
        self
    }

    /// Set the absolute expiry time.
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Set the granted scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Check if the access token has expired.
    ///
    /// Returns `false` if no expiry is recorded.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// Check if the access token expires before `now + buffer`.
    ///
    /// Returns `false` if no expiry is recorded. A buffer reaching past the
    /// representable range counts every expiry as within it.
    pub fn expires_within(&self, buffer: Duration) -> bool {
        let Some(expiry) = self.expiry else {
            return false;
        };
        match Utc::now().checked_add_signed(buffer) {
            Some(deadline) => expiry < deadline,
            None => buffer > Duration::zero(),
        }
    }
}
