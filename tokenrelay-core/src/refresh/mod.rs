//! Access-token refresh.
//!
//! This module provides:
//! - [`RefreshService`] - Trait for exchanging a refresh token for a new grant
//! - [`RefreshedGrant`] - What a successful exchange returns
//! - [`OAuthRefresher`] - OAuth 2.0 refresh-token grant (with `oauth` feature)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Credential, PrincipalId};
use crate::store::Secret;

#[cfg(feature = "oauth")]
mod oauth;

#[cfg(feature = "oauth")]
pub use oauth::{OAuthRefresher, ProviderConfig, create_oauth_client};

/// Error type for refresh exchanges.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The credential has no refresh token to exchange.
    #[error("no refresh token stored for {principal}")]
    MissingRefreshToken { principal: String },

    /// The authorization server rejected the refresh token.
    #[error("refresh token rejected: {message}")]
    Rejected { message: String },

    /// The exchange could not be completed.
    #[error("refresh request failed: {message}")]
    Transport { message: String },

    /// The refresh client is not configured correctly.
    #[error("refresh not configured: {message}")]
    Misconfigured { message: String },
}

/// Result of a successful refresh exchange.
#[derive(Debug, Clone)]
pub struct RefreshedGrant {
    /// The new access token.
    pub access_token: Secret,

    /// A rotated refresh token, if the server issued one.
    pub refresh_token: Option<Secret>,

    /// When the new access token expires.
    pub expiry: Option<DateTime<Utc>>,

    /// Scopes reported by the server; empty means unchanged.
    pub scopes: Vec<String>,
}

impl RefreshedGrant {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            refresh_token: None,
            expiry: None,
            scopes: Vec::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token));
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Apply this grant to the credential it refreshed.
    ///
    /// The access token and expiry are replaced; the refresh token and scopes
    /// are replaced only when the server sent new ones.
    pub fn apply_to(self, previous: &Credential) -> Credential {
        let RefreshedGrant {
            access_token,
            refresh_token,
            expiry,
            scopes,
        } = self;

        Credential {
            principal_id: previous.principal_id.clone(),
            access_token,
            refresh_token: refresh_token.or_else(|| previous.refresh_token.clone()),
            expiry,
            scopes: if scopes.is_empty() {
                previous.scopes.clone()
            } else {
                scopes
            },
            updated_at: Utc::now(),
        }
    }
}

/// Exchanges refresh tokens with the external authorization service.
#[async_trait]
pub trait RefreshService: Send + Sync {
    async fn refresh(
        &self,
        principal: &PrincipalId,
        refresh_token: &Secret,
    ) -> Result<RefreshedGrant, RefreshError>;
}

#[async_trait]
impl<T: RefreshService + ?Sized> RefreshService for std::sync::Arc<T> {
    async fn refresh(
        &self,
        principal: &PrincipalId,
        refresh_token: &Secret,
    ) -> Result<RefreshedGrant, RefreshError> {
        (**self).refresh(principal, refresh_token).await
    }
}

#[async_trait]
impl<T: RefreshService + ?Sized> RefreshService for Box<T> {
    async fn refresh(
        &self,
        principal: &PrincipalId,
        refresh_token: &Secret,
    ) -> Result<RefreshedGrant, RefreshError> {
        (**self).refresh(principal, refresh_token).await
    }
}
