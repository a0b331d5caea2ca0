//! OAuth 2.0 refresh-token grant.

use async_trait::async_trait;
use chrono::Utc;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
    basic::BasicClient, reqwest::async_http_client,
};
use serde::{Deserialize, Serialize};

use super::{RefreshError, RefreshService, RefreshedGrant};
use crate::model::PrincipalId;
use crate::store::Secret;

/// Configuration for the OAuth provider that issued the credentials.
///
/// # Example
///
/// ```
/// use tokenrelay_core::refresh::ProviderConfig;
///
/// let google = ProviderConfig::new("google", "my-client-id")
///     .with_auth_url("https://accounts.google.com/o/oauth2/v2/auth")
///     .with_token_url("https://oauth2.googleapis.com/token")
///     .with_client_secret("my-client-secret");
/// assert_eq!(google.id, "google");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Provider identifier (e.g. "google").
    pub id: String,

    /// OAuth authorization endpoint URL.
    pub auth_url: String,

    /// OAuth token endpoint URL.
    pub token_url: String,

    /// OAuth client ID.
    pub client_id: String,

    /// OAuth client secret (confidential clients only).
    #[serde(default)]
    pub client_secret: Option<Secret>,
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            auth_url: String::new(),
            token_url: String::new(),
            client_id: client_id.into(),
            client_secret: None,
        }
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(Secret::new(secret));
        self
    }
}

/// Create an OAuth2 client from a provider configuration.
pub fn create_oauth_client(config: &ProviderConfig) -> Result<BasicClient, RefreshError> {
    let auth_url = AuthUrl::new(config.auth_url.clone()).map_err(|e| RefreshError::Misconfigured {
        message: format!("invalid auth URL: {}", e),
    })?;

    let token_url =
        TokenUrl::new(config.token_url.clone()).map_err(|e| RefreshError::Misconfigured {
            message: format!("invalid token URL: {}", e),
        })?;

    Ok(BasicClient::new(
        ClientId::new(config.client_id.clone()),
        config
            .client_secret
            .as_ref()
            .map(|s| ClientSecret::new(s.expose().to_string())),
        auth_url,
        Some(token_url),
    ))
}

/// [`RefreshService`] performing the OAuth 2.0 refresh-token grant.
pub struct OAuthRefresher {
    provider_id: String,
    client: BasicClient,
}

impl OAuthRefresher {
    /// Build a refresher for the given provider.
    ///
    /// Fails if the provider's URLs are invalid.
    pub fn new(config: &ProviderConfig) -> Result<Self, RefreshError> {
        Ok(Self {
            provider_id: config.id.clone(),
            client: create_oauth_client(config)?,
        })
    }
}

impl std::fmt::Debug for OAuthRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthRefresher")
            .field("provider_id", &self.provider_id)
            .finish()
    }
}

#[async_trait]
impl RefreshService for OAuthRefresher {
    async fn refresh(
        &self,
        principal: &PrincipalId,
        refresh_token: &Secret,
    ) -> Result<RefreshedGrant, RefreshError> {
        tracing::debug!("Refreshing access token for {} via {}", principal, self.provider_id);

        let token_response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.expose().to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(resp) => {
                    let code = serde_json::to_value(resp.error())
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_else(|| format!("{:?}", resp.error()));
                    let message = match resp.error_description() {
                        Some(description) => format!("{}: {}", code, description),
                        None => code,
                    };
                    RefreshError::Rejected { message }
                }
                other => RefreshError::Transport {
                    message: other.to_string(),
                },
            })?;

        let mut grant = RefreshedGrant::new(token_response.access_token().secret().to_string());

        if let Some(duration) = token_response.expires_in() {
            let expires_in =
                chrono::Duration::from_std(duration).map_err(|e| RefreshError::Transport {
                    message: format!("invalid expiration duration: {}", e),
                })?;
            grant = grant.with_expiry(Utc::now() + expires_in);
        }

        if let Some(new_refresh_token) = token_response.refresh_token() {
            grant = grant.with_refresh_token(new_refresh_token.secret().to_string());
        }

        if let Some(scopes) = token_response.scopes() {
            grant = grant.with_scopes(scopes.iter().map(|s| s.to_string()).collect());
        }

        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auth_url: &str) -> ProviderConfig {
        ProviderConfig::new("test", "test-client-id")
            .with_auth_url(auth_url)
            .with_token_url("https://example.com/token")
            .with_client_secret("test-secret")
    }

    #[test]
    fn test_create_oauth_client() {
        assert!(create_oauth_client(&config("https://example.com/auth")).is_ok());
    }

    #[test]
    fn test_create_oauth_client_invalid_urls() {
        let result = create_oauth_client(&config("not a valid url"));
        assert!(matches!(result, Err(RefreshError::Misconfigured { .. })));
    }

    #[test]
    fn test_provider_config_from_toml() {
        let config: ProviderConfig = toml::from_str(
            r#"
            id = "google"
            auth_url = "https://accounts.google.com/o/oauth2/v2/auth"
            token_url = "https://oauth2.googleapis.com/token"
            client_id = "abc.apps.googleusercontent.com"
            client_secret = "shh"
            "#,
        )
        .unwrap();

        assert_eq!(config.id, "google");
        assert_eq!(config.client_secret.as_ref().map(|s| s.expose()), Some("shh"));
        assert!(!format!("{:?}", config).contains("shh"));
    }
}
