//! Installation Token Exchange
//!
//! Trades a freshly signed App assertion for an installation access token
//! and keeps the result in the shared [`TokenCache`].

use crate::auth::{create_assertion, AppIdentity};
use crate::cache::{self, InstallationToken, TokenCache};
use crate::error::{AuthError, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
pub const USER_AGENT: &str = "factory-github-app";
pub const ACCEPT: &str = "application/vnd.github+json";
pub const API_VERSION: &str = "2022-11-28";

/// Settings for talking to GitHub as the App
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API base URL, without trailing slash
    pub api_url: String,
    /// Lifetime assumed when GitHub omits `expires_at`
    pub fallback_token_lifetime: Duration,
    /// HTTP timeout for each request
    pub timeout: std::time::Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            fallback_token_lifetime: Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
            timeout: std::time::Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_fallback_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.fallback_token_lifetime = lifetime;
        self
    }
}

/// Response from GitHub installation token endpoint
#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

/// GitHub client authenticated as the App
///
/// Cheap to clone; clones share the HTTP pool and the token cache.
#[derive(Debug, Clone)]
pub struct CredentialClient {
    identity: Arc<AppIdentity>,
    cache: Arc<TokenCache>,
    config: ClientConfig,
    http: Client,
}

impl CredentialClient {
    pub fn new(identity: AppIdentity, cache: Arc<TokenCache>, config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AuthError::transport("building HTTP client", e))?;

        Ok(Self {
            identity: Arc::new(identity),
            cache,
            config,
            http,
        })
    }

    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    /// Shared HTTP client, for callers making installation-token requests
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Attach the headers GitHub expects on every REST call
    pub fn github_request(&self, builder: RequestBuilder, bearer: &str) -> RequestBuilder {
        builder
            .bearer_auth(bearer)
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Get an installation access token, from cache when possible
    ///
    /// On a miss a new assertion is signed and exchanged. Failures leave the
    /// cache untouched and are not retried.
    pub async fn installation_token(&self, installation_id: &str) -> Result<InstallationToken> {
        if let Some(cached) = self.cache.lookup(installation_id).await {
            return Ok(cached);
        }

        let token = self.exchange(installation_id).await?;
        self.cache.store(token.clone()).await;

        if !cache::usable(&token, Utc::now(), self.cache.renewal_margin()) {
            warn!(
                installation_id = %installation_id,
                expires_at = %token.expires_at,
                "Installation token expires within the renewal margin; it will be refetched on next use"
            );
        }

        info!(
            installation_id = %installation_id,
            expires_at = %token.expires_at,
            "Obtained new installation token"
        );
        Ok(token)
    }

    /// Wipe all cached tokens, forcing re-authentication
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn exchange(&self, installation_id: &str) -> Result<InstallationToken> {
        let operation = format!("token exchange for installation {}", installation_id);
        let assertion = create_assertion(&self.identity)?;

        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.config.api_url, installation_id
        );

        let response = self
            .github_request(self.http.post(&url), &assertion.token)
            .send()
            .await
            .map_err(|e| AuthError::transport(operation.as_str(), e))?;

        let response = ensure_success(response, &operation).await?;

        let body: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::invalid_response(operation.as_str(), e))?;

        let now = Utc::now();
        let expires_at = match body.expires_at {
            Some(expires_at) => expires_at,
            None => {
                warn!(
                    installation_id = %installation_id,
                    "Token response has no expires_at, assuming fallback lifetime"
                );
                now.checked_add_signed(self.config.fallback_token_lifetime)
                    .ok_or_else(|| {
                        AuthError::Configuration(format!(
                            "Fallback token lifetime out of range: {}",
                            self.config.fallback_token_lifetime
                        ))
                    })?
            }
        };

        if expires_at <= now {
            return Err(AuthError::invalid_response(
                operation.as_str(),
                format!("token already expired at {}", expires_at),
            ));
        }

        Ok(InstallationToken {
            installation_id: installation_id.to_string(),
            token: body.token,
            expires_at,
        })
    }
}

/// Turn a non-2xx response into [`AuthError::RemoteAuth`]
pub(crate) async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AuthError::RemoteAuth {
        operation: operation.to_string(),
        status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_response_with_expiry() {
        let body: AccessTokenResponse = serde_json::from_str(
            r#"{"token":"ghs_abc","expires_at":"2030-01-01T12:00:00Z","permissions":{"issues":"write"}}"#,
        )
        .unwrap();
        assert_eq!(body.token, "ghs_abc");
        assert_eq!(body.expires_at.unwrap().to_rfc3339(), "2030-01-01T12:00:00+00:00");
    }

    #[test]
    fn test_access_token_response_without_expiry() {
        let body: AccessTokenResponse = serde_json::from_str(r#"{"token":"ghs_abc"}"#).unwrap();
        assert!(body.expires_at.is_none());
    }

    #[test]
    fn test_api_url_trailing_slash_trimmed() {
        let config = ClientConfig::default().with_api_url("http://localhost:9000/");
        assert_eq!(config.api_url, "http://localhost:9000");
    }
}
