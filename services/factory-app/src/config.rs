//! Process configuration
//!
//! Everything is read once at startup from flags or the environment.
//! Missing GitHub App credentials only produce warnings here; the error
//! surfaces when a credential operation is attempted.

use base64::{engine::general_purpose, Engine as _};
use chrono::Duration;
use clap::Parser;
use factory_github_app::client::DEFAULT_API_URL;
use factory_github_app::{AppIdentity, AuthError, ClientConfig, PrivateKey, SignatureMode};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug, Clone)]
#[command(name = "factory-app")]
#[command(about = "Webhook relay tracking study stage progression in the Factory repository")]
#[command(version)]
pub struct Config {
    /// GitHub App ID
    #[arg(long, env = "GITHUB_APP_ID", default_value = "")]
    pub app_id: String,

    /// Path to the App private key PEM file
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY_PATH")]
    pub private_key_path: Option<PathBuf>,

    /// App private key PEM contents
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// App private key PEM, base64 encoded
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY_B64", hide_env_values = true)]
    pub private_key_b64: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Shared secret for X-Hub-Signature-256
    #[arg(long, env = "GITHUB_APP_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    /// Refuse to start without a webhook secret
    #[arg(long, env = "FACTORY_REQUIRE_SIGNATURE")]
    pub require_signature: bool,

    /// Repository (owner/repo) holding the tracking issues
    #[arg(long, env = "FACTORY_REPO")]
    pub factory_repo: Option<String>,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Maximum webhook deliveries handled at once
    #[arg(long, env = "FACTORY_MAX_IN_FLIGHT", default_value_t = 64)]
    pub max_in_flight: usize,

    /// Per-request timeout, in seconds
    #[arg(long, env = "FACTORY_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Token lifetime assumed when GitHub omits expires_at, in seconds
    #[arg(
        long,
        env = "GITHUB_TOKEN_LIFETIME_SECS",
        default_value_t = 3600,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub token_lifetime_secs: u32,

    /// Renew cached tokens this many seconds before they expire
    #[arg(long, env = "GITHUB_TOKEN_RENEWAL_MARGIN_SECS", default_value_t = 300)]
    pub renewal_margin_secs: u32,
}

/// Request limits applied to the router
#[derive(Debug, Clone, Copy)]
pub struct ServerLimits {
    pub max_in_flight: usize,
    pub request_timeout: std::time::Duration,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            request_timeout: std::time::Duration::from_secs(30),
        }
    }
}

impl Config {
    /// App identity; the key path wins over inline keys
    pub fn identity(&self) -> AppIdentity {
        AppIdentity::new(self.app_id.trim(), self.private_key_source())
    }

    fn private_key_source(&self) -> Option<PrivateKey> {
        if let Some(path) = self.private_key_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            return Some(PrivateKey::Path(path.clone()));
        }
        if let Some(pem) = self.private_key.as_ref().filter(|p| !p.is_empty()) {
            return Some(PrivateKey::Pem(pem.clone().into_bytes()));
        }
        if let Some(encoded) = self.private_key_b64.as_ref().filter(|p| !p.is_empty()) {
            match general_purpose::STANDARD.decode(encoded.trim()) {
                Ok(decoded) => return Some(PrivateKey::Pem(decoded)),
                Err(e) => warn!("GITHUB_APP_PRIVATE_KEY_B64 is not valid base64: {}", e),
            }
        }
        None
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default()
            .with_api_url(&self.api_url)
            .with_fallback_token_lifetime(Duration::seconds(i64::from(self.token_lifetime_secs)));
        config.timeout = std::time::Duration::from_secs(self.request_timeout_secs);
        config
    }

    pub fn renewal_margin(&self) -> Duration {
        Duration::seconds(i64::from(self.renewal_margin_secs))
    }

    pub fn signature_mode(&self) -> Result<SignatureMode, AuthError> {
        SignatureMode::from_secret(self.webhook_secret.clone(), self.require_signature)
    }

    pub fn limits(&self) -> ServerLimits {
        ServerLimits {
            max_in_flight: self.max_in_flight.max(1),
            request_timeout: std::time::Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Log what is missing, the way an operator needs to see it at boot
    pub fn log_warnings(&self) {
        if self.app_id.trim().is_empty() {
            warn!("GITHUB_APP_ID not configured");
        }

        match self.private_key_source() {
            None => warn!("GitHub App private key not found"),
            Some(PrivateKey::Path(path)) if !path.exists() => {
                warn!("GitHub App private key not found at {}", path.display())
            }
            Some(_) => {}
        }

        if !self.identity().is_configured() {
            warn!("GitHub App identity incomplete; tracking updates will fail until it is configured");
        }

        if self.webhook_secret.as_deref().unwrap_or("").is_empty() {
            warn!(
                "GITHUB_APP_WEBHOOK_SECRET not configured; webhook signatures will NOT be \
                 verified and any caller can submit events"
            );
        }

        if self.factory_repo.is_none() {
            warn!("FACTORY_REPO not configured; tracking updates will be skipped");
        }

        info!(
            api_url = %self.api_url,
            factory_repo = ?self.factory_repo,
            max_in_flight = self.max_in_flight,
            "Configuration loaded"
        );
    }
}
