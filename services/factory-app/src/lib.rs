//! Factory GitHub App
//!
//! Webhook relay for the OHDSI Study Factory. Stage labels and closed stage
//! issues in study repositories are reflected in the study's tracking issue
//! in the Factory repository.
//!
//! Handles:
//! - `issues.labeled`: a `stage:*` label marks the stage as started
//! - `issues.closed`: closing a stage issue ticks the stage checklist entry
//! - `ping`: answered with `pong`

pub mod config;
pub mod routes;
pub mod stages;
pub mod tracking;

use anyhow::Result;
use factory_github_app::{CredentialClient, TokenCache, WebhookAuthenticator};
use std::sync::Arc;

pub use config::{Config, ServerLimits};
pub use routes::build_router;
pub use tracking::TrackingUpdater;

#[derive(Clone)]
pub struct AppState {
    pub authenticator: WebhookAuthenticator,
    pub tracker: Arc<TrackingUpdater>,
}

impl AppState {
    pub fn new(authenticator: WebhookAuthenticator, tracker: TrackingUpdater) -> Self {
        Self {
            authenticator,
            tracker: Arc::new(tracker),
        }
    }

    /// Wire the credential core and tracker from process configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let authenticator = WebhookAuthenticator::new(config.signature_mode()?);
        let cache = Arc::new(TokenCache::new(config.renewal_margin()));
        let client = CredentialClient::new(config.identity(), cache, config.client_config())?;
        let tracker = TrackingUpdater::new(client, config.factory_repo.clone());
        Ok(Self::new(authenticator, tracker))
    }
}
