//! Factory GitHub App Credential Core
//!
//! Authenticates as a GitHub App and hands out installation-scoped tokens.
//!
//! ## Pieces
//!
//! - [`auth`]: RS256 JWT assertions signed with the App private key
//! - [`cache`]: per-installation token cache with a renewal margin
//! - [`client`]: assertion → installation token exchange
//! - [`installation`]: repository → installation lookup
//! - [`webhook`]: `X-Hub-Signature-256` verification
//!
//! ## Example
//!
//! ```ignore
//! use factory_github_app::{AppIdentity, ClientConfig, CredentialClient, PrivateKey, TokenCache};
//! use std::sync::Arc;
//!
//! let identity = AppIdentity::new("123456", Some(PrivateKey::Path("key.pem".into())));
//! let client = CredentialClient::new(identity, Arc::new(TokenCache::default()), ClientConfig::default())?;
//!
//! if let Some(installation_id) = client.resolve_installation("ohdsi/factory").await? {
//!     let token = client.installation_token(&installation_id).await?;
//! }
//! ```
//!
//! ## Binaries
//!
//! - `get-token`: print an installation access token

pub mod auth;
pub mod cache;
pub mod client;
pub mod error;
pub mod installation;
pub mod webhook;

pub use auth::{create_assertion, AppIdentity, PrivateKey, SignedAssertion};
pub use cache::{usable, InstallationToken, TokenCache};
pub use client::{ClientConfig, CredentialClient};
pub use error::AuthError;
pub use webhook::{SignatureMode, WebhookAuthenticator};
