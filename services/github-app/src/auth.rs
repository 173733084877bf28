//! GitHub App Authentication
//!
//! Builds the short-lived RS256 JWT ("assertion") that identifies the App
//! when talking to the installation endpoints.

use crate::error::{AuthError, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Validity window of an assertion, in seconds
pub const ASSERTION_LIFETIME_SECS: i64 = 600;

/// Where the App private key comes from
#[derive(Clone)]
pub enum PrivateKey {
    /// PEM file on disk, read each time an assertion is signed
    Path(PathBuf),
    /// PEM bytes already in memory
    Pem(Vec<u8>),
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivateKey::Path(path) => f.debug_tuple("Path").field(path).finish(),
            PrivateKey::Pem(_) => f.write_str("Pem(<redacted>)"),
        }
    }
}

impl PrivateKey {
    fn load(&self) -> Result<Vec<u8>> {
        match self {
            PrivateKey::Path(path) => std::fs::read(path).map_err(|e| {
                AuthError::Configuration(format!(
                    "Failed to read private key {}: {}",
                    path.display(),
                    e
                ))
            }),
            PrivateKey::Pem(pem) => Ok(pem.clone()),
        }
    }
}

/// The App's identity: its ID plus signing key
#[derive(Debug, Clone)]
pub struct AppIdentity {
    /// GitHub App ID, used as the JWT issuer
    pub issuer_id: String,
    /// Signing key; `None` until one is configured
    pub private_key: Option<PrivateKey>,
}

impl AppIdentity {
    pub fn new(issuer_id: impl Into<String>, private_key: Option<PrivateKey>) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            private_key,
        }
    }

    /// Whether both halves of the identity are present
    pub fn is_configured(&self) -> bool {
        !self.issuer_id.is_empty() && self.private_key.is_some()
    }
}

/// JWT claims for GitHub App authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Issued at time (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer (GitHub App ID)
    pub iss: String,
}

/// A signed, single-use App assertion
#[derive(Clone)]
pub struct SignedAssertion {
    pub issuer_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Compact JWT, sent as the bearer credential
    pub token: String,
}

impl fmt::Debug for SignedAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedAssertion")
            .field("issuer_id", &self.issuer_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Sign a fresh assertion for `identity`, valid for 10 minutes from now.
///
/// # Errors
/// Returns [`AuthError::Configuration`] if the App ID or key is missing,
/// the key file cannot be read, or the key is not an RSA PEM.
pub fn create_assertion(identity: &AppIdentity) -> Result<SignedAssertion> {
    if identity.issuer_id.is_empty() {
        return Err(AuthError::Configuration(
            "GitHub App ID is not configured".to_string(),
        ));
    }
    let key = identity.private_key.as_ref().ok_or_else(|| {
        AuthError::Configuration("GitHub App private key is not configured".to_string())
    })?;
    let pem = key.load()?;

    create_assertion_at(&identity.issuer_id, &pem, Utc::now())
}

/// Sign an assertion with an explicit issue time.
pub fn create_assertion_at(
    issuer_id: &str,
    private_key_pem: &[u8],
    now: DateTime<Utc>,
) -> Result<SignedAssertion> {
    if issuer_id.is_empty() {
        return Err(AuthError::Configuration(
            "GitHub App ID is not configured".to_string(),
        ));
    }
    if private_key_pem.is_empty() {
        return Err(AuthError::Configuration("Private key is empty".to_string()));
    }

    let issued_at = now;
    let expires_at = now
        .checked_add_signed(Duration::seconds(ASSERTION_LIFETIME_SECS))
        .ok_or_else(|| AuthError::Configuration(format!("Assertion time out of range: {}", now)))?;

    let claims = AssertionClaims {
        iat: issued_at.timestamp(),
        exp: expires_at.timestamp(),
        iss: issuer_id.to_string(),
    };

    let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
        .map_err(|e| AuthError::Configuration(format!("Failed to parse private key: {}", e)))?;

    let header = Header::new(Algorithm::RS256);

    let token = encode(&header, &claims, &encoding_key)
        .map_err(|e| AuthError::Configuration(format!("Failed to encode JWT: {}", e)))?;

    debug!(issuer = %issuer_id, "Created JWT for GitHub App authentication");

    Ok(SignedAssertion {
        issuer_id: issuer_id.to_string(),
        issued_at,
        expires_at,
        token,
    })
}
