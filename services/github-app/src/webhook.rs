//! Webhook signature verification
//!
//! GitHub signs each delivery with `X-Hub-Signature-256: sha256=<hex>`, an
//! HMAC-SHA256 of the raw body keyed by the webhook secret. The signature
//! must be checked against the bytes exactly as received.
//!
//! ## Unsigned deliveries
//!
//! With no secret configured every delivery is accepted. This is only safe
//! before a secret has been provisioned and is surfaced as
//! [`SignatureMode::PermissiveNoSecret`] so it can be seen and asserted on.

use crate::error::{AuthError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

/// Format the expected signature header value for `body`
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Check `signature` against `body` in constant time.
///
/// An empty `secret` accepts everything.
pub fn verify(body: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() {
        warn!("No webhook secret configured, skipping verification");
        return true;
    }
    let expected = sign(secret.as_bytes(), body);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// How inbound deliveries are authenticated
#[derive(Clone, PartialEq, Eq)]
pub enum SignatureMode {
    /// Every delivery must carry a matching signature
    Enforced { secret: String },
    /// No secret provisioned; deliveries are accepted unchecked
    PermissiveNoSecret,
}

impl std::fmt::Debug for SignatureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureMode::Enforced { .. } => f.write_str("Enforced"),
            SignatureMode::PermissiveNoSecret => f.write_str("PermissiveNoSecret"),
        }
    }
}

impl SignatureMode {
    /// Pick the mode for an optional secret.
    ///
    /// A missing or empty secret yields `PermissiveNoSecret` unless
    /// `require_secret` is set, in which case it is a configuration error.
    pub fn from_secret(secret: Option<String>, require_secret: bool) -> Result<Self> {
        match secret.filter(|s| !s.is_empty()) {
            Some(secret) => Ok(SignatureMode::Enforced { secret }),
            None if require_secret => Err(AuthError::Configuration(
                "Webhook secret is required but not configured".to_string(),
            )),
            None => Ok(SignatureMode::PermissiveNoSecret),
        }
    }

    pub fn is_enforced(&self) -> bool {
        matches!(self, SignatureMode::Enforced { .. })
    }
}

/// Gatekeeper for inbound webhook deliveries
#[derive(Debug, Clone)]
pub struct WebhookAuthenticator {
    mode: SignatureMode,
}

impl WebhookAuthenticator {
    pub fn new(mode: SignatureMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> &SignatureMode {
        &self.mode
    }

    /// Accept or reject a delivery.
    ///
    /// # Errors
    /// [`AuthError::SignatureMismatch`] when enforcing and the header is
    /// missing or wrong.
    pub fn authenticate(&self, raw_body: &[u8], signature_header: Option<&str>) -> Result<()> {
        match &self.mode {
            SignatureMode::PermissiveNoSecret => {
                warn!("Accepting webhook without verification: no secret configured");
                Ok(())
            }
            SignatureMode::Enforced { secret } => match signature_header {
                Some(signature) if verify(raw_body, signature, secret) => Ok(()),
                _ => Err(AuthError::SignatureMismatch),
            },
        }
    }
}
