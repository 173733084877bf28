//! Error types for the credential core.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while authenticating as the GitHub App
#[derive(Debug, Error)]
pub enum AuthError {
    /// App identity or private key is missing, unreadable, or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Repository name is not of the form `owner/repo`
    #[error("Invalid repository: {0}. Expected: owner/repo")]
    InvalidRepository(String),

    /// GitHub answered a credential request with a non-success status
    #[error("GitHub API error during {operation} ({status}): {body}")]
    RemoteAuth {
        operation: String,
        status: StatusCode,
        body: String,
    },

    /// The request never produced a response
    #[error("Request failed during {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// GitHub answered but the body could not be understood
    #[error("Invalid response during {operation}: {message}")]
    InvalidResponse { operation: String, message: String },

    /// Webhook signature did not match the configured secret
    #[error("Webhook signature mismatch")]
    SignatureMismatch,
}

impl AuthError {
    pub(crate) fn transport(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            operation: operation.into(),
            source,
        }
    }

    pub(crate) fn invalid_response(
        operation: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// HTTP status reported by GitHub, if this error carries one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RemoteAuth { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
