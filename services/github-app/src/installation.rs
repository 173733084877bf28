//! Installation lookup for a repository.

use crate::auth::create_assertion;
use crate::client::{ensure_success, CredentialClient};
use crate::error::{AuthError, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct InstallationResponse {
    id: u64,
}

impl CredentialClient {
    /// Find the App installation covering `repo_full_name` (`owner/repo`).
    ///
    /// Returns `Ok(None)` when the App is not installed on the repository.
    pub async fn resolve_installation(&self, repo_full_name: &str) -> Result<Option<String>> {
        validate_repo_name(repo_full_name)?;

        let operation = format!("installation lookup for {}", repo_full_name);
        let assertion = create_assertion(self.identity())?;

        let url = format!("{}/repos/{}/installation", self.api_url(), repo_full_name);

        let response = self
            .github_request(self.http().get(&url), &assertion.token)
            .send()
            .await
            .map_err(|e| AuthError::transport(operation.as_str(), e))?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(repo = %repo_full_name, "GitHub App is not installed on repository");
            return Ok(None);
        }

        let response = ensure_success(response, &operation).await?;
        let body: InstallationResponse = response
            .json()
            .await
            .map_err(|e| AuthError::invalid_response(operation.as_str(), e))?;

        info!(repo = %repo_full_name, installation_id = body.id, "Resolved installation");
        Ok(Some(body.id.to_string()))
    }
}

fn validate_repo_name(repo_full_name: &str) -> Result<()> {
    let parts: Vec<&str> = repo_full_name.split('/').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(AuthError::InvalidRepository(repo_full_name.to_string()));
    }
    Ok(())
}
