//! Factory Tracking Issue Updates
//!
//! Finds the open tracking issue for a study in the Factory repository and
//! records stage progress in its body, using an installation token for the
//! Factory repository.

use crate::stages::{StageStatus, StageUpdate};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use factory_github_app::CredentialClient;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    items: Vec<TrackingIssue>,
}

#[derive(Debug, Deserialize)]
struct TrackingIssue {
    number: u64,
    body: Option<String>,
}

#[derive(Debug, Serialize)]
struct IssueBodyPatch<'a> {
    body: &'a str,
}

/// Rewrite a tracking issue body for a stage transition.
///
/// Completed stages get their checklist box ticked. The `Last updated:`
/// marker is expanded with the time and the stage that changed.
pub fn apply_stage_update(
    body: &str,
    stage_name: &str,
    status: StageStatus,
    now: DateTime<Utc>,
) -> String {
    let updated = match status {
        StageStatus::Completed => body.replace(
            &format!("- [ ] {}", stage_name),
            &format!("- [x] {}", stage_name),
        ),
        StageStatus::Started => body.to_string(),
    };

    let timestamp = now.format("%Y-%m-%d %H:%M UTC");
    updated.replace(
        "Last updated:",
        &format!(
            "Last updated: {}\nLast stage: {} ({})\nPrevious:",
            timestamp, stage_name, status
        ),
    )
}

/// Records stage progress in the Factory repository
#[derive(Debug, Clone)]
pub struct TrackingUpdater {
    client: CredentialClient,
    factory_repo: Option<String>,
}

impl TrackingUpdater {
    pub fn new(client: CredentialClient, factory_repo: Option<String>) -> Self {
        Self {
            client,
            factory_repo: factory_repo.filter(|r| !r.is_empty()),
        }
    }

    pub fn client(&self) -> &CredentialClient {
        &self.client
    }

    /// Apply `update` to the study's tracking issue.
    ///
    /// Missing configuration, a missing installation or a missing tracking
    /// issue are logged and skipped; GitHub failures are returned.
    pub async fn update(&self, update: &StageUpdate) -> Result<()> {
        let Some(factory_repo) = self.factory_repo.as_deref() else {
            warn!("FACTORY_REPO not configured, skipping update");
            return Ok(());
        };

        let Some(installation_id) = self.client.resolve_installation(factory_repo).await? else {
            error!("No installation found for {}", factory_repo);
            return Ok(());
        };

        let token = self.client.installation_token(&installation_id).await?;

        let query = format!(
            "repo:{} is:issue is:open {}",
            factory_repo, update.study_repo
        );
        let search_url = format!("{}/search/issues", self.client.api_url());

        let results: SearchResults = self
            .client
            .github_request(
                self.client.http().get(&search_url).query(&[("q", &query)]),
                &token.token,
            )
            .send()
            .await
            .context("Failed to search for tracking issue")?
            .error_for_status()
            .context("Tracking issue search rejected")?
            .json()
            .await
            .context("Failed to parse issue search response")?;

        let issue = match results.items.into_iter().next() {
            Some(issue) if results.total_count > 0 => issue,
            _ => {
                warn!("No tracking issue found for {}", update.study_repo);
                return Ok(());
            }
        };

        let body = apply_stage_update(
            issue.body.as_deref().unwrap_or(""),
            &update.stage_name,
            update.status,
            Utc::now(),
        );

        let update_url = format!(
            "{}/repos/{}/issues/{}",
            self.client.api_url(),
            factory_repo,
            issue.number
        );

        self.client
            .github_request(
                self.client
                    .http()
                    .patch(&update_url)
                    .json(&IssueBodyPatch { body: &body }),
                &token.token,
            )
            .send()
            .await
            .context("Failed to update tracking issue")?
            .error_for_status()
            .with_context(|| format!("Tracking issue #{} update rejected", issue.number))?;

        info!(
            issue_number = issue.number,
            stage = %update.stage_name,
            status = %update.status,
            "Updated Factory tracking issue"
        );
        Ok(())
    }
}
