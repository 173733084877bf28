//! Study stage events
//!
//! Turns `issues` webhook payloads into stage progress updates.

use serde::Deserialize;
use std::fmt;
use tracing::info;

pub const STAGE_LABEL_PREFIX: &str = "stage:";

/// Display name for a `stage:*` label; unknown stages pass through as-is
pub fn stage_name(label: &str) -> &str {
    match label {
        "stage:initiation" => "Initiation",
        "stage:protocol-development" => "Protocol Development",
        "stage:phenotype-development" => "Phenotype Development",
        "stage:analysis-specifications" => "Analysis Specifications",
        "stage:network-execution" => "Network Execution",
        "stage:results-evaluation" => "Results Evaluation",
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Started,
    Completed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Started => write!(f, "started"),
            StageStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A stage transition in a study repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub study_repo: String,
    pub stage_name: String,
    pub status: StageStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub full_name: String,
}

/// `issues` event payload, reduced to what stage tracking reads
#[derive(Debug, Deserialize)]
pub struct IssuesEvent {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub issue: Issue,
    #[serde(default)]
    pub label: Option<Label>,
    #[serde(default)]
    pub repository: Repository,
}

impl IssuesEvent {
    /// The stage transition this event represents, if any
    pub fn stage_update(&self) -> Option<StageUpdate> {
        match self.action.as_str() {
            "labeled" => self.labeled(),
            "closed" => self.closed(),
            _ => None,
        }
    }

    fn labeled(&self) -> Option<StageUpdate> {
        let label = self.label.as_ref().map(|l| l.name.as_str()).unwrap_or("");
        if !label.starts_with(STAGE_LABEL_PREFIX) {
            info!("Ignoring non-stage label: {}", label);
            return None;
        }

        let stage = stage_name(label);
        info!(repo = %self.repository.full_name, "Stage label added: {}", stage);
        Some(self.update(stage, StageStatus::Started))
    }

    fn closed(&self) -> Option<StageUpdate> {
        let Some(label) = self
            .issue
            .labels
            .iter()
            .find(|l| l.name.starts_with(STAGE_LABEL_PREFIX))
        else {
            info!("Issue closed but no stage label found");
            return None;
        };

        let stage = stage_name(&label.name);
        info!(repo = %self.repository.full_name, "Stage completed: {}", stage);
        Some(self.update(stage, StageStatus::Completed))
    }

    fn update(&self, stage: &str, status: StageStatus) -> StageUpdate {
        StageUpdate {
            study_repo: self.repository.full_name.clone(),
            stage_name: stage.to_string(),
            status,
        }
    }
}
