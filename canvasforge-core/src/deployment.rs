//! Deployment status as reported by an external hosting collaborator.

use crate::error::ProviderError;
use canvasforge_tree::ComponentNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    Pending,
    Building,
    Deploying,
    Success,
    Failed,
    Cancelled,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Pending => "pending",
            DeploymentState::Building => "building",
            DeploymentState::Deploying => "deploying",
            DeploymentState::Success => "success",
            DeploymentState::Failed => "failed",
            DeploymentState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Success | DeploymentState::Failed | DeploymentState::Cancelled
        )
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub id: String,
    pub status: DeploymentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Percent complete, 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// One line for a status bar.
    pub fn summary(&self) -> String {
        match self.status {
            DeploymentState::Success => match &self.url {
                Some(url) => format!("[{}] success: {}", self.id, url),
                None => format!("[{}] success", self.id),
            },
            DeploymentState::Failed => format!(
                "[{}] failed: {}",
                self.id,
                self.error.as_deref().unwrap_or("unknown error")
            ),
            state => match self.progress {
                Some(p) => format!("[{}] {} {:.0}%", self.id, state, p.clamp(0.0, 100.0)),
                None => format!("[{}] {}", self.id, state),
            },
        }
    }
}

/// Hosting service that publishes a document.
pub trait DeploymentProvider: Send + Sync {
    fn deploy(
        &self,
        components: &[ComponentNode],
    ) -> impl Future<Output = Result<DeploymentStatus, ProviderError>> + Send;

    fn status(&self, id: &str) -> impl Future<Output = Result<DeploymentStatus, ProviderError>> + Send;
}
