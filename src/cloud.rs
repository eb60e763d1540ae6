//! Simulated cloud actions.
//!
//! Upload and deploy wait a fixed delay and report success. No request
//! leaves the machine; access tokens are accepted for UI parity and never
//! logged or stored.

use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{LivepadError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    #[default]
    Github,
    Gitlab,
    Bitbucket,
}

impl CloudProvider {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Some(CloudProvider::Github),
            "gitlab" => Some(CloudProvider::Gitlab),
            "bitbucket" => Some(CloudProvider::Bitbucket),
            _ => None,
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudProvider::Github => write!(f, "GitHub"),
            CloudProvider::Gitlab => write!(f, "GitLab"),
            CloudProvider::Bitbucket => write!(f, "Bitbucket"),
        }
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub provider: CloudProvider,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub token: String,
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("provider", &self.provider)
            .field("repo", &self.repo)
            .field("description", &self.description)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Outcome of a simulated action, shown to the user as a notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub action: &'static str,
    pub success: bool,
    pub message: String,
}

/// Pretend to push the project to a repository host.
///
/// An empty repository name fails immediately, before any delay.
pub async fn upload(request: &UploadRequest, delay: Duration) -> Result<ActionReport> {
    if request.repo.trim().is_empty() {
        return Err(LivepadError::MissingSelection("repository name"));
    }
    tracing::info!(provider = %request.provider, repo = %request.repo, "simulated upload");
    tokio::time::sleep(delay).await;
    Ok(ActionReport {
        action: "upload",
        success: true,
        message: format!("Successfully uploaded to {}!", request.provider),
    })
}

/// Pretend to deploy the project to a hosting service.
pub async fn deploy(delay: Duration) -> ActionReport {
    tracing::info!("simulated deploy");
    tokio::time::sleep(delay).await;
    ActionReport {
        action: "deploy",
        success: true,
        message: "Project deployed successfully!".to_string(),
    }
}
