//! Engine API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Deploy request body.
///
/// Every field is optional on the wire so that a missing `domain` or
/// `repo_url` can be reported as a validation failure instead of a
/// deserialization rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequest {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub deploy_path: Option<String>,
}

/// TLS status of a finished deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsStatus {
    Provisioned,
    Skipped,
}

/// Successful deploy response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub success: bool,
    pub deployment_id: Uuid,
    pub domain: String,
    pub url: String,
    pub message: String,
    pub tls_status: TlsStatus,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_digest: Option<String>,
}

/// Failed deploy response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployFailureResponse {
    pub success: bool,
    pub deployment_id: Uuid,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Generic error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Coarse attempt status kept for compatibility with existing pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    CompletedOrFailed,
}

/// Deployment status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatusResponse {
    pub success: bool,
    pub deployment_id: Uuid,
    pub status: AttemptStatus,
    /// Fine-grained pipeline phase, absent when the attempt is unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_status: Option<TlsStatus>,
}

/// Deployed domains response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainListResponse {
    pub success: bool,
    pub count: usize,
    pub domains: Vec<String>,
}

/// Source-control push notification (GitHub shape, only the fields we use)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub repository: Option<WebhookRepository>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
}

/// Repository section of a push notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRepository {
    pub clone_url: String,
    pub name: String,
}

/// Webhook acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
}
