//! Terminal deployment outcome

use chrono::{DateTime, Utc};
use openapi_client::models::{DeploymentRecord, RecordStatus};
use openapi_server::models::TlsStatus;
use uuid::Uuid;

use crate::deploy::certs::CertificateOutcome;
use crate::deploy::fsm::{PipelinePhase, StageFailure};
use crate::models::deployment::DeploymentRequest;

/// Result record of a finished attempt
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    pub deployment_id: Uuid,
    pub request: DeploymentRequest,
    /// `Succeeded` or `Failed`
    pub phase: PipelinePhase,
    pub failure: Option<StageFailure>,
    /// Absent when the attempt failed before certificate provisioning
    pub certificate: Option<CertificateOutcome>,
    /// SHA-256 of the installed routing configuration
    pub config_digest: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentOutcome {
    pub fn success(&self) -> bool {
        self.phase == PipelinePhase::Succeeded
    }

    pub fn domain(&self) -> &str {
        &self.request.domain
    }

    pub fn url(&self) -> String {
        format!("https://{}", self.request.domain)
    }

    pub fn tls_status(&self) -> Option<TlsStatus> {
        self.certificate.as_ref().map(CertificateOutcome::tls_status)
    }

    /// Succeeded without automatic TLS
    pub fn degraded(&self) -> bool {
        self.success()
            && !self
                .certificate
                .as_ref()
                .is_some_and(CertificateOutcome::is_provisioned)
    }

    /// Failure cause, absent on success
    pub fn error(&self) -> Option<String> {
        self.failure.as_ref().map(|f| f.to_string())
    }

    pub fn message(&self) -> String {
        if let Some(failure) = &self.failure {
            return format!("Deployment failed: {}", failure);
        }
        match self.certificate.as_ref().and_then(CertificateOutcome::reason) {
            Some(reason) => format!("Deployment successful without automatic TLS: {}", reason),
            None => "Deployment successful".to_string(),
        }
    }

    /// Registry record for this outcome
    pub fn to_record(&self) -> DeploymentRecord {
        DeploymentRecord {
            deployment_id: self.deployment_id,
            domain: self.request.domain.clone(),
            repo_url: self.request.repo_url.clone(),
            branch: self.request.branch.clone(),
            build_command: self.request.build_command.clone(),
            deploy_path: self.request.deploy_path.clone(),
            status: if self.success() {
                RecordStatus::Deployed
            } else {
                RecordStatus::Failed
            },
            tls: self
                .certificate
                .as_ref()
                .is_some_and(CertificateOutcome::is_provisioned),
            error: self.failure.as_ref().map(|f| f.cause.clone()),
            failed_stage: self.failure.as_ref().map(|f| f.stage.to_string()),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}
