//! Best-effort TLS certificate issuance

use std::sync::Arc;
use std::time::Duration;

use openapi_server::models::TlsStatus;
use tracing::{info, warn};

use crate::errors::CertificateError;
use crate::remote::executor::{CommandExecutor, RunOptions};
use crate::remote::runner::shell_quote;

/// Certificate issuance settings
#[derive(Debug, Clone)]
pub struct CertificateOptions {
    pub enabled: bool,

    /// ACME account email
    pub email: String,

    /// Issuance tool invocation prefix
    pub command: String,

    pub timeout: Duration,
}

impl Default for CertificateOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            email: "admin@example.com".to_string(),
            command: "sudo certbot".to_string(),
            timeout: Duration::from_secs(180),
        }
    }
}

/// Result of a provisioning attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateOutcome {
    Provisioned,
    Skipped(String),
}

impl CertificateOutcome {
    pub fn is_provisioned(&self) -> bool {
        matches!(self, CertificateOutcome::Provisioned)
    }

    pub fn tls_status(&self) -> TlsStatus {
        match self {
            CertificateOutcome::Provisioned => TlsStatus::Provisioned,
            CertificateOutcome::Skipped(_) => TlsStatus::Skipped,
        }
    }

    /// Why issuance was skipped, if it was
    pub fn reason(&self) -> Option<&str> {
        match self {
            CertificateOutcome::Provisioned => None,
            CertificateOutcome::Skipped(reason) => Some(reason),
        }
    }
}

/// Requests certificates on the target host
pub struct CertificateProvisioner {
    executor: Arc<CommandExecutor>,
    options: CertificateOptions,
}

impl CertificateProvisioner {
    pub fn new(executor: Arc<CommandExecutor>, options: CertificateOptions) -> Self {
        Self { executor, options }
    }

    /// Issue a certificate for a domain. Never fails: errors degrade to
    /// [`CertificateOutcome::Skipped`].
    pub async fn provision(&self, domain: &str) -> CertificateOutcome {
        match self.issue(domain).await {
            Ok(()) => {
                info!("Certificate issued for {}", domain);
                CertificateOutcome::Provisioned
            }
            Err(e) => {
                warn!("Certificate not issued for {}: {}", domain, e);
                CertificateOutcome::Skipped(e.to_string())
            }
        }
    }

    async fn issue(&self, domain: &str) -> Result<(), CertificateError> {
        if !self.options.enabled {
            return Err(CertificateError::Disabled);
        }

        let command = format!(
            "{} --nginx -d {} --non-interactive --agree-tos --email {}",
            self.options.command,
            shell_quote(domain),
            shell_quote(&self.options.email)
        );
        self.executor
            .run(&command, RunOptions::remote().with_timeout(self.options.timeout))
            .await
            .map_err(CertificateError::Issuance)?;
        Ok(())
    }
}
