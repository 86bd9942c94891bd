//! Reverse-proxy routing configuration
//!
//! `apply` renders the server block, stages it locally, transfers it to the
//! target host, installs it with a rename and validates the resulting proxy
//! configuration. It never reloads the proxy: `reload` is a separate step so
//! an unvalidated configuration can never go live.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deploy::nginx::RoutingConfig;
use crate::errors::RoutingError;
use crate::filesys::dir::Dir;
use crate::remote::executor::{CommandExecutor, RunOptions};
use crate::remote::runner::shell_quote;

/// Where and how proxy configuration is installed
#[derive(Debug, Clone)]
pub struct RoutingOptions {
    /// Local directory for staging files
    pub staging_dir: PathBuf,

    /// Directory on the target host that receives transferred files
    pub remote_staging_dir: String,

    /// nginx `sites-available` directory
    pub sites_available: String,

    /// nginx `sites-enabled` directory
    pub sites_enabled: String,

    /// Privilege prefix for commands touching nginx, empty for none
    pub privilege: String,

    /// Command validating the full proxy configuration
    pub validate_command: String,

    /// Command reloading the live proxy
    pub reload_command: String,

    pub timeout: Duration,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            staging_dir: std::env::temp_dir().join("sitedeploy-staging"),
            remote_staging_dir: "/tmp".to_string(),
            sites_available: "/etc/nginx/sites-available".to_string(),
            sites_enabled: "/etc/nginx/sites-enabled".to_string(),
            privilege: "sudo".to_string(),
            validate_command: "sudo nginx -t".to_string(),
            reload_command: "sudo nginx -s reload".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Result of a successful `apply`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRoute {
    /// Installed configuration path on the target host
    pub path: String,

    /// SHA-256 of the installed configuration
    pub digest: String,
}

/// Installs and reloads per-domain proxy configuration
pub struct RoutingConfigurator {
    executor: Arc<CommandExecutor>,
    options: RoutingOptions,
}

impl RoutingConfigurator {
    pub fn new(executor: Arc<CommandExecutor>, options: RoutingOptions) -> Self {
        Self { executor, options }
    }

    pub fn options(&self) -> &RoutingOptions {
        &self.options
    }

    /// Installed configuration path for a domain
    pub fn available_path(&self, domain: &str) -> String {
        format!("{}/{}", self.options.sites_available.trim_end_matches('/'), domain)
    }

    /// Enabled configuration link for a domain
    pub fn enabled_path(&self, domain: &str) -> String {
        format!("{}/{}", self.options.sites_enabled.trim_end_matches('/'), domain)
    }

    fn privileged(&self, command: String) -> String {
        if self.options.privilege.is_empty() {
            command
        } else {
            format!("{} {}", self.options.privilege, command)
        }
    }

    /// Render, transfer, install and validate the configuration for a domain.
    ///
    /// The installed file is always overwritten wholesale.
    pub async fn apply(&self, domain: &str, artifact_dir: &str) -> Result<AppliedRoute, RoutingError> {
        let config = RoutingConfig::new(domain, artifact_dir);
        let rendered = config.render();
        let digest = config.digest();
        let nonce = Uuid::new_v4().simple().to_string();
        let file_name = format!("nginx-{}-{}.conf", domain, nonce);

        // 1. Stage locally
        let staging = Dir::new(&self.options.staging_dir).file(&file_name);
        staging
            .write_string(&rendered)
            .await
            .map_err(|source| RoutingError::Staging {
                path: staging.path().to_path_buf(),
                source,
            })?;

        // 2. Transfer
        let remote_staged = format!(
            "{}/{}",
            self.options.remote_staging_dir.trim_end_matches('/'),
            file_name
        );
        let transferred = self
            .executor
            .copy_to_remote(staging.path(), &remote_staged, Some(self.options.timeout))
            .await;
        if let Err(e) = staging.delete().await {
            warn!("Unable to remove staging file {}: {}", staging.path().display(), e);
        }
        transferred.map_err(RoutingError::Transfer)?;
        debug!("Transferred routing config for {} to {}", domain, remote_staged);

        // 3. Install: copy next to the target, then rename over it
        let available = self.available_path(domain);
        let enabled = self.enabled_path(domain);
        let temp_sibling = format!(
            "{}/.{}.{}.tmp",
            self.options.sites_available.trim_end_matches('/'),
            domain,
            nonce
        );
        let install = [
            self.privileged(format!(
                "install -m 644 {} {}",
                shell_quote(&remote_staged),
                shell_quote(&temp_sibling)
            )),
            self.privileged(format!(
                "mv -f {} {}",
                shell_quote(&temp_sibling),
                shell_quote(&available)
            )),
            self.privileged(format!(
                "ln -sfn {} {}",
                shell_quote(&available),
                shell_quote(&enabled)
            )),
            format!("rm -f {}", shell_quote(&remote_staged)),
        ]
        .join(" && ");
        self.executor
            .run(&install, RunOptions::remote().with_timeout(self.options.timeout))
            .await
            .map_err(RoutingError::Install)?;

        // 4. Validate, fail closed
        if let Err(e) = self
            .executor
            .run(
                &self.options.validate_command,
                RunOptions::remote().with_timeout(self.options.timeout),
            )
            .await
        {
            error!("Routing config for {} failed validation: {}", domain, e);
            self.disable(domain).await;
            return Err(RoutingError::Validation(e));
        }

        info!("Installed routing config for {} (sha256 {})", domain, digest);
        Ok(AppliedRoute {
            path: available,
            digest,
        })
    }

    /// Reload the live proxy
    pub async fn reload(&self) -> Result<(), RoutingError> {
        self.executor
            .run(
                &self.options.reload_command,
                RunOptions::remote().with_timeout(self.options.timeout),
            )
            .await
            .map_err(RoutingError::Reload)?;
        info!("Reloaded proxy on {}", self.executor.host().host);
        Ok(())
    }

    /// Remove the enabled link of a domain so the remaining configuration
    /// set stays valid
    async fn disable(&self, domain: &str) {
        let command = self.privileged(format!("rm -f {}", shell_quote(&self.enabled_path(domain))));
        match self
            .executor
            .run(&command, RunOptions::remote().with_timeout(self.options.timeout))
            .await
        {
            Ok(_) => warn!("Disabled routing config for {}", domain),
            Err(e) => error!("Unable to disable routing config for {}: {}", domain, e),
        }
    }
}
