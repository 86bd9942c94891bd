//! Application state management

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::deploy::certs::{CertificateOptions, CertificateProvisioner};
use crate::deploy::notifier::{NoopNotifier, RegistryNotifier};
use crate::deploy::pipeline::{DeploymentPipeline, PipelineOptions};
use crate::deploy::routing::{RoutingConfigurator, RoutingOptions};
use crate::deploy::workspace::WorkspaceManager;
use crate::errors::EngineError;
use crate::http::client::HttpClient;
use crate::http::registry::HttpRegistryNotifier;
use crate::models::deployment::RequestDefaults;
use crate::remote::executor::{CommandExecutor, TargetHost};
use crate::remote::runner::{CommandRunner, ProcessRunner};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{IntakeSettings, Settings};

/// Main application state
pub struct AppState {
    pub pipeline: Arc<DeploymentPipeline>,

    /// Webhook translation rules
    pub intake: IntakeSettings,

    /// Defaults for optional request fields
    pub defaults: RequestDefaults,
}

impl AppState {
    /// Wire every component from settings, running commands as real
    /// processes
    pub fn init(settings: &Settings, layout: &StorageLayout) -> Result<Self, EngineError> {
        Self::with_runner(settings, layout, Arc::new(ProcessRunner))
    }

    /// Wire every component from settings on top of `runner`
    pub fn with_runner(
        settings: &Settings,
        layout: &StorageLayout,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, EngineError> {
        info!("Initializing application state...");

        let timeouts = &settings.timeouts;
        let target = &settings.target;
        let host = TargetHost {
            user: target.user.clone(),
            host: target.host.clone(),
            port: target.port,
            identity_file: target.identity_file.clone(),
            ssh_options: target.ssh_options.clone(),
        };
        let executor = Arc::new(CommandExecutor::new(runner, host, timeouts.remote()));

        let proxy = &settings.proxy;
        let router = RoutingConfigurator::new(
            executor.clone(),
            RoutingOptions {
                staging_dir: layout.staging_dir().path().to_path_buf(),
                remote_staging_dir: proxy.remote_staging_dir.clone(),
                sites_available: proxy.sites_available.clone(),
                sites_enabled: proxy.sites_enabled.clone(),
                privilege: proxy.privilege.clone(),
                validate_command: proxy.validate_command.clone(),
                reload_command: proxy.reload_command.clone(),
                timeout: timeouts.remote(),
            },
        );

        let certs = CertificateProvisioner::new(
            executor.clone(),
            CertificateOptions {
                enabled: settings.certificates.enabled,
                email: settings.certificates.email.clone(),
                command: settings.certificates.command.clone(),
                timeout: timeouts.certificate(),
            },
        );

        let notifier: Arc<dyn RegistryNotifier> = match &settings.registry.base_url {
            Some(base_url) => {
                let token = settings
                    .registry
                    .token
                    .as_ref()
                    .map(|t| SecretString::from(t.expose_secret().to_owned()));
                let client = HttpClient::new(base_url, timeouts.registry())?.with_token(token);
                info!("Reporting deployments to registry at {}", client.base_url());
                Arc::new(HttpRegistryNotifier::new(client))
            }
            None => {
                info!("No registry configured, deployments will not be reported");
                Arc::new(NoopNotifier)
            }
        };

        let pipeline = DeploymentPipeline::new(
            executor,
            WorkspaceManager::new(&settings.workspace.base_dir),
            router,
            certs,
            notifier,
            PipelineOptions {
                site_root: target.site_root.clone(),
                fetch_timeout: timeouts.fetch(),
                build_timeout: timeouts.build(),
                sync_timeout: timeouts.sync(),
                remote_timeout: timeouts.remote(),
                serialize_domains: settings.serialize_domains,
                recent_outcomes: settings.outcome_cache_capacity,
            },
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            intake: settings.intake.clone(),
            defaults: settings.defaults.clone(),
        })
    }

    /// Wait until no attempt is in flight
    pub async fn drain(&self) {
        let tracker = self.pipeline.tracker();
        let in_flight = tracker.in_flight();
        if !in_flight.is_empty() {
            info!("Waiting for {} in-flight deployment(s) to finish...", in_flight.len());
            for snapshot in &in_flight {
                info!(
                    "[{}] {} is {}",
                    snapshot.id, snapshot.domain, snapshot.phase
                );
            }
        }
        tracker.wait_idle().await;
    }
}
