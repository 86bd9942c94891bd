//! Deployment pipeline
//!
//! Sequences fetch, build, sync, routing, certificate issuance and cleanup
//! for one attempt. Stages run strictly in order; the first failing stage
//! aborts the attempt, and the workspace is released on every exit path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deploy::certs::{CertificateOutcome, CertificateProvisioner};
use crate::deploy::fsm::{PipelineEvent, PipelinePhase, Stage, StageFailure};
use crate::deploy::git;
use crate::deploy::locks::DomainLocks;
use crate::deploy::notifier::{spawn_notification, RegistryNotifier};
use crate::deploy::routing::RoutingConfigurator;
use crate::deploy::tracker::{AttemptSnapshot, AttemptTracker};
use crate::deploy::workspace::{Workspace, WorkspaceManager};
use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::models::attempt::DeploymentAttempt;
use crate::models::deployment::DeploymentRequest;
use crate::models::outcome::DeploymentOutcome;
use crate::remote::executor::{CommandExecutor, RunOptions};
use crate::remote::runner::shell_quote;

/// Pipeline-wide settings
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory on the target host holding one directory per domain
    pub site_root: String,

    pub fetch_timeout: Duration,
    pub build_timeout: Duration,
    pub sync_timeout: Duration,

    /// Bound for small remote commands (`mkdir`, `ls`)
    pub remote_timeout: Duration,

    /// Hold a per-domain lock across each attempt
    pub serialize_domains: bool,

    /// Finished outcomes kept for status queries
    pub recent_outcomes: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            site_root: "/home/pi/static-sites".to_string(),
            fetch_timeout: Duration::from_secs(300),
            build_timeout: Duration::from_secs(900),
            sync_timeout: Duration::from_secs(300),
            remote_timeout: Duration::from_secs(60),
            serialize_domains: true,
            recent_outcomes: 256,
        }
    }
}

/// Values collected while the stages run
#[derive(Default)]
struct StageResults {
    certificate: Option<CertificateOutcome>,
    config_digest: Option<String>,
}

/// Orchestrates deployment attempts
pub struct DeploymentPipeline {
    executor: Arc<CommandExecutor>,
    workspaces: WorkspaceManager,
    router: RoutingConfigurator,
    certs: CertificateProvisioner,
    notifier: Arc<dyn RegistryNotifier>,
    tracker: Arc<AttemptTracker>,
    locks: Option<Arc<DomainLocks>>,
    options: PipelineOptions,
}

impl DeploymentPipeline {
    pub fn new(
        executor: Arc<CommandExecutor>,
        workspaces: WorkspaceManager,
        router: RoutingConfigurator,
        certs: CertificateProvisioner,
        notifier: Arc<dyn RegistryNotifier>,
        options: PipelineOptions,
    ) -> Self {
        let locks = options
            .serialize_domains
            .then(|| Arc::new(DomainLocks::new()));
        Self {
            executor,
            workspaces,
            router,
            certs,
            notifier,
            tracker: Arc::new(AttemptTracker::new(options.recent_outcomes)),
            locks,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn tracker(&self) -> &Arc<AttemptTracker> {
        &self.tracker
    }

    /// Current view of an attempt
    pub fn status(&self, id: &Uuid) -> Option<AttemptSnapshot> {
        self.tracker.snapshot(id)
    }

    /// Remote directory receiving the artifact of a domain
    pub fn site_dir(&self, domain: &str) -> String {
        format!("{}/{}", self.options.site_root.trim_end_matches('/'), domain)
    }

    /// Validate a request and create its attempt.
    ///
    /// Nothing is allocated and no command is issued when validation fails.
    pub fn accept(&self, request: DeploymentRequest) -> Result<DeploymentAttempt, EngineError> {
        let request = request.validate()?;
        let id = Uuid::new_v4();
        let attempt = DeploymentAttempt::new(id, request);
        self.tracker.register(&attempt);
        info!(
            "[{}] Accepted deployment of {} ({}@{})",
            id, attempt.request.domain, attempt.request.repo_url, attempt.request.branch
        );
        Ok(attempt)
    }

    /// Accept and run a request to completion
    pub async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentOutcome, EngineError> {
        let attempt = self.accept(request)?;
        Ok(self.execute(attempt).await)
    }

    /// Run an accepted attempt on its own task. The attempt runs to
    /// completion even if the handle is dropped.
    pub fn spawn(self: &Arc<Self>, attempt: DeploymentAttempt) -> JoinHandle<DeploymentOutcome> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.execute(attempt).await })
    }

    /// Run every stage of an accepted attempt and report its outcome
    pub async fn execute(&self, mut attempt: DeploymentAttempt) -> DeploymentOutcome {
        let _domain_guard = match &self.locks {
            Some(locks) => {
                debug!("[{}] Waiting for lock on {}", attempt.id, attempt.request.domain);
                Some(locks.acquire(&attempt.request.domain).await)
            }
            None => None,
        };

        let mut results = StageResults::default();
        match self.workspaces.allocate(attempt.id).await {
            Ok(workspace) => {
                if let Err(failure) = self.run_stages(&mut attempt, &workspace, &mut results).await {
                    self.advance(&mut attempt, PipelineEvent::Fail(failure));
                }
                workspace.release().await;
            }
            Err(e) => {
                let failure = StageFailure::new(Stage::Workspace, e.to_string());
                self.advance(&mut attempt, PipelineEvent::Fail(failure));
            }
        }
        self.advance(&mut attempt, PipelineEvent::Cleaned);

        let outcome = DeploymentOutcome {
            deployment_id: attempt.id,
            request: attempt.request.clone(),
            phase: attempt.phase(),
            failure: attempt.failure().cloned(),
            certificate: results.certificate,
            config_digest: results.config_digest,
            started_at: attempt.started_at,
            finished_at: Utc::now(),
        };

        match &outcome.failure {
            None => info!("[{}] {}: {}", outcome.deployment_id, outcome.domain(), outcome.message()),
            Some(failure) => error!("[{}] {}: {}", outcome.deployment_id, outcome.domain(), failure),
        }

        self.tracker.finish(&outcome);
        spawn_notification(self.notifier.clone(), outcome.to_record());
        outcome
    }

    async fn run_stages(
        &self,
        attempt: &mut DeploymentAttempt,
        workspace: &Workspace,
        results: &mut StageResults,
    ) -> Result<(), StageFailure> {
        let id = attempt.id;
        let request = attempt.request.clone();

        // Fetch
        self.advance(attempt, PipelineEvent::Start);
        git::fetch_repository(
            &self.executor,
            &request.repo_url,
            &request.branch,
            workspace.path(),
            self.options.fetch_timeout,
        )
        .await
        .map_err(|e| StageFailure::new(Stage::Fetch, e.to_string()))?;
        self.advance(attempt, PipelineEvent::Fetched);

        // Build
        info!("[{}] Building: {}", id, request.build_command);
        self.executor
            .run(
                &request.build_command,
                RunOptions::local()
                    .in_dir(workspace.path())
                    .with_timeout(self.options.build_timeout),
            )
            .await
            .map_err(|e| StageFailure::new(Stage::Build, e.to_string()))?;
        self.advance(attempt, PipelineEvent::Built);

        // Sync
        let site_dir = self.site_dir(&request.domain);
        self.sync(attempt, workspace, &site_dir)
            .await
            .map_err(|cause| StageFailure::new(Stage::Sync, cause))?;
        self.advance(attempt, PipelineEvent::Synced);

        // Route
        let applied = self
            .router
            .apply(&request.domain, &site_dir)
            .await
            .map_err(|e| StageFailure::new(Stage::Route, e.to_string()))?;
        results.config_digest = Some(applied.digest);
        self.router
            .reload()
            .await
            .map_err(|e| StageFailure::new(Stage::Route, e.to_string()))?;
        self.advance(attempt, PipelineEvent::RouteConfigured);

        // Certificate, best effort
        results.certificate = Some(self.certs.provision(&request.domain).await);
        self.advance(attempt, PipelineEvent::CertificateHandled);

        info!("[{}] {} is live", id, request.domain);
        self.advance(attempt, PipelineEvent::Activated);
        Ok(())
    }

    async fn sync(
        &self,
        attempt: &DeploymentAttempt,
        workspace: &Workspace,
        site_dir: &str,
    ) -> Result<(), String> {
        let artifact = workspace.join(&attempt.request.deploy_path);
        if !Dir::new(&artifact).exists().await {
            return Err(format!(
                "artifact directory '{}' not found after build",
                attempt.request.deploy_path
            ));
        }

        self.executor
            .run(
                &format!("mkdir -p {}", shell_quote(site_dir)),
                RunOptions::remote().with_timeout(self.options.remote_timeout),
            )
            .await
            .map_err(|e| e.to_string())?;

        info!("[{}] Syncing {} to {}", attempt.id, artifact.display(), site_dir);
        self.executor
            .mirror_to_remote(&artifact, site_dir, Some(self.options.sync_timeout))
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Names of the site directories on the target host
    pub async fn deployed_domains(&self) -> Result<Vec<String>, EngineError> {
        let output = self
            .executor
            .run(
                &format!("ls -1 {}", shell_quote(&self.options.site_root)),
                RunOptions::remote().with_timeout(self.options.remote_timeout),
            )
            .await?;

        let mut domains: Vec<String> = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        domains.sort();
        Ok(domains)
    }

    fn advance(&self, attempt: &mut DeploymentAttempt, event: PipelineEvent) {
        match attempt.process(event) {
            Ok(phase) => {
                debug!("[{}] Phase: {}", attempt.id, phase);
                self.tracker.set_phase(&attempt.id, phase);
                if phase == PipelinePhase::Cleaning && attempt.failure().is_some() {
                    warn!("[{}] Aborting, cleaning up", attempt.id);
                }
            }
            Err(e) => error!("[{}] {}", attempt.id, e),
        }
    }
}
