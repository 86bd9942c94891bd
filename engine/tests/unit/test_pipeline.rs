//! Deployment pipeline tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use openapi_client::models::{DeploymentRecord, RecordStatus};
use openapi_server::models::TlsStatus;
use tokio_test::{assert_err, assert_ok};

use sitedeploy::deploy::certs::{CertificateOptions, CertificateProvisioner};
use sitedeploy::deploy::fsm::{PipelinePhase, Stage};
use sitedeploy::deploy::nginx::RoutingConfig;
use sitedeploy::deploy::notifier::RegistryNotifier;
use sitedeploy::deploy::pipeline::{DeploymentPipeline, PipelineOptions};
use sitedeploy::deploy::routing::{RoutingConfigurator, RoutingOptions};
use sitedeploy::deploy::workspace::WorkspaceManager;
use sitedeploy::errors::EngineError;
use sitedeploy::models::deployment::DeploymentRequest;
use sitedeploy::remote::executor::{CommandExecutor, TargetHost};

use crate::support::{Harness, ScriptedRunner, BUILD};

const REPO: &str = "https://git.example/demo.git";

fn demo_repo(runner: &ScriptedRunner) {
    runner.add_repo(
        REPO,
        "main",
        &[
            ("src/index.html", "<h1>demo</h1>"),
            ("src/assets/app.js", "console.log('demo');"),
            ("package.json", "{}"),
        ],
    );
}

fn demo_request(domain: &str) -> DeploymentRequest {
    DeploymentRequest::new(domain, REPO).with_build_command(BUILD)
}

#[tokio::test]
async fn test_successful_deployment() {
    let harness = Harness::new();
    demo_repo(&harness.runner);

    let outcome = harness
        .pipeline()
        .deploy(demo_request("demo.example.org"))
        .await
        .unwrap();

    assert!(outcome.success());
    assert_eq!(outcome.phase, PipelinePhase::Succeeded);
    assert_eq!(outcome.url(), "https://demo.example.org");
    assert_eq!(outcome.tls_status(), Some(TlsStatus::Provisioned));
    assert!(!outcome.degraded());

    // Artifact synced
    let site = harness.site_dir("demo.example.org");
    assert_eq!(
        std::fs::read_to_string(site.join("index.html")).unwrap(),
        "<h1>demo</h1>"
    );
    assert!(site.join("assets/app.js").exists());

    // Routing installed, enabled and reloaded once
    let config = std::fs::read_to_string(harness.available_config("demo.example.org")).unwrap();
    let expected = RoutingConfig::new("demo.example.org", site.display().to_string());
    assert_eq!(config, expected.render());
    assert_eq!(outcome.config_digest, Some(expected.digest()));
    assert!(harness.enabled_link("demo.example.org").symlink_metadata().is_ok());
    assert_eq!(harness.runner.count("ssh", "nginx -s reload"), 1);
    assert_eq!(harness.runner.count("ssh", "certbot --nginx -d"), 1);

    // Workspace released
    assert!(!harness.pipeline().workspaces().exists(&outcome.deployment_id).await);
    assert_eq!(harness.workspace_count(), 0);
}

#[tokio::test]
async fn test_build_failure() {
    let harness = Harness::new();
    demo_repo(&harness.runner);

    let request = DeploymentRequest::new("demo.example.org", REPO)
        .with_build_command("echo 'npm ERR! missing script: build' >&2; exit 1");
    let outcome = harness.pipeline().deploy(request).await.unwrap();

    assert!(!outcome.success());
    assert_eq!(outcome.phase, PipelinePhase::Failed);
    let failure = outcome.failure.clone().unwrap();
    assert_eq!(failure.stage, Stage::Build);
    assert!(failure.cause.contains("npm ERR! missing script: build"));
    assert!(outcome.error().unwrap().starts_with("build failed"));

    assert_eq!(harness.runner.count("rsync", ""), 0);
    assert_eq!(harness.runner.count("ssh", ""), 0);
    assert_eq!(harness.workspace_count(), 0);

    let snapshot = harness.pipeline().status(&outcome.deployment_id).unwrap();
    assert_eq!(snapshot.phase, PipelinePhase::Failed);
    assert!(!snapshot.in_progress());
}

#[tokio::test]
async fn test_redeploy_removes_deleted_files() {
    let harness = Harness::new();
    demo_repo(&harness.runner);
    assert_ok!(harness.pipeline().deploy(demo_request("demo.example.org")).await);

    let site = harness.site_dir("demo.example.org");
    assert!(site.join("assets/app.js").exists());

    harness
        .runner
        .add_repo(REPO, "main", &[("src/index.html", "<h1>v2</h1>")]);
    let outcome = harness
        .pipeline()
        .deploy(demo_request("demo.example.org"))
        .await
        .unwrap();

    assert!(outcome.success());
    assert_eq!(
        std::fs::read_to_string(site.join("index.html")).unwrap(),
        "<h1>v2</h1>"
    );
    assert!(!site.join("assets/app.js").exists());
}

#[tokio::test]
async fn test_invalid_request_has_no_side_effects() {
    let harness = Harness::new();

    let err = assert_err!(harness
        .pipeline()
        .accept(DeploymentRequest::new("not a domain", REPO)));
    assert!(matches!(err, EngineError::ValidationError(_)));

    let err = assert_err!(harness
        .pipeline()
        .accept(DeploymentRequest::new("demo.example.org", "-upload-pack=evil")));
    assert!(matches!(err, EngineError::ValidationError(_)));

    let err = assert_err!(harness.pipeline().accept(
        DeploymentRequest::new("demo.example.org", REPO).with_deploy_path("../etc")
    ));
    assert!(matches!(err, EngineError::ValidationError(_)));

    assert!(harness.runner.invocations().is_empty());
    assert_eq!(harness.workspace_count(), 0);
    assert_eq!(harness.pipeline().tracker().in_flight_count(), 0);
}

#[tokio::test]
async fn test_workspace_allocation_failure() {
    let harness = Harness::new();
    demo_repo(&harness.runner);
    std::fs::write(harness.dir.path().join("workspaces"), "not a directory").unwrap();

    let outcome = assert_ok!(
        harness
            .pipeline()
            .deploy(demo_request("demo.example.org"))
            .await
    );

    assert!(!outcome.success());
    assert_eq!(outcome.phase, PipelinePhase::Failed);
    assert_eq!(outcome.failure.as_ref().unwrap().stage, Stage::Workspace);
    assert!(harness.runner.invocations().is_empty());
    assert_eq!(harness.pipeline().tracker().in_flight_count(), 0);
    assert_eq!(
        harness
            .pipeline()
            .status(&outcome.deployment_id)
            .unwrap()
            .phase,
        PipelinePhase::Failed
    );
}

#[tokio::test]
async fn test_fetch_failure() {
    let harness = Harness::new();

    let outcome = harness
        .pipeline()
        .deploy(DeploymentRequest::new("demo.example.org", "https://git.example/missing.git"))
        .await
        .unwrap();

    let failure = outcome.failure.unwrap();
    assert_eq!(failure.stage, Stage::Fetch);
    assert!(failure.cause.contains("not found"));
    assert_eq!(harness.runner.count("sh", ""), 0);
    assert_eq!(harness.workspace_count(), 0);
}

#[tokio::test]
async fn test_missing_artifact_fails_sync() {
    let harness = Harness::new();
    demo_repo(&harness.runner);

    let request = demo_request("demo.example.org").with_deploy_path("build");
    let outcome = harness.pipeline().deploy(request).await.unwrap();

    let failure = outcome.failure.unwrap();
    assert_eq!(failure.stage, Stage::Sync);
    assert!(failure.cause.contains("build"));
    assert_eq!(harness.runner.count("rsync", ""), 0);
}

#[tokio::test]
async fn test_rejected_config_is_disabled_and_not_reloaded() {
    let harness = Harness::new();
    demo_repo(&harness.runner);
    harness.runner.fail_when(
        "ssh",
        "nginx -t",
        "nginx: [emerg] unknown directive \"gzip_typez\"",
    );

    let outcome = harness
        .pipeline()
        .deploy(demo_request("demo.example.org"))
        .await
        .unwrap();

    let failure = outcome.failure.clone().unwrap();
    assert_eq!(failure.stage, Stage::Route);
    assert!(failure.cause.contains("[emerg]"));
    assert!(outcome.certificate.is_none());

    assert!(harness.enabled_link("demo.example.org").symlink_metadata().is_err());
    assert_eq!(harness.runner.count("ssh", "nginx -s reload"), 0);
    assert_eq!(harness.runner.count("ssh", "certbot"), 0);
    assert_eq!(harness.workspace_count(), 0);
}

#[tokio::test]
async fn test_reload_failure_fails_route_stage() {
    let harness = Harness::new();
    demo_repo(&harness.runner);
    harness
        .runner
        .fail_when("ssh", "nginx -s reload", "nginx: [error] invalid PID number");

    let outcome = harness
        .pipeline()
        .deploy(demo_request("demo.example.org"))
        .await
        .unwrap();

    assert_eq!(outcome.failure.unwrap().stage, Stage::Route);
}

#[tokio::test]
async fn test_certificate_failure_degrades() {
    let harness = Harness::new();
    demo_repo(&harness.runner);
    harness.runner.fail_when(
        "ssh",
        "certbot",
        "too many certificates already issued for this domain",
    );

    let outcome = harness
        .pipeline()
        .deploy(demo_request("demo.example.org"))
        .await
        .unwrap();

    assert!(outcome.success());
    assert!(outcome.degraded());
    assert_eq!(outcome.tls_status(), Some(TlsStatus::Skipped));
    assert!(outcome.message().contains("too many certificates"));
    assert_eq!(outcome.to_record().status, RecordStatus::Deployed);
}

#[tokio::test]
async fn test_disabled_certificates_skip_issuance() {
    let harness = Harness::with_settings(|settings| settings.certificates.enabled = false);
    demo_repo(&harness.runner);

    let outcome = harness
        .pipeline()
        .deploy(demo_request("demo.example.org"))
        .await
        .unwrap();

    assert!(outcome.success());
    assert!(outcome.degraded());
    assert_eq!(harness.runner.count("ssh", "certbot"), 0);
}

#[tokio::test]
async fn test_route_apply_is_idempotent() {
    let harness = Harness::new();
    demo_repo(&harness.runner);

    let first = harness
        .pipeline()
        .deploy(demo_request("demo.example.org"))
        .await
        .unwrap();
    let config_first = std::fs::read(harness.available_config("demo.example.org")).unwrap();

    let second = harness
        .pipeline()
        .deploy(demo_request("demo.example.org"))
        .await
        .unwrap();
    let config_second = std::fs::read(harness.available_config("demo.example.org")).unwrap();

    assert_eq!(config_first, config_second);
    assert_eq!(first.config_digest, second.config_digest);
    assert_ne!(first.deployment_id, second.deployment_id);
}

#[tokio::test]
async fn test_concurrent_attempts_are_isolated() {
    let harness = Harness::new();
    demo_repo(&harness.runner);

    let domains = ["a.example.org", "b.example.org", "c.example.org", "a.example.org"];
    let outcomes = join_all(
        domains
            .iter()
            .map(|domain| harness.pipeline().deploy(demo_request(domain))),
    )
    .await;

    let mut ids = Vec::new();
    for outcome in outcomes {
        let outcome = outcome.unwrap();
        assert!(outcome.success(), "{:?}", outcome.failure);
        ids.push(outcome.deployment_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), domains.len());

    assert_eq!(harness.workspace_count(), 0);
    assert_eq!(
        harness.pipeline().deployed_domains().await.unwrap(),
        vec!["a.example.org", "b.example.org", "c.example.org"]
    );
}

#[tokio::test]
async fn test_status_tracks_phase_while_in_flight() {
    let harness = Harness::new();
    demo_repo(&harness.runner);

    let request = DeploymentRequest::new("demo.example.org", REPO)
        .with_build_command(format!("sleep 1 && {}", BUILD));
    let attempt = harness.pipeline().accept(request).unwrap();
    let id = attempt.id;
    assert!(harness.pipeline().status(&id).unwrap().in_progress());

    let handle = harness.pipeline().spawn(attempt);

    let mut building = false;
    for _ in 0..100 {
        let snapshot = harness.pipeline().status(&id).unwrap();
        if snapshot.phase == PipelinePhase::Building {
            building = true;
            assert!(snapshot.in_progress());
            assert!(harness.pipeline().workspaces().exists(&id).await);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(building);

    let outcome = handle.await.unwrap();
    assert!(outcome.success());

    let snapshot = harness.pipeline().status(&id).unwrap();
    assert_eq!(snapshot.phase, PipelinePhase::Succeeded);
    assert!(!snapshot.in_progress());
    assert!(snapshot.finished_at.is_some());
    assert_eq!(harness.pipeline().tracker().in_flight_count(), 0);
}

#[tokio::test]
async fn test_dropped_handle_still_cleans_up() {
    let harness = Harness::new();
    demo_repo(&harness.runner);

    let attempt = harness
        .pipeline()
        .accept(demo_request("demo.example.org"))
        .unwrap();
    drop(harness.pipeline().spawn(attempt));

    harness.settle().await;
    assert_eq!(harness.workspace_count(), 0);
    assert!(harness.site_dir("demo.example.org").join("index.html").exists());
}

#[tokio::test]
async fn test_deployed_domains_failure() {
    let harness = Harness::new();
    harness
        .runner
        .fail_when("ssh", "ls -1", "ssh: connect to host aria port 22: Connection refused");

    let err = harness.pipeline().deployed_domains().await.unwrap_err();
    assert!(err.to_string().contains("Connection refused"));
}

#[derive(Default)]
struct RecordingNotifier {
    records: Mutex<Vec<DeploymentRecord>>,
}

#[async_trait]
impl RegistryNotifier for RecordingNotifier {
    async fn notify(&self, record: &DeploymentRecord) -> Result<(), EngineError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[tokio::test]
async fn test_registry_receives_success_and_failure() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::default());
    runner.succeed_when("ssh", "");
    demo_repo(&runner);

    let executor = Arc::new(CommandExecutor::new(
        runner.clone(),
        TargetHost::new("pi", "aria"),
        Duration::from_secs(30),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = DeploymentPipeline::new(
        executor.clone(),
        WorkspaceManager::new(dir.path().join("workspaces")),
        RoutingConfigurator::new(
            executor.clone(),
            RoutingOptions {
                staging_dir: dir.path().join("staging"),
                ..Default::default()
            },
        ),
        CertificateProvisioner::new(executor.clone(), CertificateOptions::default()),
        notifier.clone(),
        PipelineOptions::default(),
    );

    // Remote side is fully scripted, so only the local stages do real work
    runner.succeed_when("rsync", "");
    runner.succeed_when("scp", "");

    let ok = pipeline.deploy(demo_request("demo.example.org")).await.unwrap();
    let failed = pipeline
        .deploy(demo_request("demo.example.org").with_build_command("exit 2"))
        .await
        .unwrap();
    assert!(ok.success());
    assert!(!failed.success());

    for _ in 0..100 {
        if notifier.records.lock().unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let records = notifier.records.lock().unwrap().clone();
    assert_eq!(records.len(), 2);
    let deployed = records
        .iter()
        .find(|r| r.deployment_id == ok.deployment_id)
        .unwrap();
    assert_eq!(deployed.status, RecordStatus::Deployed);
    assert!(deployed.tls);
    assert_eq!(deployed.domain, "demo.example.org");

    let failed_record = records
        .iter()
        .find(|r| r.deployment_id == failed.deployment_id)
        .unwrap();
    assert_eq!(failed_record.status, RecordStatus::Failed);
    assert_eq!(failed_record.failed_stage.as_deref(), Some("build"));
}
