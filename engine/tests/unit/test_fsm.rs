//! FSM unit tests

use sitedeploy::deploy::fsm::{PipelineEvent, PipelineFsm, PipelinePhase, Stage, StageFailure};

fn advance(fsm: &mut PipelineFsm, events: Vec<PipelineEvent>) {
    for event in events {
        fsm.process(event).unwrap();
    }
}

#[test]
fn test_fsm_initial_state() {
    let fsm = PipelineFsm::new();
    assert_eq!(fsm.phase(), PipelinePhase::Accepted);
    assert!(fsm.failure().is_none());
    assert!(!fsm.is_terminal());
}

#[test]
fn test_fsm_success_flow() {
    let mut fsm = PipelineFsm::new();

    let expected = [
        (PipelineEvent::Start, PipelinePhase::Fetching),
        (PipelineEvent::Fetched, PipelinePhase::Building),
        (PipelineEvent::Built, PipelinePhase::Syncing),
        (PipelineEvent::Synced, PipelinePhase::ConfiguringRoute),
        (PipelineEvent::RouteConfigured, PipelinePhase::ProvisioningCert),
        (PipelineEvent::CertificateHandled, PipelinePhase::Activating),
        (PipelineEvent::Activated, PipelinePhase::Cleaning),
        (PipelineEvent::Cleaned, PipelinePhase::Succeeded),
    ];
    for (event, phase) in expected {
        assert_eq!(fsm.process(event).unwrap(), phase);
    }
    assert!(fsm.is_terminal());
    assert!(fsm.failure().is_none());
}

#[test]
fn test_fsm_failure_goes_through_cleaning() {
    let mut fsm = PipelineFsm::new();
    advance(&mut fsm, vec![PipelineEvent::Start, PipelineEvent::Fetched]);

    let failure = StageFailure::new(Stage::Build, "exit 1");
    assert_eq!(
        fsm.process(PipelineEvent::Fail(failure.clone())).unwrap(),
        PipelinePhase::Cleaning
    );
    assert_eq!(fsm.failure(), Some(&failure));

    assert_eq!(fsm.process(PipelineEvent::Cleaned).unwrap(), PipelinePhase::Failed);
    assert_eq!(fsm.failure().unwrap().stage, Stage::Build);
}

#[test]
fn test_fsm_workspace_failure_from_accepted() {
    let mut fsm = PipelineFsm::new();
    fsm.process(PipelineEvent::Fail(StageFailure::new(Stage::Workspace, "read-only")))
        .unwrap();
    fsm.process(PipelineEvent::Cleaned).unwrap();
    assert_eq!(fsm.phase(), PipelinePhase::Failed);
    assert_eq!(fsm.failure().unwrap().to_string(), "workspace failed: read-only");
}

#[test]
fn test_fsm_never_goes_backwards() {
    let mut fsm = PipelineFsm::new();
    advance(
        &mut fsm,
        vec![PipelineEvent::Start, PipelineEvent::Fetched, PipelineEvent::Built],
    );

    assert!(fsm.process(PipelineEvent::Fetched).is_err());
    assert!(fsm.process(PipelineEvent::Start).is_err());
    assert_eq!(fsm.phase(), PipelinePhase::Syncing);
}

#[test]
fn test_fsm_terminal_is_final() {
    let mut fsm = PipelineFsm::new();
    fsm.process(PipelineEvent::Fail(StageFailure::new(Stage::Fetch, "not found")))
        .unwrap();
    fsm.process(PipelineEvent::Cleaned).unwrap();

    assert!(fsm.process(PipelineEvent::Start).is_err());
    assert!(fsm
        .process(PipelineEvent::Fail(StageFailure::new(Stage::Sync, "late")))
        .is_err());
    assert_eq!(fsm.failure().unwrap().stage, Stage::Fetch);
}

#[test]
fn test_phase_names() {
    assert_eq!(PipelinePhase::ConfiguringRoute.to_string(), "configuring_route");
    assert_eq!(
        serde_json::to_string(&PipelinePhase::ProvisioningCert).unwrap(),
        "\"provisioning_cert\""
    );
}
