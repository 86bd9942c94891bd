//! Deployment attempt model

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::deploy::fsm::{PipelineEvent, PipelineFsm, PipelinePhase, StageFailure};
use crate::models::deployment::DeploymentRequest;

/// One execution of the pipeline for one request
#[derive(Debug, Clone)]
pub struct DeploymentAttempt {
    pub id: Uuid,
    pub request: DeploymentRequest,
    pub started_at: DateTime<Utc>,
    fsm: PipelineFsm,
}

impl DeploymentAttempt {
    pub fn new(id: Uuid, request: DeploymentRequest) -> Self {
        Self {
            id,
            request,
            started_at: Utc::now(),
            fsm: PipelineFsm::new(),
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.fsm.phase()
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.fsm.failure()
    }

    /// Apply an event to the attempt's state machine
    pub fn process(&mut self, event: PipelineEvent) -> Result<PipelinePhase, String> {
        self.fsm.process(event)
    }
}
