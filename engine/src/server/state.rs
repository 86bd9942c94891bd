//! Server state

use std::sync::Arc;

use crate::deploy::pipeline::DeploymentPipeline;
use crate::models::deployment::RequestDefaults;
use crate::storage::settings::IntakeSettings;

/// Server state shared across handlers
pub struct ServerState {
    pub pipeline: Arc<DeploymentPipeline>,
    pub intake: IntakeSettings,
    pub defaults: RequestDefaults,
}

impl ServerState {
    pub fn new(
        pipeline: Arc<DeploymentPipeline>,
        intake: IntakeSettings,
        defaults: RequestDefaults,
    ) -> Self {
        Self {
            pipeline,
            intake,
            defaults,
        }
    }
}
