//! Registry notification
//!
//! Terminal outcomes are reported to the external registry from a detached
//! task. A failing registry never changes the outcome of a deployment.

use std::sync::Arc;

use async_trait::async_trait;
use openapi_client::models::DeploymentRecord;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::EngineError;

/// Receives the final record of every attempt
#[async_trait]
pub trait RegistryNotifier: Send + Sync {
    async fn notify(&self, record: &DeploymentRecord) -> Result<(), EngineError>;

    /// Label used in logs
    fn name(&self) -> &str;
}

/// Used when no registry is configured
pub struct NoopNotifier;

#[async_trait]
impl RegistryNotifier for NoopNotifier {
    async fn notify(&self, record: &DeploymentRecord) -> Result<(), EngineError> {
        debug!("[{}] No registry configured, skipping notification", record.deployment_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Send a record without waiting for the result
pub fn spawn_notification(
    notifier: Arc<dyn RegistryNotifier>,
    record: DeploymentRecord,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match notifier.notify(&record).await {
            Ok(()) => debug!(
                "[{}] Registry {} notified ({:?})",
                record.deployment_id,
                notifier.name(),
                record.status
            ),
            Err(e) => warn!(
                "[{}] Registry {} notification failed: {}",
                record.deployment_id,
                notifier.name(),
                e
            ),
        }
    })
}
