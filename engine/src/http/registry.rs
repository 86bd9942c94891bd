//! Deployment registry API client

use async_trait::async_trait;
use openapi_client::models::DeploymentRecord;

use crate::deploy::notifier::RegistryNotifier;
use crate::errors::EngineError;
use crate::http::client::HttpClient;

impl HttpClient {
    /// Record a finished deployment
    pub async fn record_deployment(&self, record: &DeploymentRecord) -> Result<(), EngineError> {
        self.post("/api/deployments", record).await
    }
}

/// Reports outcomes to the registry over HTTP
pub struct HttpRegistryNotifier {
    client: HttpClient,
}

impl HttpRegistryNotifier {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RegistryNotifier for HttpRegistryNotifier {
    async fn notify(&self, record: &DeploymentRecord) -> Result<(), EngineError> {
        self.client.record_deployment(record).await
    }

    fn name(&self) -> &str {
        self.client.base_url()
    }
}
