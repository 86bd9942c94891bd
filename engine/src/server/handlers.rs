//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use openapi_server::models::{
    AttemptStatus, DeployFailureResponse, DeployRequest, DeployResponse,
    DeploymentStatusResponse, DomainListResponse, ErrorResponse, HealthResponse, TlsStatus,
    VersionResponse, WebhookPayload, WebhookResponse,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::EngineError;
use crate::models::deployment::DeploymentRequest;
use crate::server::intake::{self, Intake};
use crate::server::state::ServerState;
use crate::utils::version_info;

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            EngineError::ValidationError(reason) => (StatusCode::BAD_REQUEST, reason),
            EngineError::NotFound(what) => (StatusCode::NOT_FOUND, what),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, EngineError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| EngineError::ValidationError(rejection.body_text()))
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "sitedeploy".to_string(),
        version: version_info().version,
        timestamp: Utc::now(),
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Run a deployment and answer with its outcome.
///
/// The attempt runs on its own task, so a client that disconnects does not
/// cancel it.
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Response, EngineError> {
    let body = json_body(payload)?;
    let request = DeploymentRequest::from_parts(
        body.domain,
        body.repo_url,
        body.branch,
        body.build_command,
        body.deploy_path,
        &state.defaults,
    )?;
    let attempt = state.pipeline.accept(request)?;
    let deployment_id = attempt.id;

    let outcome = state.pipeline.spawn(attempt).await.map_err(|e| {
        error!("[{}] Deployment task failed: {}", deployment_id, e);
        EngineError::Internal(format!("deployment {} aborted", deployment_id))
    })?;

    if outcome.success() {
        return Ok(Json(DeployResponse {
            success: true,
            deployment_id,
            domain: outcome.domain().to_string(),
            url: outcome.url(),
            message: outcome.message(),
            tls_status: outcome.tls_status().unwrap_or(TlsStatus::Skipped),
            degraded: outcome.degraded(),
            config_digest: outcome.config_digest.clone(),
        })
        .into_response());
    }

    Ok((
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(DeployFailureResponse {
            success: false,
            deployment_id,
            error: outcome
                .error()
                .unwrap_or_else(|| "deployment failed".to_string()),
            stage: outcome.failure.as_ref().map(|f| f.stage.to_string()),
        }),
    )
        .into_response())
}

/// Deployment status handler
pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let deployment_id = Uuid::parse_str(&id)
        .map_err(|_| EngineError::ValidationError(format!("invalid deployment id: {}", id)))?;

    let Some(snapshot) = state.pipeline.status(&deployment_id) else {
        // Unknown or long finished
        return Ok(Json(DeploymentStatusResponse {
            success: true,
            deployment_id,
            status: AttemptStatus::CompletedOrFailed,
            phase: None,
            domain: None,
            started_at: None,
            finished_at: None,
            error: None,
            tls_status: None,
        }));
    };

    Ok(Json(DeploymentStatusResponse {
        success: true,
        deployment_id,
        status: if snapshot.in_progress() {
            AttemptStatus::InProgress
        } else {
            AttemptStatus::CompletedOrFailed
        },
        phase: Some(snapshot.phase.to_string()),
        domain: Some(snapshot.domain),
        started_at: Some(snapshot.started_at),
        finished_at: snapshot.finished_at,
        error: snapshot.failure.map(|f| f.to_string()),
        tls_status: snapshot.tls_status,
    }))
}

/// Deployed domains handler
pub async fn domains_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, EngineError> {
    let domains = state.pipeline.deployed_domains().await.map_err(|e| {
        error!("Unable to list deployed domains: {}", e);
        e
    })?;

    Ok(Json(DomainListResponse {
        success: true,
        count: domains.len(),
        domains,
    }))
}

/// Push webhook handler.
///
/// Only a payload without repository or ref is rejected. Every other
/// notification is acknowledged before any deployment runs, including ones
/// that cannot be deployed, which are logged and dropped.
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> Result<impl IntoResponse, EngineError> {
    let payload = json_body(payload)?;
    match intake::translate(payload, &state.intake, &state.defaults)? {
        Intake::Deploy(request) => match state.pipeline.accept(request) {
            Ok(attempt) => {
                info!(
                    "[{}] Webhook triggered deployment of {}",
                    attempt.id, attempt.request.domain
                );
                // Detached: the outcome is only logged and reported to the registry
                drop(state.pipeline.spawn(attempt));
            }
            Err(e) => warn!("Ignoring webhook: {}", e),
        },
        Intake::Ignored(reason) => warn!("Ignoring webhook: {}", reason),
    }

    Ok(Json(WebhookResponse {
        success: true,
        message: "Webhook received".to_string(),
    }))
}
