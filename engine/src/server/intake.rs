//! Webhook event translation

use openapi_server::models::WebhookPayload;

use crate::errors::EngineError;
use crate::models::deployment::{DeploymentRequest, RequestDefaults};
use crate::storage::settings::IntakeSettings;

/// What a push notification turns into
#[derive(Debug)]
pub enum Intake {
    Deploy(DeploymentRequest),
    /// Well-formed notification that cannot be deployed (tag push, repository
    /// name that is not a valid host label, ...)
    Ignored(String),
}

/// Turn a push notification into a deployment request.
///
/// The branch is the pushed ref without its branch prefix and the domain is
/// `<repository name>.<suffix>`. Build command and artifact path take the
/// configured defaults. Only a missing repository or ref is an error.
pub fn translate(
    payload: WebhookPayload,
    intake: &IntakeSettings,
    defaults: &RequestDefaults,
) -> Result<Intake, EngineError> {
    let (Some(repository), Some(git_ref)) = (payload.repository, payload.git_ref) else {
        return Err(EngineError::ValidationError(
            "repository and ref are required".to_string(),
        ));
    };

    let branch = git_ref
        .strip_prefix(intake.branch_prefix.as_str())
        .unwrap_or(&git_ref);
    if branch.starts_with("refs/") {
        return Ok(Intake::Ignored(format!("ref {} is not a branch", git_ref)));
    }

    let domain = format!(
        "{}.{}",
        repository.name,
        intake.domain_suffix.trim_matches('.')
    );

    match DeploymentRequest::from_parts(
        Some(domain),
        Some(repository.clone_url),
        Some(branch.to_string()),
        None,
        None,
        defaults,
    ) {
        Ok(request) => Ok(Intake::Deploy(request)),
        Err(EngineError::ValidationError(reason)) => Ok(Intake::Ignored(reason)),
        Err(e) => Err(e),
    }
}
