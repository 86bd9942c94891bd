//! Deployment request model and validation

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Defaults applied to optional request fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDefaults {
    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_build_command")]
    pub build_command: String,

    #[serde(default = "default_deploy_path")]
    pub deploy_path: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_build_command() -> String {
    "npm run build".to_string()
}

fn default_deploy_path() -> String {
    "dist".to_string()
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            build_command: default_build_command(),
            deploy_path: default_deploy_path(),
        }
    }
}

/// A validated deployment request. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Lowercase fully-qualified domain
    pub domain: String,

    pub repo_url: String,

    pub branch: String,

    /// Shell command run inside the workspace
    pub build_command: String,

    /// Build output directory, relative to the repository root
    pub deploy_path: String,
}

impl DeploymentRequest {
    /// Request for `domain` and `repo_url` with default optional fields
    pub fn new(domain: impl Into<String>, repo_url: impl Into<String>) -> Self {
        let defaults = RequestDefaults::default();
        Self {
            domain: domain.into(),
            repo_url: repo_url.into(),
            branch: defaults.branch,
            build_command: defaults.build_command,
            deploy_path: defaults.deploy_path,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_build_command(mut self, build_command: impl Into<String>) -> Self {
        self.build_command = build_command.into();
        self
    }

    pub fn with_deploy_path(mut self, deploy_path: impl Into<String>) -> Self {
        self.deploy_path = deploy_path.into();
        self
    }

    /// Assemble a request from optional wire fields. Blank optional fields
    /// take their defaults; a missing domain or repository is rejected.
    pub fn from_parts(
        domain: Option<String>,
        repo_url: Option<String>,
        branch: Option<String>,
        build_command: Option<String>,
        deploy_path: Option<String>,
        defaults: &RequestDefaults,
    ) -> Result<Self, EngineError> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let (Some(domain), Some(repo_url)) = (present(domain), present(repo_url)) else {
            return Err(EngineError::ValidationError(
                "domain and repo_url are required".to_string(),
            ));
        };

        Ok(Self {
            domain,
            repo_url,
            branch: present(branch).unwrap_or_else(|| defaults.branch.clone()),
            build_command: present(build_command)
                .unwrap_or_else(|| defaults.build_command.clone()),
            deploy_path: present(deploy_path).unwrap_or_else(|| defaults.deploy_path.clone()),
        })
    }

    /// Check every field and normalize the domain
    pub fn validate(mut self) -> Result<Self, EngineError> {
        let invalid = |field: &str, reason: String| {
            EngineError::ValidationError(format!("invalid {}: {}", field, reason))
        };

        self.domain = normalize_domain(&self.domain).map_err(|r| invalid("domain", r))?;
        self.repo_url = self.repo_url.trim().to_string();
        validate_repo_url(&self.repo_url).map_err(|r| invalid("repo_url", r))?;
        validate_branch(&self.branch).map_err(|r| invalid("branch", r))?;
        validate_deploy_path(&self.deploy_path).map_err(|r| invalid("deploy_path", r))?;
        if self.build_command.trim().is_empty() {
            return Err(invalid("build_command", "must not be empty".to_string()));
        }
        Ok(self)
    }
}

/// Lowercase a domain and check it is a multi-label RFC 1123 host name
pub fn normalize_domain(domain: &str) -> Result<String, String> {
    let domain = domain.trim().to_ascii_lowercase();
    if domain.is_empty() {
        return Err("must not be empty".to_string());
    }
    if domain.len() > 253 {
        return Err("longer than 253 characters".to_string());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(format!("'{}' is not a fully-qualified domain", domain));
    }
    for label in labels {
        if label.is_empty() || label.len() > 63 {
            return Err(format!("label '{}' must be 1-63 characters", label));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(format!("label '{}' contains invalid characters", label));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label '{}' starts or ends with '-'", label));
        }
    }
    Ok(domain)
}

/// Repository references are passed to git verbatim
pub fn validate_repo_url(repo_url: &str) -> Result<(), String> {
    if repo_url.is_empty() {
        return Err("must not be empty".to_string());
    }
    if repo_url.starts_with('-') {
        return Err("must not start with '-'".to_string());
    }
    if repo_url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("must not contain whitespace".to_string());
    }
    Ok(())
}

/// Subset of git's ref-name rules that matters for a branch argument
pub fn validate_branch(branch: &str) -> Result<(), String> {
    if branch.is_empty() {
        return Err("must not be empty".to_string());
    }
    if branch.starts_with('-') || branch.starts_with('/') || branch.ends_with('/') {
        return Err("must not start with '-' or start/end with '/'".to_string());
    }
    if branch.ends_with(".lock") || branch.ends_with('.') || branch.contains("..") || branch.contains("@{") {
        return Err(format!("'{}' is not a valid branch name", branch));
    }
    if branch
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c))
    {
        return Err(format!("'{}' contains forbidden characters", branch));
    }
    Ok(())
}

/// Artifact subpath must stay inside the workspace
pub fn validate_deploy_path(deploy_path: &str) -> Result<(), String> {
    if deploy_path.is_empty() {
        return Err("must not be empty".to_string());
    }
    if deploy_path.starts_with('/') {
        return Err("must be relative".to_string());
    }
    if deploy_path.split('/').any(|part| part == "..") {
        return Err("must not contain '..'".to_string());
    }
    Ok(())
}
