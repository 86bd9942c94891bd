//! Error types for the deployment engine

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Execution error: {0}")]
    ExecutionError(#[from] ExecutionError),

    #[error("Workspace error: {0}")]
    WorkspaceError(#[from] WorkspaceError),

    #[error("Routing error: {0}")]
    RoutingError(#[from] RoutingError),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How an external process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitInfo {
    /// Exited with a non-zero status code
    Code(i32),

    /// Terminated without a status code (signal)
    Terminated,

    /// Could not be started at all
    Spawn(String),

    /// Killed after exceeding its time budget
    TimedOut(Duration),
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitInfo::Code(code) => write!(f, "exited with status {}", code),
            ExitInfo::Terminated => write!(f, "was terminated by a signal"),
            ExitInfo::Spawn(reason) => write!(f, "could not be started ({})", reason),
            ExitInfo::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
        }
    }
}

/// Failure of an external command, local or remote.
///
/// The display form always contains the captured standard error so it can be
/// returned to callers as the failure cause.
#[derive(Error, Debug, Clone)]
#[error("`{command}` {exit}{}", stderr_suffix(.stderr))]
pub struct ExecutionError {
    /// Human readable rendering of the command
    pub command: String,
    pub exit: ExitInfo,
    pub stderr: String,
}

impl ExecutionError {
    pub fn new(command: impl Into<String>, exit: ExitInfo, stderr: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit,
            stderr: stderr.into(),
        }
    }

    /// Whether the process ran past its timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self.exit, ExitInfo::TimedOut(_))
    }
}

fn stderr_suffix(stderr: &str) -> String {
    match stderr.trim() {
        "" => String::new(),
        trimmed => format!(": {}", trimmed),
    }
}

/// Workspace allocation and release failures
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("cannot create workspace {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot remove workspace {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reverse-proxy configuration failures
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("cannot write staging file {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config transfer failed: {0}")]
    Transfer(#[source] ExecutionError),

    #[error("config install failed: {0}")]
    Install(#[source] ExecutionError),

    #[error("config validation failed: {0}")]
    Validation(#[source] ExecutionError),

    #[error("proxy reload failed: {0}")]
    Reload(#[source] ExecutionError),
}

/// Certificate issuance failures, never fatal to a deployment
#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("automatic certificates are disabled")]
    Disabled,

    #[error("certificate issuance failed: {0}")]
    Issuance(#[source] ExecutionError),
}
