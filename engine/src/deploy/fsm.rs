//! Finite State Machine for a deployment attempt
//!
//! ```text
//! Accepted → Fetching → Building → Syncing → ConfiguringRoute
//!          → ProvisioningCert → Activating → Cleaning → Succeeded
//! ```
//!
//! A failure in any working phase records the failing stage and jumps to
//! `Cleaning`, which then ends in `Failed`. Phases never go backwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Accepted,
    Fetching,
    Building,
    Syncing,
    ConfiguringRoute,
    ProvisioningCert,
    Activating,
    Cleaning,
    Succeeded,
    Failed,
}

impl PipelinePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelinePhase::Succeeded | PipelinePhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Accepted => "accepted",
            PipelinePhase::Fetching => "fetching",
            PipelinePhase::Building => "building",
            PipelinePhase::Syncing => "syncing",
            PipelinePhase::ConfiguringRoute => "configuring_route",
            PipelinePhase::ProvisioningCert => "provisioning_cert",
            PipelinePhase::Activating => "activating",
            PipelinePhase::Cleaning => "cleaning",
            PipelinePhase::Succeeded => "succeeded",
            PipelinePhase::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage blamed for a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Workspace,
    Fetch,
    Build,
    Sync,
    Route,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Workspace => "workspace",
            Stage::Fetch => "fetch",
            Stage::Build => "build",
            Stage::Sync => "sync",
            Stage::Route => "route",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failing stage and human-readable cause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub cause: String,
}

impl StageFailure {
    pub fn new(stage: Stage, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.cause)
    }
}

/// Pipeline event
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Workspace allocated, start fetching
    Start,
    Fetched,
    Built,
    Synced,
    RouteConfigured,
    /// Certificate provisioning finished, whatever its outcome
    CertificateHandled,
    Activated,
    Cleaned,
    Fail(StageFailure),
}

/// Attempt FSM
#[derive(Debug, Clone)]
pub struct PipelineFsm {
    phase: PipelinePhase,
    failure: Option<StageFailure>,
}

impl PipelineFsm {
    /// Create a new FSM in accepted state
    pub fn new() -> Self {
        Self {
            phase: PipelinePhase::Accepted,
            failure: None,
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: PipelineEvent) -> Result<PipelinePhase, String> {
        use PipelineEvent as E;
        use PipelinePhase as P;

        let next = match (self.phase, event) {
            (P::Accepted, E::Start) => P::Fetching,
            (P::Fetching, E::Fetched) => P::Building,
            (P::Building, E::Built) => P::Syncing,
            (P::Syncing, E::Synced) => P::ConfiguringRoute,
            (P::ConfiguringRoute, E::RouteConfigured) => P::ProvisioningCert,
            (P::ProvisioningCert, E::CertificateHandled) => P::Activating,
            (P::Activating, E::Activated) => P::Cleaning,

            (P::Cleaning, E::Cleaned) => {
                if self.failure.is_some() {
                    P::Failed
                } else {
                    P::Succeeded
                }
            }

            // Failures still go through cleaning
            (P::Cleaning, E::Fail(failure)) => {
                self.failure.get_or_insert(failure);
                P::Failed
            }
            (phase, E::Fail(failure)) if !phase.is_terminal() => {
                self.failure = Some(failure);
                P::Cleaning
            }

            (phase, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", phase, event));
            }
        };

        self.phase = next;
        Ok(next)
    }
}

impl Default for PipelineFsm {
    fn default() -> Self {
        Self::new()
    }
}
