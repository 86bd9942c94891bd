//! Attempt phase tracking

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use openapi_server::models::TlsStatus;
use tokio::sync::watch;
use uuid::Uuid;

use crate::cache::outcomes::OutcomeCache;
use crate::deploy::fsm::{PipelinePhase, StageFailure};
use crate::models::attempt::DeploymentAttempt;
use crate::models::outcome::DeploymentOutcome;

/// Point-in-time view of an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptSnapshot {
    pub id: Uuid,
    pub domain: String,
    pub phase: PipelinePhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure: Option<StageFailure>,
    pub tls_status: Option<TlsStatus>,
}

impl AttemptSnapshot {
    pub fn in_progress(&self) -> bool {
        !self.phase.is_terminal()
    }
}

impl From<&DeploymentOutcome> for AttemptSnapshot {
    fn from(outcome: &DeploymentOutcome) -> Self {
        Self {
            id: outcome.deployment_id,
            domain: outcome.request.domain.clone(),
            phase: outcome.phase,
            started_at: outcome.started_at,
            finished_at: Some(outcome.finished_at),
            failure: outcome.failure.clone(),
            tls_status: outcome.tls_status(),
        }
    }
}

/// Tracks in-flight attempts and remembers recently finished ones.
///
/// The in-flight record of an attempt is dropped as soon as its outcome is
/// recorded; only the bounded outcome cache keeps terminal results.
pub struct AttemptTracker {
    in_flight: RwLock<HashMap<Uuid, AttemptSnapshot>>,
    recent: OutcomeCache,
    count: watch::Sender<usize>,
}

impl AttemptTracker {
    pub fn new(recent_capacity: usize) -> Self {
        let (count, _) = watch::channel(0);
        Self {
            in_flight: RwLock::new(HashMap::new()),
            recent: OutcomeCache::new(recent_capacity),
            count,
        }
    }

    /// Start tracking an accepted attempt
    pub fn register(&self, attempt: &DeploymentAttempt) {
        let mut in_flight = self.in_flight.write().unwrap_or_else(|e| e.into_inner());
        in_flight.insert(
            attempt.id,
            AttemptSnapshot {
                id: attempt.id,
                domain: attempt.request.domain.clone(),
                phase: attempt.phase(),
                started_at: attempt.started_at,
                finished_at: None,
                failure: None,
                tls_status: None,
            },
        );
        self.count.send_replace(in_flight.len());
    }

    /// Publish the current phase of an in-flight attempt
    pub fn set_phase(&self, id: &Uuid, phase: PipelinePhase) {
        let mut in_flight = self.in_flight.write().unwrap_or_else(|e| e.into_inner());
        if let Some(snapshot) = in_flight.get_mut(id) {
            snapshot.phase = phase;
        }
    }

    /// Record a terminal outcome and drop the in-flight record
    pub fn finish(&self, outcome: &DeploymentOutcome) {
        self.recent.insert(outcome.clone());
        let mut in_flight = self.in_flight.write().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&outcome.deployment_id);
        self.count.send_replace(in_flight.len());
    }

    /// Current view of an attempt, in-flight or recently finished
    pub fn snapshot(&self, id: &Uuid) -> Option<AttemptSnapshot> {
        {
            let in_flight = self.in_flight.read().unwrap_or_else(|e| e.into_inner());
            if let Some(snapshot) = in_flight.get(id) {
                return Some(snapshot.clone());
            }
        }
        self.recent.get(id).as_ref().map(AttemptSnapshot::from)
    }

    /// Terminal outcome of a recently finished attempt
    pub fn outcome(&self, id: &Uuid) -> Option<DeploymentOutcome> {
        self.recent.get(id)
    }

    /// Attempts that have not reached a terminal phase
    pub fn in_flight(&self) -> Vec<AttemptSnapshot> {
        let in_flight = self.in_flight.read().unwrap_or_else(|e| e.into_inner());
        let mut snapshots: Vec<_> = in_flight.values().cloned().collect();
        snapshots.sort_by_key(|s| s.started_at);
        snapshots
    }

    pub fn in_flight_count(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolve once no attempt is in flight
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}
