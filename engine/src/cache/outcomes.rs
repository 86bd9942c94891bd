//! Recently finished deployment outcomes

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::models::outcome::DeploymentOutcome;

/// Bounded in-memory cache of terminal outcomes, oldest evicted first
pub struct OutcomeCache {
    entries: RwLock<HashMap<Uuid, DeploymentOutcome>>,
    capacity: usize,
}

impl OutcomeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<DeploymentOutcome> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(id).cloned()
    }

    pub fn insert(&self, outcome: DeploymentOutcome) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if entries.len() >= self.capacity && !entries.contains_key(&outcome.deployment_id) {
            if let Some(oldest) = entries
                .values()
                .min_by_key(|o| o.finished_at)
                .map(|o| o.deployment_id)
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(outcome.deployment_id, outcome);
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
