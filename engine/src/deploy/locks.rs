//! Per-domain exclusive locks

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializes attempts that target the same domain.
///
/// Entries are created on demand and pruned once no attempt holds or waits
/// for them.
#[derive(Default)]
pub struct DomainLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the lifetime of one attempt
pub struct DomainGuard {
    domain: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DomainLocks>,
}

impl DomainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a domain
    pub async fn acquire(self: &Arc<Self>, domain: &str) -> DomainGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        DomainGuard {
            domain: domain.to_string(),
            guard: Some(guard),
            locks: self.clone(),
        }
    }

    /// Number of domains with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for DomainGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map holds the entry: nobody is waiting
        if locks
            .get(&self.domain)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.domain);
        }
    }
}
