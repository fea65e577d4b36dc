//! Per-dataset mutual exclusion for read-modify-write cycles.
//!
//! Every schema edit and value edit of a dataset reads the stored blobs,
//! recomputes them in memory and writes them back. Two such cycles on the
//! same dataset must never interleave; cycles on different datasets never
//! wait on each other.
//!
//! The registry is process-local. It is created once and shared by every
//! engine of the process; across processes the storage revision check
//! takes over.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;

use crate::error::CoreError;

/// Default time an edit waits for a busy dataset before giving up.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Held for the duration of one read-modify-write; releases on drop.
#[derive(Debug)]
pub struct DatasetGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Registry of one async mutex per dataset key.
#[derive(Debug)]
pub struct DatasetLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    wait: Duration,
}

impl DatasetLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            wait,
        }
    }

    /// Acquire the lock for `key`, waiting at most the configured duration.
    ///
    /// Returns [`CoreError::Conflict`] if another edit of the same dataset
    /// holds the lock for longer than that.
    pub async fn acquire(&self, key: &str) -> Result<DatasetGuard, CoreError> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries referenced only by the registry are idle.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        match tokio::time::timeout(self.wait, mutex.lock_owned()).await {
            Ok(guard) => Ok(DatasetGuard { _guard: guard }),
            Err(_) => {
                tracing::warn!(
                    dataset = %key,
                    wait_ms = self.wait.as_millis() as u64,
                    "Dataset lock wait timed out"
                );
                Err(CoreError::Conflict(format!(
                    "another edit of dataset '{key}' is in progress; retry with a fresh read"
                )))
            }
        }
    }

    /// Number of keys currently tracked (held or awaited).
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|m| Arc::strong_count(m) > 1)
            .count()
    }
}

impl Default for DatasetLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_WAIT)
    }
}
