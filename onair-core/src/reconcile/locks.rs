use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ReconcileError, ReconcileResult};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// One mutex per envelope label. Applies against the same window never
/// overlap; a second caller is refused instead of queued. Entries are dropped
/// once no guard or acquirer references them.
#[derive(Debug, Clone, Default)]
pub struct WindowLocks {
    inner: Arc<LockMap>,
}

/// Proof that the holder is the only apply running for `label`.
#[derive(Debug)]
pub struct WindowGuard {
    label: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl WindowGuard {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for WindowGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The map's own Arc is the only one left when nobody else is waiting.
        self.locks
            .remove_if(&self.label, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl WindowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, label: &str) -> ReconcileResult<WindowGuard> {
        let lock = self
            .inner
            .entry(label.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.try_lock_owned().map_err(|_| ReconcileError::InFlight {
            label: label.to_string(),
        })?;
        Ok(WindowGuard {
            label: label.to_string(),
            guard: Some(guard),
            locks: Arc::clone(&self.inner),
        })
    }

    pub fn is_held(&self, label: &str) -> bool {
        self.inner
            .get(label)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of windows with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
