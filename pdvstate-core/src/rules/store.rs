//! Shared rule store with atomic replace and change notification.
//!
//! `RuleStore` keeps the active [`RuleSet`] behind `RwLock<Arc<RuleSet>>`.
//! Readers clone the `Arc` under the read lock and match against that
//! snapshot without holding any lock, so a slow regex never blocks an update
//! and an update never blocks readers beyond the pointer clone.

use super::RuleSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, watch};

/// The process-wide, hot-swappable rule set.
///
/// Cloning a `RuleStore` yields another handle to the same store.
pub struct RuleStore {
    inner: Arc<RuleStoreInner>,
}

struct RuleStoreInner {
    current: RwLock<Arc<RuleSet>>,
    generation: AtomicU64,
    generation_tx: watch::Sender<u64>,
}

/// Receives notifications when a [`RuleStore`] is replaced.
pub struct RuleStoreWatcher {
    generation_rx: watch::Receiver<u64>,
}

// -- RuleStore ----------------------------------------------------------

impl RuleStore {
    /// Create a store holding `initial`.
    pub fn new(initial: RuleSet) -> Self {
        let (generation_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(RuleStoreInner {
                current: RwLock::new(Arc::new(initial)),
                generation: AtomicU64::new(0),
                generation_tx,
            }),
        }
    }

    /// Snapshot of the active rule set.
    ///
    /// The snapshot stays valid (and unchanged) after a concurrent
    /// [`replace`](RuleStore::replace).
    pub async fn get(&self) -> Arc<RuleSet> {
        Arc::clone(&*self.inner.current.read().await)
    }

    /// Version string of the active rule set.
    pub async fn version(&self) -> String {
        self.inner.current.read().await.version.clone()
    }

    /// Install `rules` as the active rule set and notify all watchers.
    pub async fn replace(&self, rules: RuleSet) {
        let rules = Arc::new(rules);
        let mut guard = self.inner.current.write().await;
        *guard = rules;
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        // Release the write lock before waking subscribers so they can read.
        drop(guard);
        self.inner.generation_tx.send_replace(generation);
    }

    /// Number of replaces performed since creation.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Relaxed)
    }

    /// Subscribe to replace notifications.
    pub fn subscribe(&self) -> RuleStoreWatcher {
        RuleStoreWatcher {
            generation_rx: self.inner.generation_tx.subscribe(),
        }
    }
}

impl Clone for RuleStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// -- RuleStoreWatcher ---------------------------------------------------

impl RuleStoreWatcher {
    /// Wait until the store is replaced.
    ///
    /// Returns `Err` if every [`RuleStore`] handle has been dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.generation_rx.changed().await
    }
}
