//! RuleUpdater processor.
//!
//! The RuleUpdater is responsible for:
//! - Asking the collector for the published rule-set version on a fixed
//!   interval
//! - Downloading and compiling the new rule set when the version differs
//!   from the one in the [`RuleStore`]
//! - Replacing the store's rule set atomically
//!
//! A failed tick is logged and the loop waits for the next one. There is no
//! retry inside a tick and no backoff.

use crate::rules::{RuleSource, RuleStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Default interval between version checks.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Result of a single update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The published version equals the local one.
    Unchanged,
    /// The store now holds `to`.
    Updated { from: String, to: String },
    /// The version check or the download failed; the store is untouched.
    Failed,
}

/// Periodically refreshes the [`RuleStore`] from a [`RuleSource`].
pub struct RuleUpdater {
    source: Arc<dyn RuleSource>,
    store: RuleStore,
    interval: Duration,
}

impl RuleUpdater {
    /// Create a new RuleUpdater.
    ///
    /// # Arguments
    ///
    /// * `source` - Where versions and rule sets come from
    /// * `store` - Store to refresh
    /// * `interval` - Time between checks; the first check happens one full
    ///   interval after [`run()`](RuleUpdater::run) starts
    pub fn new(source: Arc<dyn RuleSource>, store: RuleStore, interval: Duration) -> Self {
        Self {
            source,
            store,
            interval,
        }
    }

    /// Run the RuleUpdater until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "RuleUpdater started");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                // Check for shutdown
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("RuleUpdater received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let _ = self.tick().await;
                }
            }
        }

        info!("RuleUpdater shutdown complete");
    }

    /// Perform one version check and, if needed, one refresh.
    pub async fn tick(&self) -> UpdateOutcome {
        let remote_version = match self.source.current_version().await {
            Ok(version) => version,
            Err(e) => {
                error!(error = %e, "Failed to check published rule version");
                return UpdateOutcome::Failed;
            }
        };

        let local_version = self.store.version().await;
        if remote_version == local_version {
            debug!(version = %local_version, "Rules are up to date");
            return UpdateOutcome::Unchanged;
        }

        info!(
            local = %local_version,
            remote = %remote_version,
            "New rule version published"
        );

        let rule_set = match self.source.fetch().await {
            Ok(rule_set) => rule_set,
            Err(e) => {
                warn!(error = %e, "Failed to download new rules");
                return UpdateOutcome::Failed;
            }
        };

        let to = rule_set.version.clone();
        self.store.replace(rule_set).await;
        info!(version = %to, "Rules updated");

        UpdateOutcome::Updated {
            from: local_version,
            to,
        }
    }
}
