//! LogWatcher processor.
//!
//! One LogWatcher runs per log channel. It is responsible for:
//! - Tailing the channel's daily log file from its end
//! - Feeding sale-channel lines to the shared [`SaleStateTracker`]
//! - Matching every other line against the channel's current rules
//! - Dispatching the resulting events in file order
//!
//! Dispatch is awaited inline, so a slow collector only delays this channel.

use crate::processors::{EventSink, SaleStateTracker, TriggerOutcome};
use crate::rules::RuleStore;
use crate::utils::LogTail;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Channel whose lines drive the sale state machine.
pub const SALE_CHANNEL: &str = "logpdv";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LogWatcherError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a single line was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// The sale state changed and this event was emitted.
    SaleTransition(String),
    /// A sale trigger matched without changing the state.
    SaleTriggerConsumed,
    /// A rule matched and this event was emitted.
    RuleMatched(String),
    Unmatched,
}

pub struct LogWatcher {
    channel: String,
    path: PathBuf,
    rule_store: RuleStore,
    sale_tracker: Option<Arc<SaleStateTracker>>,
    sink: Arc<dyn EventSink>,
    poll_interval: Duration,
}

impl LogWatcher {
    /// Create a new LogWatcher.
    ///
    /// # Arguments
    ///
    /// * `channel` - Channel name, used to select rules
    /// * `path` - Log file to tail
    /// * `rule_store` - Source of the current rule set
    /// * `sink` - Where extracted events go
    pub fn new(
        channel: impl Into<String>,
        path: impl Into<PathBuf>,
        rule_store: RuleStore,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            channel: channel.into(),
            path: path.into(),
            rule_store,
            sale_tracker: None,
            sink,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Route lines through `tracker` before rule matching.
    pub fn with_sale_tracker(mut self, tracker: Arc<SaleStateTracker>) -> Self {
        self.sale_tracker = Some(tracker);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the LogWatcher until shutdown is signaled.
    ///
    /// Returns an error only when the log file cannot be opened at startup.
    /// Read failures afterwards are logged and retried on the next poll.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), LogWatcherError> {
        let mut tail = LogTail::open_at_end(&self.path)
            .await
            .map_err(|source| LogWatcherError::Open {
                path: self.path.clone(),
                source,
            })?;

        info!(
            channel = %self.channel,
            path = %self.path.display(),
            offset = tail.offset(),
            "LogWatcher started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                // Check for shutdown
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(channel = %self.channel, "LogWatcher received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match tail.read_new_lines().await {
                        Ok(lines) => {
                            for line in lines {
                                self.process_line(&line).await;
                            }
                        }
                        Err(e) => {
                            warn!(
                                channel = %self.channel,
                                path = %self.path.display(),
                                error = %e,
                                "Failed to read log file, retrying"
                            );
                        }
                    }
                }
            }
        }

        info!(channel = %self.channel, "LogWatcher shutdown complete");
        Ok(())
    }

    /// Handle one line and dispatch whatever event it produces.
    pub async fn process_line(&self, line: &str) -> LineOutcome {
        debug!(channel = %self.channel, %line, "Log line");

        if let Some(tracker) = &self.sale_tracker {
            match tracker.observe(line).await {
                TriggerOutcome::Transitioned { event_type } => {
                    self.sink.send(&event_type, BTreeMap::new()).await;
                    return LineOutcome::SaleTransition(event_type);
                }
                TriggerOutcome::Consumed => return LineOutcome::SaleTriggerConsumed,
                TriggerOutcome::Ignored => {}
            }
        }

        let rules = self.rule_store.get().await;
        let Some(found) = rules.first_match(&self.channel, line) else {
            return LineOutcome::Unmatched;
        };

        debug!(
            channel = %self.channel,
            rule = found.index,
            event_type = %found.event_type,
            "Rule matched"
        );
        self.sink.send(&found.event_type, found.data).await;
        LineOutcome::RuleMatched(found.event_type)
    }
}
