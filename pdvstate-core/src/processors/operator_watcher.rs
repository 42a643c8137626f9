//! OperatorWatcher processor.
//!
//! The point-of-sale application drops an `OPER_<id>.pdv` marker in its data
//! directory while an operator is logged in. The OperatorWatcher is
//! responsible for:
//! - Scanning the marker directory on a fixed interval
//! - Comparing the logged-in operator with the previous observation
//! - Emitting `UPDATE_OPERADOR` on login or change and `OPERADOR_LOGOFF` on
//!   logout
//!
//! Nothing is emitted while the observation is unchanged.

use crate::events::event_types;
use crate::processors::EventSink;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const MARKER_PREFIX: &str = "OPER_";
const MARKER_SUFFIX: &str = ".pdv";

/// Settings for [`OperatorWatcher`].
#[derive(Debug, Clone)]
pub struct OperatorWatcherConfig {
    /// Directory holding the `OPER_<id>.pdv` markers.
    pub marker_dir: PathBuf,
    /// Id whose marker is always present and never means a login.
    pub reserved_id: String,
    /// Markers older than this are stale.
    pub max_age: Duration,
    /// Time between scans.
    pub interval: Duration,
}

impl Default for OperatorWatcherConfig {
    fn default() -> Self {
        Self {
            marker_dir: PathBuf::from("/posnet"),
            reserved_id: "001000".to_string(),
            max_age: Duration::from_secs(1440 * 60),
            interval: Duration::from_secs(15),
        }
    }
}

/// An edge in the operator observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorChange {
    LoggedIn(String),
    LoggedOff,
}

/// Watches operator markers and reports login/logoff edges.
pub struct OperatorWatcher {
    config: OperatorWatcherConfig,
    sink: Arc<dyn EventSink>,
    last_seen: Option<String>,
}

impl OperatorWatcher {
    pub fn new(config: OperatorWatcherConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            sink,
            last_seen: None,
        }
    }

    /// Operator id from the previous poll.
    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    /// Run the OperatorWatcher until shutdown is signaled.
    ///
    /// The first scan happens immediately.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            marker_dir = %self.config.marker_dir.display(),
            interval = ?self.config.interval,
            "OperatorWatcher started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                // Check for shutdown
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("OperatorWatcher received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.poll().await;
                }
            }
        }

        info!("OperatorWatcher shutdown complete");
    }

    /// Scan once, emit an event if the operator changed and return the
    /// change.
    pub async fn poll(&mut self) -> Option<OperatorChange> {
        let current = self.current_operator().await;
        if current == self.last_seen {
            return None;
        }

        let change = match &current {
            Some(id) => {
                info!(operator_id = %id, "Operator logged in");
                let data = BTreeMap::from([("operador_id".to_string(), id.clone())]);
                self.sink.send(event_types::OPERATOR_LOGIN, data).await;
                OperatorChange::LoggedIn(id.clone())
            }
            None => {
                info!("Operator logged off");
                self.sink
                    .send(event_types::OPERATOR_LOGOFF, BTreeMap::new())
                    .await;
                OperatorChange::LoggedOff
            }
        };

        self.last_seen = current;
        Some(change)
    }

    async fn current_operator(&self) -> Option<String> {
        let config = self.config.clone();
        let scan = tokio::task::spawn_blocking(move || {
            scan_markers(&config, SystemTime::now())
        })
        .await;

        match scan {
            Ok(Ok(operator)) => operator,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to list operator markers");
                None
            }
            Err(e) => {
                warn!(error = %e, "Operator marker scan aborted");
                None
            }
        }
    }
}

/// Operator id encoded in a marker file name, if `path` is one.
fn marker_id(path: &Path) -> Option<&str> {
    let id = path
        .file_name()?
        .to_str()?
        .strip_prefix(MARKER_PREFIX)?
        .strip_suffix(MARKER_SUFFIX)?;
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
}

/// Logged-in operator according to the markers under `config.marker_dir`.
///
/// When several markers qualify the most recently modified one wins; ties go
/// to the smallest id.
fn scan_markers(config: &OperatorWatcherConfig, now: SystemTime) -> io::Result<Option<String>> {
    let dir = config.marker_dir.to_string_lossy();
    let pattern = format!(
        "{}/{MARKER_PREFIX}*{MARKER_SUFFIX}",
        glob::Pattern::escape(dir.trim_end_matches('/'))
    );
    let entries =
        glob::glob(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut candidates: Vec<(SystemTime, String)> = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                debug!(error = %e, "Skipping unreadable marker entry");
                continue;
            }
        };
        let Some(id) = marker_id(&path) else {
            continue;
        };
        if id == config.reserved_id {
            continue;
        }
        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping marker without mtime");
                continue;
            }
        };
        // A timestamp in the future counts as fresh.
        let age = now.duration_since(modified).unwrap_or_default();
        if age > config.max_age {
            continue;
        }
        candidates.push((modified, id.to_string()));
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    if candidates.len() > 1 {
        let ids: Vec<&str> = candidates.iter().map(|(_, id)| id.as_str()).collect();
        warn!(candidates = ?ids, chosen = ids[0], "Several operator markers are active");
    }

    Ok(candidates.into_iter().next().map(|(_, id)| id))
}
