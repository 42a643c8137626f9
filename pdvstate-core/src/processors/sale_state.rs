//! Sale lifecycle state machine.
//!
//! Tracks whether a sale is open on the terminal by looking for two fixed
//! markers in the sale channel's log. The markers are plain
//! [`SaleTrigger`] values so the matching can be tested and extended on its
//! own.

use crate::events::event_types;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Marker written when the sale-integration identification step completes.
pub const SALE_STARTED_MARKER: &str =
    "IntegracaoServicosVenda: Processo de identificacao dos servicos de integracao finalizado.";

/// Marker written when the change-calculation step finalizes successfully.
pub const SALE_FINISHED_MARKER: &str = "Finalizou a funcao 'trocouresto' retornando '1'";

/// Whether a sale is currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaleState {
    #[default]
    Closed,
    Open,
}

impl std::fmt::Display for SaleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaleState::Closed => write!(f, "closed"),
            SaleState::Open => write!(f, "open"),
        }
    }
}

/// A substring that, when found in a line, moves the machine to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleTrigger {
    pub needle: String,
    pub target: SaleState,
    /// Event emitted when the trigger causes a transition.
    pub event_type: String,
}

impl SaleTrigger {
    pub fn new(needle: impl Into<String>, target: SaleState, event_type: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            target,
            event_type: event_type.into(),
        }
    }

    /// `INICIO_VENDA` on [`SALE_STARTED_MARKER`].
    pub fn sale_started() -> Self {
        Self::new(SALE_STARTED_MARKER, SaleState::Open, event_types::SALE_STARTED)
    }

    /// `FIM_VENDA` on [`SALE_FINISHED_MARKER`].
    pub fn sale_finished() -> Self {
        Self::new(SALE_FINISHED_MARKER, SaleState::Closed, event_types::SALE_FINISHED)
    }

    pub fn matches(&self, line: &str) -> bool {
        line.contains(self.needle.as_str())
    }
}

/// Result of feeding one line to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// No trigger matched; the line should go on to rule matching.
    Ignored,
    /// A trigger matched but the machine was already in its target state.
    Consumed,
    /// A trigger moved the machine; `event_type` must be emitted.
    Transitioned { event_type: String },
}

impl TriggerOutcome {
    /// Whether the line was claimed by a trigger (with or without a
    /// transition).
    pub fn is_consumed(&self) -> bool {
        !matches!(self, TriggerOutcome::Ignored)
    }
}

/// Two-state sale tracker shared by reference with the sale channel's
/// watcher.
#[derive(Debug)]
pub struct SaleStateTracker {
    state: Mutex<SaleState>,
    triggers: Vec<SaleTrigger>,
}

impl SaleStateTracker {
    /// Tracker starting [`SaleState::Closed`] with the given triggers,
    /// evaluated in order.
    pub fn new(triggers: Vec<SaleTrigger>) -> Self {
        Self {
            state: Mutex::new(SaleState::Closed),
            triggers,
        }
    }

    pub async fn state(&self) -> SaleState {
        *self.state.lock().await
    }

    /// Feed one line from the sale channel.
    ///
    /// The read-decide-write step runs under the state lock; the caller
    /// emits the event after the lock is released.
    pub async fn observe(&self, line: &str) -> TriggerOutcome {
        let Some(trigger) = self.triggers.iter().find(|t| t.matches(line)) else {
            return TriggerOutcome::Ignored;
        };

        let mut state = self.state.lock().await;
        debug!(current = %*state, target = %trigger.target, "Sale trigger found");
        if *state == trigger.target {
            return TriggerOutcome::Consumed;
        }

        info!(from = %*state, to = %trigger.target, event_type = %trigger.event_type, "Sale state changed");
        *state = trigger.target;
        TriggerOutcome::Transitioned {
            event_type: trigger.event_type.clone(),
        }
    }
}

impl Default for SaleStateTracker {
    fn default() -> Self {
        Self::new(vec![SaleTrigger::sale_started(), SaleTrigger::sale_finished()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn started_line() -> String {
        format!("10:31:02 [INFO] {SALE_STARTED_MARKER}")
    }

    fn finished_line() -> String {
        format!("10:33:40 [DEBUG] {SALE_FINISHED_MARKER} em 12ms")
    }

    #[tokio::test]
    async fn test_open_then_close() {
        let tracker = SaleStateTracker::default();
        assert_eq!(tracker.state().await, SaleState::Closed);

        assert_eq!(
            tracker.observe(&started_line()).await,
            TriggerOutcome::Transitioned {
                event_type: "INICIO_VENDA".to_string()
            }
        );
        assert_eq!(tracker.state().await, SaleState::Open);

        assert_eq!(
            tracker.observe(&finished_line()).await,
            TriggerOutcome::Transitioned {
                event_type: "FIM_VENDA".to_string()
            }
        );
        assert_eq!(tracker.state().await, SaleState::Closed);
    }

    #[tokio::test]
    async fn test_repeated_start_emits_once() {
        let tracker = SaleStateTracker::default();

        let outcomes = [
            tracker.observe(&started_line()).await,
            tracker.observe(&started_line()).await,
            tracker.observe(&started_line()).await,
        ];

        let transitions = outcomes
            .iter()
            .filter(|o| matches!(o, TriggerOutcome::Transitioned { .. }))
            .count();
        assert_eq!(transitions, 1);
        assert_eq!(outcomes[1], TriggerOutcome::Consumed);
        assert_eq!(outcomes[2], TriggerOutcome::Consumed);
    }

    #[tokio::test]
    async fn test_finish_while_closed_is_consumed_without_transition() {
        let tracker = SaleStateTracker::default();

        let outcome = tracker.observe(&finished_line()).await;

        assert_eq!(outcome, TriggerOutcome::Consumed);
        assert!(outcome.is_consumed());
        assert_eq!(tracker.state().await, SaleState::Closed);
    }

    #[tokio::test]
    async fn test_unrelated_line_is_ignored() {
        let tracker = SaleStateTracker::default();

        let outcome = tracker.observe("Finalizou a funcao 'trocouresto' retornando '0'").await;

        assert_eq!(outcome, TriggerOutcome::Ignored);
        assert!(!outcome.is_consumed());
    }

    #[tokio::test]
    async fn test_custom_triggers() {
        let tracker = SaleStateTracker::new(vec![
            SaleTrigger::new("CUPOM ABERTO", SaleState::Open, "ABRIU"),
            SaleTrigger::new("CUPOM FECHADO", SaleState::Closed, "FECHOU"),
        ]);

        assert_eq!(
            tracker.observe("... CUPOM ABERTO ...").await,
            TriggerOutcome::Transitioned {
                event_type: "ABRIU".to_string()
            }
        );
        assert_eq!(
            tracker.observe(&started_line()).await,
            TriggerOutcome::Ignored
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_transition_once() {
        let tracker = Arc::new(SaleStateTracker::default());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                tracker.observe(&started_line()).await
            }));
        }

        let mut transitions = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), TriggerOutcome::Transitioned { .. }) {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 1);
    }
}
