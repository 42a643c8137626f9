//! Long-running processors of the agent.
//!
//! - `LogWatcher`: Tails one channel's log, emits sale and rule events
//! - `SaleStateTracker`: Shared open/closed sale state for the sale channel
//! - `OperatorWatcher`: Polls operator marker files, emits login/logoff events
//! - `RuleUpdater`: Polls the collector and swaps the rule set on new versions
//! - `EventDispatcher`: Receives events from all of the above, delivers them

pub mod event_dispatcher;
pub mod log_watcher;
pub mod operator_watcher;
pub mod rule_updater;
pub mod sale_state;

pub use event_dispatcher::{DispatchError, DispatchOutcome, EventDispatcher, EventSink, SubmitEvent};
pub use log_watcher::{LineOutcome, LogWatcher, LogWatcherError, SALE_CHANNEL};
pub use operator_watcher::{OperatorChange, OperatorWatcher, OperatorWatcherConfig};
pub use rule_updater::{RuleUpdater, UpdateOutcome, DEFAULT_UPDATE_INTERVAL};
pub use sale_state::{SaleState, SaleStateTracker, SaleTrigger, TriggerOutcome};

#[cfg(test)]
pub(crate) mod testing {
    use super::{DispatchOutcome, EventSink};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Sink that keeps every event in memory.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<(String, BTreeMap<String, String>)> {
            self.events.lock().unwrap().clone()
        }

        pub fn event_types(&self) -> Vec<String> {
            self.events().into_iter().map(|(t, _)| t).collect()
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, event_type: &str, data: BTreeMap<String, String>) -> DispatchOutcome {
            self.events
                .lock()
                .unwrap()
                .push((event_type.to_string(), data));
            DispatchOutcome::Delivered { status: 200 }
        }
    }
}
