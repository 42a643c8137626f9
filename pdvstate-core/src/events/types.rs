//! Event type definitions.

use crate::config::AgentConfig;
use pdvstate_sdk::objects::PdvEventPayload;
use std::collections::BTreeMap;

/// A business event observed on this terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdvEvent {
    pub store_id: u32,
    pub terminal_id: u32,
    pub event_type: String,
    /// Named values extracted from the log line (empty for state events).
    pub data: BTreeMap<String, String>,
}

impl PdvEvent {
    /// Build an event stamped with this terminal's identity.
    pub fn new(
        config: &AgentConfig,
        event_type: impl Into<String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        Self {
            store_id: config.store_id,
            terminal_id: config.terminal_id,
            event_type: event_type.into(),
            data,
        }
    }
}

impl From<PdvEvent> for PdvEventPayload {
    fn from(event: PdvEvent) -> Self {
        Self {
            loja_id: event.store_id,
            pdv_id: event.terminal_id,
            event_type: event.event_type,
            data: event.data,
        }
    }
}
