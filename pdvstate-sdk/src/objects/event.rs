//! Event payload posted to `POST /pdv/event`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event types emitted by the agent itself, independent of the rule set.
pub mod event_types {
    /// A sale was opened on the terminal.
    pub const SALE_STARTED: &str = "INICIO_VENDA";
    /// The open sale was finalized.
    pub const SALE_FINISHED: &str = "FIM_VENDA";
    /// An operator signed into the terminal.
    pub const OPERATOR_LOGIN: &str = "UPDATE_OPERADOR";
    /// The operator signed out.
    pub const OPERATOR_LOGOFF: &str = "OPERADOR_LOGOFF";
}

/// Wire form of a terminal event.
///
/// `data` is always serialized as a JSON object, even when empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdvEventPayload {
    pub loja_id: u32,
    pub pdv_id: u32,
    pub event_type: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}
