//! Request and response bodies exchanged with the collector.

pub mod event;
pub mod rules;

pub use event::{PdvEventPayload, event_types};
pub use rules::{RuleEntry, RulesDocument};
