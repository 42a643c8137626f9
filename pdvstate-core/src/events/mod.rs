//! Domain events produced by the watchers.
//!
//! Events are transient: built from a matched line or a state transition,
//! handed to an [`EventSink`](crate::processors::EventSink), then dropped.

pub mod types;

pub use pdvstate_sdk::objects::event_types;
pub use types::PdvEvent;
