//! EventDispatcher processor.
//!
//! The EventDispatcher is responsible for:
//! - Stamping an event type and payload with the terminal identity
//! - Serializing it and sending `POST /pdv/event` to the collector
//! - Logging the response status
//!
//! Delivery is best effort: a transport error or non-2xx response is logged
//! and the event is dropped. There is no retry and no local queue. The
//! [`EventSink`] trait is the seam where a stricter policy could be plugged
//! in without touching the watchers.

use crate::config::AgentConfig;
use crate::events::PdvEvent;
use async_trait::async_trait;
use kanau::processor::Processor;
use pdvstate_sdk::client::{ClientError, CollectorClient};
use pdvstate_sdk::objects::PdvEventPayload;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur during event delivery.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Transport failure or non-2xx response from the collector.
    #[error("event delivery failed: {0}")]
    Client(#[from] ClientError),
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The collector accepted the event.
    Delivered { status: u16 },
    /// The event was dropped.
    Failed,
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

/// Destination for extracted events.
///
/// `send` completes once the event has been delivered or given up on; it
/// never fails from the caller's point of view.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event_type: &str, data: BTreeMap<String, String>) -> DispatchOutcome;
}

/// Request to submit one event to the collector.
#[derive(Debug, Clone)]
pub struct SubmitEvent(pub PdvEvent);

/// Sends events to the collector over HTTP.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    client: CollectorClient,
    config: Arc<AgentConfig>,
}

impl EventDispatcher {
    /// Create a new EventDispatcher.
    ///
    /// # Arguments
    ///
    /// * `client` - Collector client (its `reqwest::Client` carries timeouts
    ///   and TLS settings)
    /// * `config` - Terminal identity stamped on every event
    pub fn new(client: CollectorClient, config: Arc<AgentConfig>) -> Self {
        Self { client, config }
    }
}

impl Processor<SubmitEvent> for EventDispatcher {
    type Output = StatusCode;
    type Error = DispatchError;
    #[tracing::instrument(skip_all, err, name = "HTTP:SubmitEvent")]
    async fn process(&self, request: SubmitEvent) -> Result<StatusCode, DispatchError> {
        let payload = PdvEventPayload::from(request.0);
        let status = self.client.post_event(&payload).await?;
        Ok(status)
    }
}

#[async_trait]
impl EventSink for EventDispatcher {
    async fn send(&self, event_type: &str, data: BTreeMap<String, String>) -> DispatchOutcome {
        let event = PdvEvent::new(&self.config, event_type, data);

        match self.process(SubmitEvent(event)).await {
            Ok(status) => {
                info!(event_type, status = %status, "Event sent");
                DispatchOutcome::Delivered {
                    status: status.as_u16(),
                }
            }
            Err(e) => {
                warn!(event_type, error = %e, "Event dropped");
                DispatchOutcome::Failed
            }
        }
    }
}
