//! Event subscriber port
//!
//! A subscriber receives [`StreamEvent`]s from the
//! [`EventBus`](crate::event_bus::EventBus). Transport adapters (websocket,
//! console, JSONL transcript) implement this trait.

use async_trait::async_trait;
use crew_domain::StreamEvent;
use thiserror::Error;

/// Failure to deliver one event to one subscriber
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The subscriber is gone for good; the bus drops it
    #[error("Subscriber closed")]
    Closed,

    /// Delivery of this event failed; the subscriber stays registered
    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Receiver of progress events
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn on_event(&self, event: &StreamEvent) -> Result<(), DeliveryError>;
}
