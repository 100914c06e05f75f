//! Message bus abstraction.
//!
//! Services publish status events and commands to named topics and consume
//! commands and peer status events from other topics. Delivery is
//! at-least-once and ordered only within a partition key.
//!
//! ```text
//!   command topic ──► consumer loop ──► processor ──► registry
//!                                           │
//!                                           ▼
//!                                     MessageBuffer
//!                                           │ flush on success
//!                                           ▼
//!                                 EventBus::publish(topic, event)
//! ```
//!
//! # Implementations
//!
//! - `RecordingEventBus` in `realm-testing` for tests
//! - `RedpandaEventBus` in `realm-redpanda` for production

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to decode a received message
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of received messages.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventBusError>> + Send>>;

/// Publish/subscribe over named topics.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the bus can be held as
/// `Arc<dyn EventBus>` by emitters and consumers.
pub trait EventBus: Send + Sync {
    /// Publish a message to a topic.
    ///
    /// Messages sharing `event.key` must be delivered in publish order.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
