//! Kafka-compatible event bus for realm services.
//!
//! Implements [`EventBus`] from `realm-core` on top of rdkafka. Works with
//! Redpanda, Apache Kafka or any broker speaking the Kafka protocol.
//!
//! # Wire format
//!
//! ```text
//!   Kafka record
//!   ├── key:     SerializedEvent::key  (decimal partition key)
//!   └── payload: bincode(SerializedEvent)
//!                ├── event_type
//!                ├── tenant (id, region, major, minor)
//!                ├── transaction_id
//!                └── data (JSON body)
//! ```
//!
//! The record key is the domain partition key (character id, reactor id,
//! party id, map id), so all messages about one entity land on one partition
//! and are consumed in publish order.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Offsets are committed after the message reaches the subscriber's channel
//! - A crash before commit redelivers the message
//! - Handlers must tolerate duplicates
//!
//! # Example
//!
//! ```no_run
//! use realm_redpanda::RedpandaEventBus;
//! use realm_core::event_bus::EventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("realm-reactors")
//!     .build()?;
//!
//! let mut stream = bus.subscribe(&["COMMAND_TOPIC_REACTOR"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(event) => println!("Received: {}", event.event_type),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use realm_core::event::SerializedEvent;
use realm_core::event_bus::{EventBus, EventBusError, EventStream};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_BUFFER_SIZE: usize = 1000;
const DEFAULT_OFFSET_RESET: &str = "latest";

/// Kafka-backed event bus.
///
/// One producer is shared by every publish. Each `subscribe` call creates its
/// own consumer, owned by a background task that forwards decoded messages
/// into a bounded channel.
///
/// # Example
///
/// ```no_run
/// use realm_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = RedpandaEventBus::builder()
///     .brokers("broker-1:9092,broker-2:9092")
///     .producer_acks("all")
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Broker list this bus connects to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn group_for(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            let mut sorted = topics.to_vec();
            sorted.sort();
            format!("realm-{}", sorted.join("-"))
        })
    }
}

impl std::fmt::Debug for RedpandaEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedpandaEventBus")
            .field("brokers", &self.brokers)
            .field("consumer_group", &self.consumer_group)
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Debug, Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Comma-separated broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: `"0"`, `"1"` (default) or `"all"`.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: `"none"` (default), `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group shared by every instance of a service.
    ///
    /// When unset the group is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Messages buffered between the Kafka consumer and the subscriber.
    ///
    /// Zero is ignored and leaves the default of 1000.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        if buffer_size > 0 {
            self.buffer_size = Some(buffer_size);
        }
        self
    }

    /// Where new consumer groups start: `"earliest"` or `"latest"` (default).
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.as_deref().unwrap_or("1");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| DEFAULT_OFFSET_RESET.to_string());

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "Event bus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let payload = event.to_bytes().map_err(|e| EventBusError::PublishFailed {
                topic: topic.clone(),
                reason: e.to_string(),
            })?;

            let record = FutureRecord::to(&topic).payload(&payload).key(event.key.as_bytes());

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        key = %event.key,
                        event_type = %event.event_type,
                        tenant_id = %event.tenant.id,
                        "Event published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        key = %event.key,
                        event_type = %event.event_type,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let group = self.group_for(&topics);
        let brokers = self.brokers.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %group,
                buffer_size,
                auto_offset_reset = %auto_offset_reset,
                "Subscribed to topics"
            );

            let (tx, mut rx) = tokio::sync::mpsc::channel(buffer_size);

            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();
                while let Some(received) = stream.next().await {
                    match received {
                        Ok(message) => {
                            let decoded = decode(&message);
                            // Receiver gone: exit without committing so the
                            // message is redelivered to the next subscriber.
                            if tx.send(decoded).await.is_err() {
                                break;
                            }
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to commit offset (message may be redelivered)"
                                );
                            }
                        },
                        Err(e) => {
                            let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        },
                    }
                }
                tracing::debug!("Consumer task exiting");
            });

            let events = async_stream::stream! {
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(events) as EventStream)
        })
    }
}

fn decode(message: &BorrowedMessage<'_>) -> Result<SerializedEvent, EventBusError> {
    let payload = message
        .payload()
        .ok_or_else(|| EventBusError::DeserializationFailed("Message has no payload".to_string()))?;
    let event = decode_payload(payload)?;
    tracing::trace!(
        topic = message.topic(),
        partition = message.partition(),
        offset = message.offset(),
        event_type = %event.event_type,
        "Received event"
    );
    Ok(event)
}

fn decode_payload(payload: &[u8]) -> Result<SerializedEvent, EventBusError> {
    SerializedEvent::from_bytes(payload).map_err(|e| EventBusError::DeserializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_core::Tenant;
    use uuid::Uuid;

    #[test]
    fn bus_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_requires_brokers() {
        assert!(matches!(
            RedpandaEventBus::builder().build(),
            Err(EventBusError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn zero_buffer_keeps_default() {
        let builder = RedpandaEventBus::builder().buffer_size(0);
        assert_eq!(builder.buffer_size, None);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn derived_group_is_order_independent() {
        let bus = RedpandaEventBus::new("localhost:9092").expect("producer config is lazy");
        let a = bus.group_for(&["b".to_string(), "a".to_string()]);
        let b = bus.group_for(&["a".to_string(), "b".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a, "realm-a-b");
    }

    #[test]
    fn garbage_payload_is_a_deserialization_error() {
        assert!(matches!(
            decode_payload(&[0xff, 0x01]),
            Err(EventBusError::DeserializationFailed(_))
        ));
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn payload_round_trips_envelope() {
        let event = SerializedEvent {
            event_type: "CREATED".to_string(),
            key: "1000000001".to_string(),
            tenant: Tenant::new(Uuid::nil(), "GMS", 83, 1),
            transaction_id: Uuid::new_v4(),
            data: br#"{"id":1000000001}"#.to_vec(),
        };
        let bytes = event.to_bytes().expect("encode");
        let decoded = decode_payload(&bytes).expect("decode");
        assert_eq!(decoded.key, event.key);
        assert_eq!(decoded.tenant, event.tenant);
    }
}
