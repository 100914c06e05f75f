//! Outbound message envelope.
//!
//! Every message leaving a service is a typed body (serialized as JSON so peers
//! in any language can read it) wrapped in a [`SerializedEvent`] envelope that
//! carries the partition key, the tenant, and the transaction id of the
//! operation that produced it. The envelope itself travels as `bincode`.
//!
//! # Example
//!
//! ```
//! use realm_core::event::{Event, PartitionKey, SerializedEvent};
//! use realm_core::tenant::Tenant;
//! use serde::{Serialize, Deserialize};
//! use uuid::Uuid;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Hit { reactor_id: u32 }
//!
//! impl Event for Hit {
//!     fn event_type(&self) -> &'static str { "HIT" }
//! }
//!
//! let tenant = Tenant::new(Uuid::nil(), "GMS", 83, 1);
//! let event = SerializedEvent::from_event(&Hit { reactor_id: 7 }, PartitionKey::from(7_u32), &tenant, Uuid::nil())
//!     .expect("serializes");
//! assert_eq!(event.key, "7");
//! ```

use crate::tenant::Tenant;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error types for envelope and body encoding.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize an envelope or body.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize an envelope or body.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// A typed message body.
///
/// `event_type` is the discriminator peers switch on (`CREATED`, `STAT_CHANGED`,
/// `CLAMP_HP_MP`, ...). Bodies are serialized as JSON.
pub trait Event: Serialize + Send + Sync {
    /// Stable discriminator for this body.
    fn event_type(&self) -> &'static str;

    /// Serialize the body to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the body cannot be serialized.
    fn to_json(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }
}

/// Stable integer used by the bus to preserve per-key ordering.
///
/// Rendered as decimal text when used as a Kafka message key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey(pub u64);

impl From<u32> for PartitionKey {
    fn from(id: u32) -> Self {
        Self(u64::from(id))
    }
}

impl From<u8> for PartitionKey {
    fn from(id: u8) -> Self {
        Self(u64::from(id))
    }
}

impl From<Uuid> for PartitionKey {
    /// The first eight bytes of the id, big-endian.
    fn from(id: Uuid) -> Self {
        let bytes = id.as_bytes();
        let mut head = [0_u8; 8];
        head.copy_from_slice(&bytes[..8]);
        Self(u64::from_be_bytes(head))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A serialized message ready for the bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// Body discriminator (e.g. `STAT_CHANGED`)
    pub event_type: String,

    /// Partition key as decimal text
    pub key: String,

    /// Tenant the message belongs to
    pub tenant: Tenant,

    /// Logical operation that produced this message
    pub transaction_id: Uuid,

    /// JSON-encoded body
    pub data: Vec<u8>,
}

impl SerializedEvent {
    /// Wrap a typed body.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the body cannot be serialized.
    pub fn from_event<E: Event>(
        event: &E,
        key: PartitionKey,
        tenant: &Tenant,
        transaction_id: Uuid,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            key: key.to_string(),
            tenant: tenant.clone(),
            transaction_id,
            data: event.to_json()?,
        })
    }

    /// Decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        serde_json::from_slice(&self.data)
            .map_err(|e| EventError::DeserializationError(e.to_string()))
    }

    /// Encode the envelope for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Decode an envelope from the wire.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the bytes are not an envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, key: {}, size: {} bytes }}",
            self.event_type,
            self.key,
            self.data.len()
        )
    }
}

/// Per-operation accumulator of outbound messages.
///
/// All messages share one transaction id. The buffer is flushed as a unit by
/// [`Emitter`](crate::emitter::Emitter) when the operation succeeds and dropped
/// otherwise.
#[derive(Debug)]
pub struct MessageBuffer {
    tenant: Tenant,
    transaction_id: Uuid,
    messages: SmallVec<[(String, SerializedEvent); 4]>,
}

impl MessageBuffer {
    /// Empty buffer with a fresh transaction id.
    #[must_use]
    pub fn new(tenant: Tenant) -> Self {
        Self::with_transaction(tenant, Uuid::new_v4())
    }

    /// Empty buffer with a caller-supplied transaction id.
    #[must_use]
    pub fn with_transaction(tenant: Tenant, transaction_id: Uuid) -> Self {
        Self {
            tenant,
            transaction_id,
            messages: SmallVec::new(),
        }
    }

    /// Append a message for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the body cannot be serialized.
    pub fn put<E: Event>(
        &mut self,
        topic: &str,
        key: impl Into<PartitionKey>,
        event: &E,
    ) -> Result<(), EventError> {
        let message =
            SerializedEvent::from_event(event, key.into(), &self.tenant, self.transaction_id)?;
        self.messages.push((topic.to_string(), message));
        Ok(())
    }

    /// Tenant every message is stamped with.
    #[must_use]
    pub const fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Shared transaction id.
    #[must_use]
    pub const fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing has been buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Buffered messages in emission order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, SerializedEvent)> {
        self.messages.iter()
    }

    /// Take the buffered messages, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<(String, SerializedEvent)> {
        self.messages.drain(..).collect()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Created {
        reactor_id: u32,
        state: i8,
    }

    impl Event for Created {
        fn event_type(&self) -> &'static str {
            "CREATED"
        }
    }

    fn tenant() -> Tenant {
        Tenant::new(Uuid::nil(), "GMS", 83, 1)
    }

    #[test]
    fn uuid_key_uses_leading_bytes_big_endian() {
        let id = Uuid::from_bytes([0, 0, 0, 0, 0, 0, 1, 2, 9, 9, 9, 9, 9, 9, 9, 9]);
        assert_eq!(PartitionKey::from(id), PartitionKey(258));
        assert_eq!(PartitionKey::from(id).to_string(), "258");
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn envelope_survives_the_wire() {
        let body = Created {
            reactor_id: 1_000_000_001,
            state: 0,
        };
        let event = SerializedEvent::from_event(&body, 42_u32.into(), &tenant(), Uuid::new_v4())
            .expect("serialize");
        let bytes = event.to_bytes().expect("encode");
        let decoded = SerializedEvent::from_bytes(&bytes).expect("decode");

        assert_eq!(decoded, event);
        assert_eq!(decoded.decode::<Created>().expect("body"), body);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn buffer_preserves_order_and_shares_transaction() {
        let mut buffer = MessageBuffer::new(tenant());
        for state in 0..3 {
            buffer
                .put("EVENT_TOPIC_REACTOR_STATUS", 7_u32, &Created { reactor_id: 7, state })
                .expect("put");
        }
        let transaction = buffer.transaction_id();
        let messages = buffer.drain();

        assert!(buffer.is_empty());
        let states: Vec<i8> = messages
            .iter()
            .map(|(_, m)| m.decode::<Created>().expect("body").state)
            .collect();
        assert_eq!(states, vec![0, 1, 2]);
        assert!(messages.iter().all(|(_, m)| m.transaction_id == transaction));
    }

    #[test]
    fn display_mentions_type_and_key() {
        let event = SerializedEvent {
            event_type: "HIT".to_string(),
            key: "9".to_string(),
            tenant: tenant(),
            transaction_id: Uuid::nil(),
            data: vec![1, 2, 3],
        };
        let display = event.to_string();
        assert!(display.contains("HIT"));
        assert!(display.contains("3 bytes"));
    }
}
