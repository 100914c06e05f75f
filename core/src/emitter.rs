//! Buffered, per-operation event delivery.

use crate::error::{RealmError, RealmResult};
use crate::event::MessageBuffer;
use crate::event_bus::EventBus;
use crate::tenant::Tenant;
use std::sync::Arc;

/// Runs an operation against a fresh [`MessageBuffer`] and publishes the
/// buffered messages in emission order once the operation succeeds.
///
/// A failed operation publishes nothing. A publish failure stops the flush at
/// the failing message so later messages never overtake it.
#[derive(Clone)]
pub struct Emitter {
    bus: Arc<dyn EventBus>,
}

impl Emitter {
    /// Create an emitter over a bus.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Underlying bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Run a synchronous operation and flush its buffer on success.
    ///
    /// # Errors
    ///
    /// Returns the operation's error (nothing is published), or
    /// [`RealmError::Bus`] if a publish fails.
    pub async fn emit<T, F>(&self, tenant: &Tenant, operation: F) -> RealmResult<T>
    where
        F: FnOnce(&mut MessageBuffer) -> RealmResult<T>,
    {
        let mut buffer = MessageBuffer::new(tenant.clone());
        let value = operation(&mut buffer)?;
        self.flush(buffer).await?;
        Ok(value)
    }

    /// Publish every buffered message in order.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::Bus`] on the first failed publish.
    pub async fn flush(&self, mut buffer: MessageBuffer) -> RealmResult<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let transaction_id = buffer.transaction_id();
        for (topic, message) in buffer.drain() {
            if let Err(e) = self.bus.publish(&topic, &message).await {
                tracing::error!(
                    topic = %topic,
                    event_type = %message.event_type,
                    transaction_id = %transaction_id,
                    error = %e,
                    "Failed to publish message"
                );
                return Err(RealmError::Bus(e));
            }
            metrics::counter!("realm.events.published", "topic" => topic.clone()).increment(1);
            tracing::trace!(topic = %topic, event_type = %message.event_type, key = %message.key, "Published");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter").finish_non_exhaustive()
    }
}
