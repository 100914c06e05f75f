//! Bus consumer loop.
//!
//! One [`Consumer`] per inbound topic. Each message is handed to a
//! [`MessageHandler`]; handler errors are logged by kind and never stop the
//! loop. A failed subscription or an ended stream is retried after a delay
//! until shutdown.

use futures::StreamExt;
use realm_core::RealmError;
use realm_core::event::SerializedEvent;
use realm_core::event_bus::EventBus;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default delay before re-subscribing.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Boxed future returned by [`MessageHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), RealmError>> + Send + 'a>>;

/// Processes messages of one topic.
pub trait MessageHandler: Send + Sync {
    /// Handle one message. The tenant travels in the envelope.
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_>;
}

/// Subscribes to one topic and dispatches to a handler.
pub struct Consumer {
    bus: Arc<dyn EventBus>,
    topic: String,
    handler: Arc<dyn MessageHandler>,
    reconnect_delay: Duration,
}

impl Consumer {
    /// Consumer for `topic`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            bus,
            topic: topic.into(),
            handler,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Override the re-subscribe delay.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Topic this consumer reads.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Consume until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(topic = %self.topic, "Consumer started");

        'outer: while !*shutdown.borrow() {
            let mut stream = match self.bus.subscribe(&[self.topic.as_str()]).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(topic = %self.topic, error = %e, "Subscription failed");
                    if wait_or_shutdown(self.reconnect_delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                },
            };

            loop {
                tokio::select! {
                    next = stream.next() => match next {
                        Some(Ok(event)) => self.dispatch(event).await,
                        Some(Err(e)) => {
                            tracing::warn!(topic = %self.topic, error = %e, "Dropping undecodable message");
                            crate::metrics::record_consumed(&self.topic, "undecodable");
                        },
                        None => {
                            tracing::warn!(topic = %self.topic, "Event stream ended, resubscribing");
                            break;
                        },
                    },
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            break 'outer;
                        }
                    }
                }
            }

            if wait_or_shutdown(self.reconnect_delay, &mut shutdown).await {
                break;
            }
        }

        tracing::info!(topic = %self.topic, "Consumer stopped");
    }

    /// Spawn [`run`](Self::run) on the runtime.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn dispatch(&self, event: SerializedEvent) {
        let event_type = event.event_type.clone();
        let tenant_id = event.tenant.id;
        match self.handler.handle(event).await {
            Ok(()) => crate::metrics::record_consumed(&self.topic, "ok"),
            Err(e) => {
                log_failure(&self.topic, &event_type, tenant_id, &e);
                crate::metrics::record_consumed(&self.topic, "error");
            },
        }
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("topic", &self.topic)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish_non_exhaustive()
    }
}

fn log_failure(topic: &str, event_type: &str, tenant_id: uuid::Uuid, error: &RealmError) {
    match error {
        RealmError::NotFound { .. } | RealmError::Validation(_) | RealmError::InvalidState { .. } => {
            tracing::debug!(topic, event_type, %tenant_id, error = %error, "Message rejected");
        },
        RealmError::PeerUnavailable { .. } | RealmError::Conflict(_) => {
            tracing::warn!(topic, event_type, %tenant_id, error = %error, "Message not applied");
        },
        RealmError::Bus(_) | RealmError::Fatal(_) => {
            tracing::error!(topic, event_type, %tenant_id, error = %error, "Message handling failed");
        },
    }
}

/// Sleep for `delay`; returns `true` if shutdown was requested meanwhile.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => *shutdown.borrow(),
        result = shutdown.changed() => result.is_err() || *shutdown.borrow(),
    }
}
