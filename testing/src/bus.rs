//! In-memory event bus that records every publish.
//!
//! Publishes are appended to a log and broadcast to live subscribers of the
//! same topic, so a consumer loop can be driven end to end in one process.

#![allow(clippy::missing_panics_doc)]

use async_stream::stream;
use realm_core::emitter::Emitter;
use realm_core::event::SerializedEvent;
use realm_core::event_bus::{EventBus, EventBusError, EventStream};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

const SUBSCRIBER_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Inner {
    log: Mutex<Vec<(String, SerializedEvent)>>,
    live: broadcast::Sender<(String, SerializedEvent)>,
    fail_publishes: AtomicBool,
    failing_topics: Mutex<Vec<String>>,
    fail_subscribes: AtomicBool,
}

/// Recording bus for tests.
///
/// Cheap to clone; clones share the same log.
#[derive(Debug, Clone)]
pub struct RecordingEventBus {
    inner: Arc<Inner>,
}

impl Default for RecordingEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEventBus {
    /// Empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                log: Mutex::new(Vec::new()),
                live,
                fail_publishes: AtomicBool::new(false),
                failing_topics: Mutex::new(Vec::new()),
                fail_subscribes: AtomicBool::new(false),
            }),
        }
    }

    /// Emitter publishing to this bus.
    #[must_use]
    pub fn emitter(&self) -> Emitter {
        Emitter::new(Arc::new(self.clone()))
    }

    /// Make every following publish fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.inner.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Make following publishes to one topic fail, leaving other topics alone.
    pub fn fail_topic(&self, topic: &str) {
        self.inner
            .failing_topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(topic.to_string());
    }

    /// Make every following subscribe fail (or succeed again).
    pub fn fail_subscribes(&self, fail: bool) {
        self.inner.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    /// Every recorded `(topic, message)` in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, SerializedEvent)> {
        self.log().clone()
    }

    /// Messages recorded on one topic.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<SerializedEvent> {
        self.log()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Event types recorded on one topic.
    #[must_use]
    pub fn event_types(&self, topic: &str) -> Vec<String> {
        self.published_to(topic)
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    /// Decoded bodies recorded on one topic.
    ///
    /// # Panics
    ///
    /// Panics if a body does not decode as `T`.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn decoded<T: DeserializeOwned>(&self, topic: &str) -> Vec<T> {
        self.published_to(topic)
            .iter()
            .map(|e| e.decode().expect("recorded body decodes"))
            .collect()
    }

    /// Number of recorded messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log().is_empty()
    }

    /// Forget every recorded message.
    pub fn clear(&self) {
        self.log().clear();
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<(String, SerializedEvent)>> {
        self.inner.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventBus for RecordingEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            if self.inner.fail_publishes.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "publishing disabled by test".to_string(),
                });
            }
            let topic_failing = self
                .inner
                .failing_topics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&topic);
            if topic_failing {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "topic disabled by test".to_string(),
                });
            }
            self.log().push((topic.clone(), event.clone()));
            // No live subscriber is not an error.
            let _ = self.inner.live.send((topic, event));
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();
        Box::pin(async move {
            if self.inner.fail_subscribes.load(Ordering::SeqCst) {
                return Err(EventBusError::SubscriptionFailed {
                    topics,
                    reason: "subscribing disabled by test".to_string(),
                });
            }
            let mut rx = self.inner.live.subscribe();
            let events: EventStream = Box::pin(stream! {
                loop {
                    match rx.recv().await {
                        Ok((topic, event)) => {
                            if topics.contains(&topic) {
                                yield Ok(event);
                            }
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            yield Err(EventBusError::TransportError(format!("subscriber lagged by {skipped}")));
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            Ok(events)
        })
    }
}
