//! Consumer loop driven through the recording bus.

#![allow(clippy::expect_used)]

use realm_core::RealmError;
use realm_core::event::{Event, SerializedEvent};
use realm_core::event_bus::EventBus;
use realm_runtime::consumer::{Consumer, HandlerFuture, MessageHandler};
use realm_testing::{RecordingEventBus, test_tenant};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct Hit {
    reactor_id: u32,
}

impl Event for Hit {
    fn event_type(&self) -> &'static str {
        "HIT"
    }
}

#[derive(Default)]
struct Collect {
    seen: Mutex<Vec<u32>>,
}

impl MessageHandler for Collect {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let hit: Hit = event.decode()?;
            if hit.reactor_id == 0 {
                return Err(RealmError::validation("reactor id required"));
            }
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(hit.reactor_id);
            Ok(())
        })
    }
}

fn hit(reactor_id: u32) -> SerializedEvent {
    SerializedEvent::from_event(&Hit { reactor_id }, reactor_id.into(), &test_tenant(), Uuid::new_v4())
        .expect("encode")
}

async fn wait_for(handler: &Collect, count: usize) -> Vec<u32> {
    for _ in 0..100 {
        let seen = handler
            .seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        if seen.len() >= count {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Vec::new()
}

#[tokio::test]
async fn dispatches_topic_messages_and_survives_errors() {
    let bus = RecordingEventBus::new();
    let handler = Arc::new(Collect::default());
    let (tx, rx) = watch::channel(false);

    let consumer = Consumer::new(Arc::new(bus.clone()), "COMMAND_TOPIC_REACTOR", handler.clone());
    let task = consumer.spawn(rx);
    tokio::time::sleep(Duration::from_millis(20)).await;

    bus.publish("COMMAND_TOPIC_REACTOR", &hit(0)).await.expect("publish");
    bus.publish("COMMAND_TOPIC_OTHER", &hit(5)).await.expect("publish");
    bus.publish("COMMAND_TOPIC_REACTOR", &hit(1)).await.expect("publish");
    bus.publish("COMMAND_TOPIC_REACTOR", &hit(2)).await.expect("publish");

    assert_eq!(wait_for(&handler, 2).await, vec![1, 2]);

    tx.send(true).expect("signal");
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("consumer stops")
        .expect("consumer task");
}

#[tokio::test]
async fn resubscribes_after_failed_subscription() {
    let bus = RecordingEventBus::new();
    bus.fail_subscribes(true);
    let handler = Arc::new(Collect::default());
    let (tx, rx) = watch::channel(false);

    let task = Consumer::new(Arc::new(bus.clone()), "COMMAND_TOPIC_REACTOR", handler.clone())
        .with_reconnect_delay(Duration::from_millis(20))
        .spawn(rx);

    tokio::time::sleep(Duration::from_millis(30)).await;
    bus.fail_subscribes(false);
    tokio::time::sleep(Duration::from_millis(60)).await;

    bus.publish("COMMAND_TOPIC_REACTOR", &hit(9)).await.expect("publish");
    assert_eq!(wait_for(&handler, 1).await, vec![9]);

    tx.send(true).expect("signal");
    let _ = task.await;
}
