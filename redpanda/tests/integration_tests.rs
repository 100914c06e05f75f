//! Integration tests for [`RedpandaEventBus`] against a real Kafka broker.
//!
//! Marked `#[ignore]`: they need Docker (testcontainers) and take tens of
//! seconds to start the broker.
//!
//! ```bash
//! cargo test -p realm-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use realm_core::Tenant;
use realm_core::event::{Event, PartitionKey, SerializedEvent};
use realm_core::event_bus::EventBus;
use realm_redpanda::RedpandaEventBus;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct StatChanged {
    character_id: u32,
    sequence: u32,
}

impl Event for StatChanged {
    fn event_type(&self) -> &'static str {
        "STAT_CHANGED"
    }
}

fn tenant() -> Tenant {
    Tenant::new(Uuid::new_v4(), "GMS", 83, 1)
}

fn stat_changed(tenant: &Tenant, character_id: u32, sequence: u32) -> SerializedEvent {
    SerializedEvent::from_event(
        &StatChanged {
            character_id,
            sequence,
        },
        PartitionKey::from(character_id),
        tenant,
        Uuid::new_v4(),
    )
    .expect("encode")
}

async fn start_broker() -> (testcontainers::ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");
    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

/// Publish warmup messages until the broker accepts them and the topic exists.
async fn warm_up(bus: &RedpandaEventBus, topic: &str) {
    let warmup = stat_changed(&tenant(), 0, 0);
    for attempt in 1..=60 {
        if bus.publish(topic, &warmup).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(3)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(attempt != 60, "Kafka failed to become ready");
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn envelope_survives_the_broker() {
    let (_kafka, brokers) = start_broker().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    warm_up(&bus, "EVENT_TOPIC_CHARACTER_STATUS").await;

    let mut stream = bus
        .subscribe(&["EVENT_TOPIC_CHARACTER_STATUS"])
        .await
        .expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let tenant = tenant();
    bus.publish("EVENT_TOPIC_CHARACTER_STATUS", &stat_changed(&tenant, 12345, 1))
        .await
        .expect("publish");

    let received = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = stream.next().await.expect("stream open").expect("decodes");
            if event.tenant == tenant {
                return event;
            }
        }
    })
    .await
    .expect("Timeout waiting for event");

    assert_eq!(received.key, "12345");
    assert_eq!(received.event_type, "STAT_CHANGED");
    let body: StatChanged = received.decode().expect("body");
    assert_eq!(body.character_id, 12345);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn same_key_is_delivered_in_order() {
    let (_kafka, brokers) = start_broker().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("realm-ordering-test")
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    warm_up(&bus, "EVENT_TOPIC_REACTOR_STATUS").await;

    let mut stream = bus
        .subscribe(&["EVENT_TOPIC_REACTOR_STATUS"])
        .await
        .expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let tenant = tenant();
    for sequence in 1..=20 {
        bus.publish("EVENT_TOPIC_REACTOR_STATUS", &stat_changed(&tenant, 7, sequence))
            .await
            .expect("publish");
    }

    let sequences = tokio::time::timeout(Duration::from_secs(15), async {
        let mut seen = Vec::new();
        while seen.len() < 20 {
            let event = stream.next().await.expect("stream open").expect("decodes");
            if event.tenant == tenant {
                let body: StatChanged = event.decode().expect("body");
                seen.push(body.sequence);
            }
        }
        seen
    })
    .await
    .expect("Timeout waiting for events");

    assert_eq!(sequences, (1..=20).collect::<Vec<_>>());
}
