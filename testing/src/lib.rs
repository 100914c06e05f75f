//! # Realm Testing
//!
//! Test doubles shared by the realm crates.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - An in-memory bus that records every publish ([`RecordingEventBus`])
//! - Configurable peer services ([`StubPeers`])
//! - Tenant fixtures
//!
//! ## Example
//!
//! ```ignore
//! use realm_testing::{RecordingEventBus, StubPeers, test_tenant};
//!
//! #[tokio::test]
//! async fn clamp_follows_max_hp_drop() {
//!     let bus = RecordingEventBus::new();
//!     let peers = StubPeers::new();
//!     peers.add_character(CharacterData { id: 7, max_hp: 5000, ..Default::default() });
//!
//!     let processor = StatsProcessor::new(Arc::new(peers.clone()), bus.emitter(), topics());
//!     processor.get(&test_tenant(), 0, 1, 7).await?;
//!     processor.remove_buff_bonuses(&test_tenant(), 7, 1301007).await?;
//!
//!     assert_eq!(bus.event_types("COMMAND_TOPIC_CHARACTER"), vec!["CLAMP_HP_MP"]);
//! }
//! ```

use chrono::{DateTime, Utc};
use realm_core::Tenant;
use realm_core::environment::Clock;
use realm_core::event::{PartitionKey, SerializedEvent};
use serde::Serialize;
use uuid::Uuid;

pub mod bus;
pub mod peers;

pub use bus::RecordingEventBus;
pub use peers::StubPeers;

/// Mock clocks.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use realm_testing::mocks::FixedClock;
    /// use realm_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock moved forward explicitly by the test.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Clock starting at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Default instant for tests (2025-01-01 00:00:00 UTC, a Wednesday)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }

    /// Fixed clock at [`test_time`].
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }
}

pub use mocks::{FixedClock, ManualClock, test_clock, test_time};

/// The tenant most tests run under.
#[must_use]
pub fn test_tenant() -> Tenant {
    Tenant::new(
        Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0001),
        "GMS",
        83,
        1,
    )
}

/// A second tenant, for isolation tests.
#[must_use]
pub fn other_tenant() -> Tenant {
    Tenant::new(
        Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0002),
        "JMS",
        185,
        1,
    )
}

/// An inbound message as a peer would publish it.
///
/// # Panics
///
/// Panics if `body` cannot be serialized to JSON.
#[must_use]
#[allow(clippy::expect_used)]
pub fn inbound<T: Serialize>(
    tenant: &Tenant,
    event_type: &str,
    key: impl Into<PartitionKey>,
    body: &T,
) -> SerializedEvent {
    SerializedEvent {
        event_type: event_type.to_string(),
        key: key.into().to_string(),
        tenant: tenant.clone(),
        transaction_id: Uuid::new_v4(),
        data: serde_json::to_vec(body).expect("inbound body serializes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_stable() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(test_time());
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now(), test_time() + chrono::Duration::seconds(90));
    }

    #[test]
    fn fixture_tenants_differ() {
        assert_ne!(test_tenant(), other_tenant());
    }
}
