//! Messages published and consumed by the rates service.

use crate::model::{RateModel, RateType};
use chrono::{DateTime, Utc};
use realm_core::event::{Event, EventError, MessageBuffer};
use realm_core::topic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status topic variable.
pub const EVENT_TOPIC_CHARACTER_RATE_STATUS: &str = "EVENT_TOPIC_CHARACTER_RATE_STATUS";
/// World rate topic variable.
pub const EVENT_TOPIC_WORLD_RATE: &str = "EVENT_TOPIC_WORLD_RATE";

/// Resolved topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Where `RATE_CHANGED` goes
    pub status: String,
}

impl Topics {
    /// Resolve from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            status: topic::resolve(EVENT_TOPIC_CHARACTER_RATE_STATUS),
        }
    }
}

/// A character's computed rates changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateChanged {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Character id
    pub character_id: u32,
    /// Every computed rate after the change
    pub rates: BTreeMap<RateType, f64>,
}

impl Event for RateChanged {
    fn event_type(&self) -> &'static str {
        "RATE_CHANGED"
    }
}

/// Operator change of a world rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldRateChanged {
    /// World id
    pub world_id: u8,
    /// Rate changed
    pub rate_type: RateType,
    /// New multiplier
    pub multiplier: f64,
}

impl Event for WorldRateChanged {
    fn event_type(&self) -> &'static str {
        "WORLD_RATE_CHANGED"
    }
}

/// Buffer `RATE_CHANGED` when the rates at `now` differ between the models.
///
/// # Errors
///
/// Returns [`EventError`] if the body cannot be serialized.
pub fn buffer_changes(
    buffer: &mut MessageBuffer,
    topics: &Topics,
    before: &RateModel,
    after: &RateModel,
    now: DateTime<Utc>,
) -> Result<bool, EventError> {
    let rates = after.rates(now);
    if before.rates(now) == rates {
        return Ok(false);
    }
    buffer.put(
        &topics.status,
        after.character_id(),
        &RateChanged {
            world_id: after.world_id(),
            channel_id: after.channel_id(),
            character_id: after.character_id(),
            rates,
        },
    )?;
    Ok(true)
}
