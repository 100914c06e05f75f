//! Messages published by the stats service.

use crate::model::{StatModel, StatType};
use realm_core::event::{Event, EventError, MessageBuffer};
use realm_core::topic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status topic variable.
pub const EVENT_TOPIC_CHARACTER_STAT_STATUS: &str = "EVENT_TOPIC_CHARACTER_STAT_STATUS";
/// Character command topic variable.
pub const COMMAND_TOPIC_CHARACTER: &str = "COMMAND_TOPIC_CHARACTER";

/// Resolved topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Where `STAT_CHANGED` goes
    pub status: String,
    /// Where `CLAMP_HP_MP` goes
    pub character_command: String,
}

impl Topics {
    /// Resolve from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            status: topic::resolve(EVENT_TOPIC_CHARACTER_STAT_STATUS),
            character_command: topic::resolve(COMMAND_TOPIC_CHARACTER),
        }
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Effective stats changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatChanged {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Character id
    pub character_id: u32,
    /// Stats whose value changed
    pub updates: Vec<StatType>,
    /// New values of the changed stats
    pub values: BTreeMap<StatType, u32>,
}

impl Event for StatChanged {
    fn event_type(&self) -> &'static str {
        "STAT_CHANGED"
    }
}

/// Ask the character service to cap current HP/MP at the new maxima.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClampHpMp {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Character id
    pub character_id: u32,
    /// New effective max HP
    pub max_hp: u32,
    /// New effective max MP
    pub max_mp: u32,
}

impl Event for ClampHpMp {
    fn event_type(&self) -> &'static str {
        "CLAMP_HP_MP"
    }
}

/// Buffer the messages a change from `before` to `after` produces.
///
/// Nothing is buffered when no computed value moved. A drop of max HP or max
/// MP also buffers a clamp command, sharing the buffer's transaction id.
///
/// # Errors
///
/// Returns [`EventError`] if a body cannot be serialized.
pub fn buffer_changes(
    buffer: &mut MessageBuffer,
    topics: &Topics,
    before: &StatModel,
    after: &StatModel,
) -> Result<Vec<StatType>, EventError> {
    let updates = before.changed(after);
    if updates.is_empty() {
        return Ok(updates);
    }

    let values = updates
        .iter()
        .map(|&stat| (stat, after.effective(stat)))
        .collect();
    buffer.put(
        &topics.status,
        after.character_id(),
        &StatChanged {
            world_id: after.world_id(),
            channel_id: after.channel_id(),
            character_id: after.character_id(),
            updates: updates.clone(),
            values,
        },
    )?;

    let hp_dropped = after.effective(StatType::MaxHp) < before.effective(StatType::MaxHp);
    let mp_dropped = after.effective(StatType::MaxMp) < before.effective(StatType::MaxMp);
    if hp_dropped || mp_dropped {
        tracing::debug!(
            character_id = after.character_id(),
            max_hp = after.effective(StatType::MaxHp),
            max_mp = after.effective(StatType::MaxMp),
            "Max HP/MP decreased, clamping"
        );
        buffer.put(
            &topics.character_command,
            after.character_id(),
            &ClampHpMp {
                world_id: after.world_id(),
                channel_id: after.channel_id(),
                character_id: after.character_id(),
                max_hp: after.effective(StatType::MaxHp),
                max_mp: after.effective(StatType::MaxMp),
            },
        )?;
    }
    Ok(updates)
}
