//! Status events published by peer services.
//!
//! Several realm services react to the same peer topics (an equipment move
//! changes both stats and rates, a logout tears down rates, stats, party-quest
//! membership and transport seats; a monster kill can fail a party quest). The shapes live here so every consumer
//! decodes them identically.
//!
//! Bodies are adjacently tagged: `{"type": "MOVED", "body": {"oldSlot": 3}}`.
//! Types a service does not know decode to `Other` and are ignored, whatever
//! their body.

use crate::peer::{EquipmentStats, StatChange};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic variables of the peer status streams.
pub mod topics {
    /// Inventory asset lifecycle
    pub const ASSET_STATUS: &str = "EVENT_TOPIC_ASSET_STATUS";
    /// Buff application and expiry
    pub const BUFF_STATUS: &str = "EVENT_TOPIC_CHARACTER_BUFF_STATUS";
    /// Character login, logout, map and stat changes
    pub const CHARACTER_STATUS: &str = "EVENT_TOPIC_CHARACTER_STATUS";
    /// Skill level changes
    pub const SKILL_STATUS: &str = "EVENT_TOPIC_SKILL_STATUS";
    /// Field drops
    pub const DROP_STATUS: &str = "EVENT_TOPIC_DROP_STATUS";
    /// Monster damage, death and drops
    pub const MONSTER_STATUS: &str = "EVENT_TOPIC_MONSTER_STATUS";
}

/// Something happened to an inventory asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatus {
    /// Owner
    pub character_id: u32,
    /// Asset id
    pub asset_id: u32,
    /// Item template
    pub template_id: u32,
    /// Slot after the change; negative slots are equipped
    pub slot: i16,
    /// What happened
    #[serde(flatten)]
    pub change: AssetChange,
}

/// Asset change discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "body",
    rename_all = "SCREAMING_SNAKE_CASE",
    try_from = "Tagged"
)]
pub enum AssetChange {
    /// Asset entered the inventory
    Created(AssetCreated),
    /// Asset left the inventory
    Deleted,
    /// Asset changed slot
    Moved(AssetMoved),
    /// Any change this service ignores
    Other,
}

/// Body of [`AssetChange::Created`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetCreated {
    /// Equipment stats, for equipable assets
    pub stats: Option<EquipmentStats>,
    /// Creation instant
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of [`AssetChange::Moved`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetMoved {
    /// Slot before the move
    pub old_slot: i16,
    /// Equipment stats, when the inventory service includes them
    pub stats: Option<EquipmentStats>,
}

impl AssetStatus {
    /// A move from the inventory into an equipment slot.
    #[must_use]
    pub fn is_equip(&self) -> bool {
        matches!(&self.change, AssetChange::Moved(m) if m.old_slot >= 0 && self.slot < 0)
    }

    /// A move from an equipment slot back into the inventory.
    #[must_use]
    pub fn is_unequip(&self) -> bool {
        matches!(&self.change, AssetChange::Moved(m) if m.old_slot < 0 && self.slot >= 0)
    }
}

/// A buff was applied to or expired from a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuffStatus {
    /// World id
    pub world_id: u8,
    /// Character id
    pub character_id: u32,
    /// What happened
    #[serde(flatten)]
    pub change: BuffChange,
}

/// Buff change discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "body",
    rename_all = "SCREAMING_SNAKE_CASE",
    try_from = "Tagged"
)]
pub enum BuffChange {
    /// Buff became active
    Applied(BuffBody),
    /// Buff ended
    Expired(BuffBody),
    /// Any change this service ignores
    Other,
}

/// Body shared by buff changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuffBody {
    /// Skill or item that produced the buff
    pub source_id: i32,
    /// Stat changes carried by the buff
    #[serde(default)]
    pub changes: Vec<StatChange>,
    /// Expiry instant
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Character lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterStatus {
    /// World id
    pub world_id: u8,
    /// Character id
    pub character_id: u32,
    /// What happened
    #[serde(flatten)]
    pub change: CharacterChange,
}

/// Character change discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "body",
    rename_all = "SCREAMING_SNAKE_CASE",
    try_from = "Tagged"
)]
pub enum CharacterChange {
    /// Character entered the game
    Login(FieldPosition),
    /// Character left the game
    Logout(FieldPosition),
    /// Character changed map
    MapChanged(MapChange),
    /// Base stats changed
    StatChanged(StatUpdates),
    /// Any change this service ignores
    Other,
}

/// Where a character is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPosition {
    /// Channel id
    pub channel_id: u8,
    /// Map id
    pub map_id: u32,
}

/// Body of [`CharacterChange::MapChanged`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapChange {
    /// Channel id
    pub channel_id: u8,
    /// Map left
    pub old_map_id: u32,
    /// Map entered
    pub target_map_id: u32,
}

/// Body of [`CharacterChange::StatChanged`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatUpdates {
    /// Channel id
    pub channel_id: u8,
    /// Names of the changed base stats
    pub updates: Vec<String>,
}

/// A skill changed level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillStatus {
    /// World id
    pub world_id: u8,
    /// Character id
    pub character_id: u32,
    /// What happened
    #[serde(flatten)]
    pub change: SkillChange,
}

/// Skill change discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "body",
    rename_all = "SCREAMING_SNAKE_CASE",
    try_from = "Tagged"
)]
pub enum SkillChange {
    /// Level learned or changed
    Updated(SkillLevel),
    /// Any change this service ignores
    Other,
}

/// Body of [`SkillChange::Updated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillLevel {
    /// Skill id
    pub skill_id: u32,
    /// New level
    pub level: u8,
}

/// A drop appeared in or left a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropStatus {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Map id
    pub map_id: u32,
    /// Map instance
    #[serde(default)]
    pub instance: Uuid,
    /// Drop id
    pub drop_id: u32,
    /// What happened
    #[serde(flatten)]
    pub change: DropChange,
}

/// Drop change discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "body",
    rename_all = "SCREAMING_SNAKE_CASE",
    try_from = "Tagged"
)]
pub enum DropChange {
    /// Drop landed
    Spawned(DropSpawned),
    /// Any change this service ignores
    Other,
}

/// Body of [`DropChange::Spawned`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropSpawned {
    /// Item template (0 for mesos)
    pub item_id: u32,
    /// Stack size
    pub quantity: u16,
    /// Landing x
    pub x: i16,
    /// Landing y
    pub y: i16,
}

/// Something happened to a monster in a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterStatus {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Map id
    pub map_id: u32,
    /// Map instance
    #[serde(default)]
    pub instance: Uuid,
    /// Spawned monster id
    pub unique_id: u32,
    /// Monster template
    pub monster_id: u32,
    /// What happened
    #[serde(flatten)]
    pub change: MonsterChange,
}

/// Monster change discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "body",
    rename_all = "SCREAMING_SNAKE_CASE",
    try_from = "Tagged"
)]
pub enum MonsterChange {
    /// Monster took damage
    Damaged,
    /// Monster died
    Killed,
    /// A friendly monster dropped items on its timer
    FriendlyDrop(FriendlyDrop),
    /// Any change this service ignores
    Other,
}

/// Body of [`MonsterChange::FriendlyDrop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendlyDrop {
    /// Items dropped this time
    pub item_count: u32,
}

/// Wire form of a change: a type tag plus an optional body.
#[derive(Deserialize)]
struct Tagged {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    body: serde_json::Value,
}

impl Tagged {
    fn body<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        if self.body.is_null() {
            return serde_json::from_value(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_value(self.body)
    }
}

impl TryFrom<Tagged> for AssetChange {
    type Error = serde_json::Error;

    fn try_from(tagged: Tagged) -> Result<Self, Self::Error> {
        Ok(match tagged.kind.as_str() {
            "CREATED" => Self::Created(tagged.body()?),
            "DELETED" => Self::Deleted,
            "MOVED" => Self::Moved(tagged.body()?),
            _ => Self::Other,
        })
    }
}

impl TryFrom<Tagged> for BuffChange {
    type Error = serde_json::Error;

    fn try_from(tagged: Tagged) -> Result<Self, Self::Error> {
        Ok(match tagged.kind.as_str() {
            "APPLIED" => Self::Applied(tagged.body()?),
            "EXPIRED" => Self::Expired(tagged.body()?),
            _ => Self::Other,
        })
    }
}

impl TryFrom<Tagged> for CharacterChange {
    type Error = serde_json::Error;

    fn try_from(tagged: Tagged) -> Result<Self, Self::Error> {
        Ok(match tagged.kind.as_str() {
            "LOGIN" => Self::Login(tagged.body()?),
            "LOGOUT" => Self::Logout(tagged.body()?),
            "MAP_CHANGED" => Self::MapChanged(tagged.body()?),
            "STAT_CHANGED" => Self::StatChanged(tagged.body()?),
            _ => Self::Other,
        })
    }
}

impl TryFrom<Tagged> for SkillChange {
    type Error = serde_json::Error;

    fn try_from(tagged: Tagged) -> Result<Self, Self::Error> {
        Ok(match tagged.kind.as_str() {
            "UPDATED" => Self::Updated(tagged.body()?),
            _ => Self::Other,
        })
    }
}

impl TryFrom<Tagged> for DropChange {
    type Error = serde_json::Error;

    fn try_from(tagged: Tagged) -> Result<Self, Self::Error> {
        Ok(match tagged.kind.as_str() {
            "SPAWNED" => Self::Spawned(tagged.body()?),
            _ => Self::Other,
        })
    }
}

impl TryFrom<Tagged> for MonsterChange {
    type Error = serde_json::Error;

    fn try_from(tagged: Tagged) -> Result<Self, Self::Error> {
        Ok(match tagged.kind.as_str() {
            "DAMAGED" => Self::Damaged,
            "KILLED" => Self::Killed,
            "FRIENDLY_DROP" => Self::FriendlyDrop(tagged.body()?),
            _ => Self::Other,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn moved_into_equipment_is_an_equip() {
        let status: AssetStatus = serde_json::from_value(json!({
            "characterId": 7,
            "assetId": 11,
            "templateId": 1_302_000,
            "slot": -11,
            "type": "MOVED",
            "body": { "oldSlot": 3 }
        }))
        .expect("decodes");
        assert!(status.is_equip());
        assert!(!status.is_unequip());
    }

    #[test]
    fn unknown_types_decode_as_other() {
        let status: CharacterStatus = serde_json::from_value(json!({
            "worldId": 0,
            "characterId": 7,
            "type": "JOB_CHANGED",
            "body": { "jobId": 100 }
        }))
        .expect("decodes");
        assert_eq!(status.change, CharacterChange::Other);
    }

    #[test]
    fn logout_carries_the_field() {
        let status: CharacterStatus = serde_json::from_value(json!({
            "worldId": 0,
            "characterId": 7,
            "type": "LOGOUT",
            "body": { "channelId": 1, "mapId": 200_090_000 }
        }))
        .expect("decodes");
        assert_eq!(
            status.change,
            CharacterChange::Logout(FieldPosition {
                channel_id: 1,
                map_id: 200_090_000
            })
        );
    }

    #[test]
    fn friendly_drop_carries_the_item_count() {
        let status: MonsterStatus = serde_json::from_value(json!({
            "worldId": 0,
            "channelId": 1,
            "mapId": 921_100_300,
            "uniqueId": 5,
            "monsterId": 9_300_061,
            "type": "FRIENDLY_DROP",
            "body": { "itemCount": 3 }
        }))
        .expect("decodes");
        assert_eq!(status.instance, Uuid::nil());
        assert_eq!(status.change, MonsterChange::FriendlyDrop(FriendlyDrop { item_count: 3 }));

        let killed: MonsterStatus = serde_json::from_value(json!({
            "worldId": 0, "channelId": 1, "mapId": 1, "uniqueId": 5, "monsterId": 2, "type": "KILLED"
        }))
        .expect("decodes");
        assert_eq!(killed.change, MonsterChange::Killed);
    }
}
