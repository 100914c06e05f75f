//! Messages published by the transports service.

use crate::model::RouteState;
use realm_core::event::Event;
use realm_core::topic;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Route status topic variable.
pub const EVENT_TOPIC_TRANSPORT_STATUS: &str = "EVENT_TOPIC_TRANSPORT_STATUS";
/// Character command topic variable.
pub const COMMAND_TOPIC_CHARACTER: &str = "COMMAND_TOPIC_CHARACTER";
/// Voyage event topic variable.
pub const EVENT_TOPIC_INSTANCE_TRANSPORT: &str = "EVENT_TOPIC_INSTANCE_TRANSPORT";
/// Instanced transport command topic variable.
pub const COMMAND_TOPIC_INSTANCE_TRANSPORT: &str = "COMMAND_TOPIC_INSTANCE_TRANSPORT";

/// Resolved topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Route state changes, departures and arrivals
    pub status: String,
    /// `CHANGE_MAP`
    pub character: String,
    /// Voyage starts, transit entries, completions and cancellations
    pub instance: String,
}

impl Topics {
    /// Resolve from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            status: topic::resolve(EVENT_TOPIC_TRANSPORT_STATUS),
            character: topic::resolve(COMMAND_TOPIC_CHARACTER),
            instance: topic::resolve(EVENT_TOPIC_INSTANCE_TRANSPORT),
        }
    }
}

/// Something that happened to a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    /// Route id
    pub route_id: Uuid,
    /// What happened
    #[serde(flatten)]
    pub change: RouteChange,
}

/// Route status discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteChange {
    /// The schedule moved the route to another state
    StateChanged {
        /// State left
        previous: RouteState,
        /// State entered
        state: RouteState,
    },
    /// The vessel left the staging map
    #[serde(rename_all = "camelCase")]
    Departed {
        /// Staging map
        map_id: u32,
        /// Characters on the staging map at departure
        passengers: u32,
    },
    /// The vessel reached its destination
    #[serde(rename_all = "camelCase")]
    Arrived {
        /// Destination map
        map_id: u32,
        /// Characters on the en-route maps at arrival
        passengers: u32,
    },
}

impl Event for RouteStatus {
    fn event_type(&self) -> &'static str {
        match self.change {
            RouteChange::StateChanged { .. } => "STATE_CHANGED",
            RouteChange::Departed { .. } => "DEPARTED",
            RouteChange::Arrived { .. } => "ARRIVED",
        }
    }
}

/// Something that happened to a character on an instanced route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTransportEvent {
    /// World id
    pub world_id: u8,
    /// Character concerned
    pub character_id: u32,
    /// Instanced route
    pub route_id: Uuid,
    /// Voyage, and field instance of its transit maps
    pub instance_id: Uuid,
    /// What happened
    #[serde(flatten)]
    pub change: InstanceChange,
}

/// Voyage event discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceChange {
    /// The character boarded and was sent into the transit instance
    #[serde(rename_all = "camelCase")]
    Started {
        /// Channel the character boarded in
        channel_id: u8,
    },
    /// The character arrived on a transit map of its voyage
    #[serde(rename_all = "camelCase")]
    TransitEntered {
        /// Channel id
        channel_id: u8,
        /// Transit map entered
        map_id: u32,
        /// Seconds until arrival
        remaining_secs: u64,
        /// Route's transit message
        message: String,
    },
    /// The voyage delivered the character to its destination
    #[serde(rename_all = "camelCase")]
    Completed {
        /// Channel id
        channel_id: u8,
        /// Destination map
        map_id: u32,
    },
    /// The character left the voyage before arriving
    #[serde(rename_all = "camelCase")]
    Cancelled {
        /// Channel id
        channel_id: u8,
        /// `map_exit`, `logout` or `stuck`
        reason: String,
    },
}

impl Event for InstanceTransportEvent {
    fn event_type(&self) -> &'static str {
        match self.change {
            InstanceChange::Started { .. } => "STARTED",
            InstanceChange::TransitEntered { .. } => "TRANSIT_ENTERED",
            InstanceChange::Completed { .. } => "COMPLETED",
            InstanceChange::Cancelled { .. } => "CANCELLED",
        }
    }
}

/// Command for the instanced transport service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTransportCommand {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Issuing character
    pub character_id: u32,
    /// What to do
    #[serde(flatten)]
    pub kind: InstanceCommandKind,
}

/// Instanced transport command discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceCommandKind {
    /// Board a voyage of a route
    Start(StartBody),
}

impl Event for InstanceTransportCommand {
    fn event_type(&self) -> &'static str {
        match self.kind {
            InstanceCommandKind::Start(_) => "START",
        }
    }
}

/// Body of START. The route is looked up by id, or by name when the id is
/// nil.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartBody {
    /// Route id
    pub route_id: Uuid,
    /// Route name
    pub route_name: String,
}

/// Command to a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterCommand {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Target character
    pub character_id: u32,
    /// What to do
    #[serde(flatten)]
    pub kind: CharacterCommandKind,
}

impl CharacterCommand {
    /// Warp a character to the shared instance of a map.
    #[must_use]
    pub const fn change_map(world_id: u8, channel_id: u8, character_id: u32, map_id: u32) -> Self {
        Self {
            world_id,
            channel_id,
            character_id,
            kind: CharacterCommandKind::ChangeMap(ChangeMapBody {
                map_id,
                instance: Uuid::nil(),
                portal_id: 0,
            }),
        }
    }

    /// Warp a character into a private instance of a map.
    #[must_use]
    pub const fn change_map_in(world_id: u8, channel_id: u8, character_id: u32, map_id: u32, instance: Uuid) -> Self {
        Self {
            world_id,
            channel_id,
            character_id,
            kind: CharacterCommandKind::ChangeMap(ChangeMapBody {
                map_id,
                instance,
                portal_id: 0,
            }),
        }
    }
}

/// Character command discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharacterCommandKind {
    /// Warp
    ChangeMap(ChangeMapBody),
}

impl Event for CharacterCommand {
    fn event_type(&self) -> &'static str {
        match self.kind {
            CharacterCommandKind::ChangeMap(_) => "CHANGE_MAP",
        }
    }
}

/// Body of CHANGE_MAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMapBody {
    /// Destination map
    pub map_id: u32,
    /// Destination field instance
    pub instance: Uuid,
    /// Arrival portal
    pub portal_id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_change_wire_shape() {
        let id = Uuid::new_v4();
        let event = RouteStatus {
            route_id: id,
            change: RouteChange::StateChanged {
                previous: RouteState::LockedEntry,
                state: RouteState::InTransit,
            },
        };
        assert_eq!(event.event_type(), "STATE_CHANGED");
        let value = serde_json::to_value(&event).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(
            value,
            json!({
                "routeId": id,
                "type": "STATE_CHANGED",
                "body": { "previous": "locked_entry", "state": "in_transit" }
            })
        );
    }

    #[test]
    fn departure_carries_passengers() {
        let value = serde_json::to_value(RouteStatus {
            route_id: Uuid::nil(),
            change: RouteChange::Departed {
                map_id: 101_000_301,
                passengers: 4,
            },
        })
        .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(value["body"], json!({ "mapId": 101_000_301, "passengers": 4 }));
    }

    #[test]
    fn start_names_the_route() {
        let command: InstanceTransportCommand = serde_json::from_value(json!({
            "worldId": 0,
            "channelId": 1,
            "characterId": 42,
            "type": "START",
            "body": { "routeName": "Kerning Square Train" }
        }))
        .unwrap_or_else(|e| unreachable!("{e}"));
        let InstanceCommandKind::Start(body) = command.kind;
        assert!(body.route_id.is_nil());
        assert_eq!(body.route_name, "Kerning Square Train");
    }
}
