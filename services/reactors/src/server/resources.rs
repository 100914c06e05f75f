//! JSON:API representations of reactors.

use crate::model::{Reactor, ReactorSpawn};
use chrono::{DateTime, Utc};
use realm_web::ToResource;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attributes of a `reactors` resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorAttributes {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Map id
    pub map_id: u32,
    /// Map instance
    pub instance: Uuid,
    /// Classification
    pub classification: u32,
    /// Name
    pub name: String,
    /// State
    pub state: i8,
    /// Event state
    pub event_state: u8,
    /// Horizontal position
    pub x: i16,
    /// Vertical position
    pub y: i16,
    /// Re-creation delay in ms
    pub delay: u32,
    /// Facing
    pub direction: u8,
    /// Last change
    pub update_time: DateTime<Utc>,
}

impl ToResource for Reactor {
    const TYPE: &'static str = "reactors";
    type Attributes = ReactorAttributes;

    fn resource_id(&self) -> String {
        self.id().to_string()
    }

    fn attributes(&self) -> ReactorAttributes {
        let field = self.field();
        ReactorAttributes {
            world_id: field.world,
            channel_id: field.channel,
            map_id: field.map,
            instance: field.instance,
            classification: self.classification(),
            name: self.name().to_string(),
            state: self.state(),
            event_state: self.event_state(),
            x: self.x(),
            y: self.y(),
            delay: self.delay(),
            direction: self.direction(),
            update_time: self.update_time(),
        }
    }
}

/// Body of a create request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReactorAttributes {
    /// Classification
    pub classification: u32,
    /// Name; game data supplies one when empty
    #[serde(default)]
    pub name: String,
    /// Initial state
    #[serde(default)]
    pub state: i8,
    /// Horizontal position
    pub x: i16,
    /// Vertical position
    pub y: i16,
    /// Re-creation delay in ms
    #[serde(default)]
    pub delay: u32,
    /// Facing
    #[serde(default)]
    pub direction: u8,
}

impl From<CreateReactorAttributes> for ReactorSpawn {
    fn from(a: CreateReactorAttributes) -> Self {
        Self {
            classification: a.classification,
            name: a.name,
            state: a.state,
            x: a.x,
            y: a.y,
            delay: a.delay,
            direction: a.direction,
        }
    }
}
