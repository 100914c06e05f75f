//! JSON:API representations of party quests.

use crate::definition::Definition;
use crate::model::{CharacterEntry, Instance, StageState};
use chrono::{DateTime, Utc};
use realm_web::ToResource;
use serde::Serialize;
use uuid::Uuid;

/// Attributes of an `instances` resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceAttributes {
    /// Definition it runs
    pub definition_id: Uuid,
    /// Quest id
    pub quest_id: String,
    /// Lifecycle state
    pub state: &'static str,
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Registering party
    pub party_id: u32,
    /// Individual registration grouping
    pub affinity_id: u32,
    /// Registered characters
    pub characters: Vec<CharacterEntry>,
    /// Current stage position
    pub current_stage_index: u32,
    /// Creation time
    pub registered_at: DateTime<Utc>,
    /// Play start
    pub started_at: Option<DateTime<Utc>>,
    /// Current stage start
    pub stage_started_at: Option<DateTime<Utc>>,
    /// Stage counters
    pub stage_state: StageState,
}

impl ToResource for Instance {
    const TYPE: &'static str = "instances";
    type Attributes = InstanceAttributes;

    fn resource_id(&self) -> String {
        self.id().to_string()
    }

    fn attributes(&self) -> InstanceAttributes {
        InstanceAttributes {
            definition_id: self.definition_id(),
            quest_id: self.quest_id().to_string(),
            state: self.state().as_str(),
            world_id: self.world_id(),
            channel_id: self.channel_id(),
            party_id: self.party_id(),
            affinity_id: self.affinity_id(),
            characters: self.characters().to_vec(),
            current_stage_index: self.stage_index(),
            registered_at: self.registered_at(),
            started_at: self.started_at(),
            stage_started_at: self.stage_started_at(),
            stage_state: self.stage_state().clone(),
        }
    }
}

impl ToResource for Definition {
    const TYPE: &'static str = "definitions";
    type Attributes = Self;

    fn resource_id(&self) -> String {
        self.id.to_string()
    }

    fn attributes(&self) -> Self {
        self.clone()
    }
}

/// Time left on a character's party-quest timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    /// Character asking
    pub character_id: u32,
    /// Seconds left
    pub remaining: u64,
}

/// Attributes of a `timers` resource.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerAttributes {
    /// Seconds left
    pub duration: u64,
}

impl ToResource for Timer {
    const TYPE: &'static str = "timers";
    type Attributes = TimerAttributes;

    fn resource_id(&self) -> String {
        self.character_id.to_string()
    }

    fn attributes(&self) -> TimerAttributes {
        TimerAttributes {
            duration: self.remaining,
        }
    }
}
