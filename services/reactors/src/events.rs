//! Messages consumed and published by the reactors service.

use crate::model::{Reactor, ReactorSpawn};
use realm_core::event::Event;
use realm_core::registry::MapKey;
use realm_core::topic;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status topic variable.
pub const EVENT_TOPIC_REACTOR_STATUS: &str = "EVENT_TOPIC_REACTOR_STATUS";
/// Inbound command topic variable.
pub const COMMAND_TOPIC_REACTOR: &str = "COMMAND_TOPIC_REACTOR";
/// Scripting command topic variable.
pub const COMMAND_TOPIC_REACTOR_ACTIONS: &str = "COMMAND_TOPIC_REACTOR_ACTIONS";

/// Resolved topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// `CREATED`, `HIT`, `DESTROYED`
    pub status: String,
    /// Inbound commands; REST creation enqueues here
    pub command: String,
    /// `HIT` and `TRIGGER` for the scripting service
    pub actions: String,
}

impl Topics {
    /// Resolve from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            status: topic::resolve(EVENT_TOPIC_REACTOR_STATUS),
            command: topic::resolve(COMMAND_TOPIC_REACTOR),
            actions: topic::resolve(COMMAND_TOPIC_REACTOR_ACTIONS),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound commands
// ---------------------------------------------------------------------------

/// Command addressed to the reactors of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorCommand {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Map id
    pub map_id: u32,
    /// Map instance
    #[serde(default)]
    pub instance: Uuid,
    /// What to do
    #[serde(flatten)]
    pub kind: CommandKind,
}

impl ReactorCommand {
    /// Field the command targets.
    #[must_use]
    pub const fn field(&self) -> MapKey {
        MapKey::new(self.world_id, self.channel_id, self.map_id, self.instance)
    }
}

/// Command discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// Spawn a reactor
    Create(ReactorSpawn),
    /// Hit a reactor
    Hit(HitBody),
    /// Remove one reactor
    Destroy(DestroyBody),
    /// Remove every reactor of the field
    DestroyInField,
    /// Lift every cooldown of the field
    ClearCooldowns,
}

impl Event for ReactorCommand {
    fn event_type(&self) -> &'static str {
        match self.kind {
            CommandKind::Create(_) => "CREATE",
            CommandKind::Hit(_) => "HIT",
            CommandKind::Destroy(_) => "DESTROY",
            CommandKind::DestroyInField => "DESTROY_IN_FIELD",
            CommandKind::ClearCooldowns => "CLEAR_COOLDOWNS",
        }
    }
}

/// Body of a HIT command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitBody {
    /// Reactor hit
    pub reactor_id: u32,
    /// Character that hit it
    pub character_id: u32,
    /// Skill used; 0 for a basic attack
    #[serde(default)]
    pub skill_id: u32,
}

/// Body of a DESTROY command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyBody {
    /// Reactor to remove
    pub reactor_id: u32,
}

// ---------------------------------------------------------------------------
// Status events
// ---------------------------------------------------------------------------

/// Reactor lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorStatus {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Map id
    pub map_id: u32,
    /// Map instance
    pub instance: Uuid,
    /// Reactor id
    pub reactor_id: u32,
    /// What happened
    #[serde(flatten)]
    pub change: StatusChange,
}

/// Status discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusChange {
    /// Reactor spawned
    Created(ReactorSnapshot),
    /// Reactor moved to a new state
    Hit(ReactorSnapshot),
    /// Reactor removed
    Destroyed(ReactorSnapshot),
}

/// Reactor fields carried by status events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorSnapshot {
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
    /// Facing
    pub direction: u8,
}

impl ReactorStatus {
    fn of(reactor: &Reactor, wrap: fn(ReactorSnapshot) -> StatusChange) -> Self {
        let field = reactor.field();
        Self {
            world_id: field.world,
            channel_id: field.channel,
            map_id: field.map,
            instance: field.instance,
            reactor_id: reactor.id(),
            change: wrap(ReactorSnapshot {
                classification: reactor.classification(),
                name: reactor.name().to_string(),
                state: reactor.state(),
                event_state: reactor.event_state(),
                x: reactor.x(),
                y: reactor.y(),
                direction: reactor.direction(),
            }),
        }
    }

    /// `CREATED`
    #[must_use]
    pub fn created(reactor: &Reactor) -> Self {
        Self::of(reactor, StatusChange::Created)
    }

    /// `HIT`
    #[must_use]
    pub fn hit(reactor: &Reactor) -> Self {
        Self::of(reactor, StatusChange::Hit)
    }

    /// `DESTROYED`
    #[must_use]
    pub fn destroyed(reactor: &Reactor) -> Self {
        Self::of(reactor, StatusChange::Destroyed)
    }
}

impl Event for ReactorStatus {
    fn event_type(&self) -> &'static str {
        match self.change {
            StatusChange::Created(_) => "CREATED",
            StatusChange::Hit(_) => "HIT",
            StatusChange::Destroyed(_) => "DESTROYED",
        }
    }
}

// ---------------------------------------------------------------------------
// Scripting commands
// ---------------------------------------------------------------------------

/// Command for the reactor scripting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorAction {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Map id
    pub map_id: u32,
    /// Reactor id
    pub reactor_id: u32,
    /// Classification, as the script key
    pub classification: String,
    /// Reactor name
    pub reactor_name: String,
    /// State when the action was raised
    pub reactor_state: i8,
    /// Horizontal position
    pub x: i16,
    /// Vertical position
    pub y: i16,
    /// What the script should run
    #[serde(flatten)]
    pub action: ActionKind,
}

/// Scripting discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Reactor was hit
    Hit {
        /// Character that hit it
        #[serde(rename = "characterId")]
        character_id: u32,
        /// Skill used
        #[serde(rename = "skillId")]
        skill_id: u32,
        /// Whether a skill was used
        #[serde(rename = "isSkill")]
        is_skill: bool,
    },
    /// Reactor is spent
    Trigger {
        /// Character that finished it
        #[serde(rename = "characterId")]
        character_id: u32,
    },
}

impl ReactorAction {
    fn of(reactor: &Reactor, action: ActionKind) -> Self {
        let field = reactor.field();
        Self {
            world_id: field.world,
            channel_id: field.channel,
            map_id: field.map,
            reactor_id: reactor.id(),
            classification: reactor.classification().to_string(),
            reactor_name: reactor.name().to_string(),
            reactor_state: reactor.state(),
            x: reactor.x(),
            y: reactor.y(),
            action,
        }
    }

    /// `HIT` for scripts.
    #[must_use]
    pub fn hit(reactor: &Reactor, character_id: u32, skill_id: u32) -> Self {
        Self::of(
            reactor,
            ActionKind::Hit {
                character_id,
                skill_id,
                is_skill: skill_id != 0,
            },
        )
    }

    /// `TRIGGER` for scripts.
    #[must_use]
    pub fn trigger(reactor: &Reactor, character_id: u32) -> Self {
        Self::of(reactor, ActionKind::Trigger { character_id })
    }
}

impl Event for ReactorAction {
    fn event_type(&self) -> &'static str {
        match self.action {
            ActionKind::Hit { .. } => "HIT",
            ActionKind::Trigger { .. } => "TRIGGER",
        }
    }
}
