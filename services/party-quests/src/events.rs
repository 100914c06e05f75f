//! Messages consumed and published by the party-quests service.

use crate::model::{CharacterEntry, Instance};
use realm_core::event::Event;
use realm_core::topic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Status topic variable.
pub const EVENT_TOPIC_PARTY_QUEST_STATUS: &str = "EVENT_TOPIC_PARTY_QUEST_STATUS";
/// Inbound command topic variable.
pub const COMMAND_TOPIC_PARTY_QUEST: &str = "COMMAND_TOPIC_PARTY_QUEST";
/// Character command topic variable.
pub const COMMAND_TOPIC_CHARACTER: &str = "COMMAND_TOPIC_CHARACTER";
/// Reactor command topic variable.
pub const COMMAND_TOPIC_REACTOR: &str = "COMMAND_TOPIC_REACTOR";
/// System message command topic variable.
pub const COMMAND_TOPIC_SYSTEM_MESSAGE: &str = "COMMAND_TOPIC_SYSTEM_MESSAGE";

/// Experience distribution kind used for quest payouts.
pub const EXPERIENCE_TYPE_CHAT: &str = "CHAT";

/// Resolved topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Instance lifecycle events
    pub status: String,
    /// `CHANGE_MAP`, `AWARD_EXPERIENCE`
    pub character: String,
    /// `DESTROY_IN_FIELD`
    pub reactor: String,
    /// `SEND_MESSAGE`
    pub system_message: String,
}

impl Topics {
    /// Resolve from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            status: topic::resolve(EVENT_TOPIC_PARTY_QUEST_STATUS),
            character: topic::resolve(COMMAND_TOPIC_CHARACTER),
            reactor: topic::resolve(COMMAND_TOPIC_REACTOR),
            system_message: topic::resolve(COMMAND_TOPIC_SYSTEM_MESSAGE),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound commands
// ---------------------------------------------------------------------------

/// Command from a character or script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyQuestCommand {
    /// World id
    pub world_id: u8,
    /// Issuing character
    #[serde(default)]
    pub character_id: u32,
    /// What to do
    #[serde(flatten)]
    pub kind: CommandKind,
}

/// Command discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// Register for a quest
    Register(RegisterBody),
    /// Start a registering instance
    Start(InstanceBody),
    /// Check the current stage's clear conditions
    StageClearAttempt(InstanceBody),
    /// Move to the next stage
    StageAdvance(InstanceBody),
    /// Clear the current stage without checking, then advance
    ForceStageComplete(InstanceBody),
    /// Give up
    Forfeit(InstanceBody),
    /// The issuing character leaves its instance
    Leave,
    /// Add counter deltas
    UpdateStageState(UpdateStageStateBody),
    /// Set or bump custom values
    UpdateCustomData(UpdateCustomDataBody),
    /// Message every participant
    BroadcastMessage(BroadcastMessageBody),
    /// Enter the bonus round
    EnterBonus(InstanceBody),
}

impl Event for PartyQuestCommand {
    fn event_type(&self) -> &'static str {
        match self.kind {
            CommandKind::Register(_) => "REGISTER",
            CommandKind::Start(_) => "START",
            CommandKind::StageClearAttempt(_) => "STAGE_CLEAR_ATTEMPT",
            CommandKind::StageAdvance(_) => "STAGE_ADVANCE",
            CommandKind::ForceStageComplete(_) => "FORCE_STAGE_COMPLETE",
            CommandKind::Forfeit(_) => "FORFEIT",
            CommandKind::Leave => "LEAVE",
            CommandKind::UpdateStageState(_) => "UPDATE_STAGE_STATE",
            CommandKind::UpdateCustomData(_) => "UPDATE_CUSTOM_DATA",
            CommandKind::BroadcastMessage(_) => "BROADCAST_MESSAGE",
            CommandKind::EnterBonus(_) => "ENTER_BONUS",
        }
    }
}

/// Body of a REGISTER command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    /// Quest to register for
    pub quest_id: String,
    /// Registering party; 0 when alone
    #[serde(default)]
    pub party_id: u32,
    /// Channel the run happens on
    pub channel_id: u8,
    /// Map the character stands on
    #[serde(default)]
    pub map_id: u32,
}

/// Body naming an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceBody {
    /// Target instance
    pub instance_id: Uuid,
}

/// Body of UPDATE_STAGE_STATE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStageStateBody {
    /// Target instance
    pub instance_id: Uuid,
    /// Item count deltas
    #[serde(default)]
    pub item_counts: BTreeMap<u32, u32>,
    /// Kill deltas
    #[serde(default)]
    pub monster_kills: BTreeMap<u32, u32>,
}

/// Body of UPDATE_CUSTOM_DATA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomDataBody {
    /// Target instance
    pub instance_id: Uuid,
    /// Values to set
    #[serde(default)]
    pub updates: BTreeMap<String, String>,
    /// Keys to bump by one
    #[serde(default)]
    pub increments: Vec<String>,
}

/// Body of BROADCAST_MESSAGE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessageBody {
    /// Target instance
    pub instance_id: Uuid,
    /// Client message kind
    pub message_type: String,
    /// Text
    pub message: String,
}

// ---------------------------------------------------------------------------
// Status events
// ---------------------------------------------------------------------------

/// Instance lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyQuestStatus {
    /// World id
    pub world_id: u8,
    /// Instance id
    pub instance_id: Uuid,
    /// Quest id
    pub quest_id: String,
    /// What happened
    #[serde(flatten)]
    pub change: StatusChange,
}

impl PartyQuestStatus {
    /// Event about an instance.
    #[must_use]
    pub fn of(instance: &Instance, change: StatusChange) -> Self {
        Self {
            world_id: instance.world_id(),
            instance_id: instance.id(),
            quest_id: instance.quest_id().to_string(),
            change,
        }
    }
}

/// Status discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusChange {
    /// A new instance exists
    #[serde(rename_all = "camelCase")]
    InstanceCreated {
        /// Registering party
        party_id: u32,
        /// Channel id
        channel_id: u8,
    },
    /// Timed registration is open
    RegistrationOpened {
        /// Window in seconds
        duration: u64,
    },
    /// A character joined a registering instance
    #[serde(rename_all = "camelCase")]
    CharacterRegistered {
        /// Character id
        character_id: u32,
    },
    /// Play began
    #[serde(rename_all = "camelCase")]
    Started {
        /// Stage position
        stage_index: u32,
        /// Stage maps
        map_ids: Vec<u32>,
    },
    /// The current stage cleared
    #[serde(rename_all = "camelCase")]
    StageCleared {
        /// Stage position
        stage_index: u32,
        /// Channel id
        channel_id: u8,
        /// Stage maps
        map_ids: Vec<u32>,
        /// Field instances of the stage maps
        field_instances: Vec<Uuid>,
    },
    /// Play moved to another stage
    #[serde(rename_all = "camelCase")]
    StageAdvanced {
        /// Stage position
        stage_index: u32,
        /// Stage maps
        map_ids: Vec<u32>,
    },
    /// Every stage cleared
    Completed {},
    /// The bonus round began
    #[serde(rename_all = "camelCase")]
    BonusEntered {
        /// Bonus map
        map_id: u32,
    },
    /// Forfeited or timed out
    Failed {
        /// `forfeit` or `time_expired`
        reason: String,
    },
    /// A character left
    #[serde(rename_all = "camelCase")]
    CharacterLeft {
        /// Character id
        character_id: u32,
        /// Channel id
        channel_id: u8,
        /// Why
        reason: String,
    },
    /// The instance is gone
    InstanceDestroyed {
        /// Why
        reason: String,
    },
}

impl Event for PartyQuestStatus {
    fn event_type(&self) -> &'static str {
        match self.change {
            StatusChange::InstanceCreated { .. } => "INSTANCE_CREATED",
            StatusChange::RegistrationOpened { .. } => "REGISTRATION_OPENED",
            StatusChange::CharacterRegistered { .. } => "CHARACTER_REGISTERED",
            StatusChange::Started { .. } => "STARTED",
            StatusChange::StageCleared { .. } => "STAGE_CLEARED",
            StatusChange::StageAdvanced { .. } => "STAGE_ADVANCED",
            StatusChange::Completed {} => "COMPLETED",
            StatusChange::BonusEntered { .. } => "BONUS_ENTERED",
            StatusChange::Failed { .. } => "FAILED",
            StatusChange::CharacterLeft { .. } => "CHARACTER_LEFT",
            StatusChange::InstanceDestroyed { .. } => "INSTANCE_DESTROYED",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound commands
// ---------------------------------------------------------------------------

/// Command for the character service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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
    /// Warp a character into a field instance; nil for the shared map.
    #[must_use]
    pub const fn change_map(entry: &CharacterEntry, map_id: u32, instance: Uuid) -> Self {
        Self {
            world_id: entry.world_id,
            channel_id: entry.channel_id,
            character_id: entry.character_id,
            kind: CharacterCommandKind::ChangeMap(ChangeMapBody {
                map_id,
                instance,
                portal_id: 0,
            }),
        }
    }

    /// Pay experience to a character.
    #[must_use]
    pub fn award_experience(entry: &CharacterEntry, amount: u32) -> Self {
        Self {
            world_id: entry.world_id,
            channel_id: entry.channel_id,
            character_id: entry.character_id,
            kind: CharacterCommandKind::AwardExperience(AwardExperienceBody {
                distributions: vec![ExperienceDistribution {
                    experience_type: EXPERIENCE_TYPE_CHAT.to_string(),
                    amount,
                }],
            }),
        }
    }
}

/// Character command discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharacterCommandKind {
    /// Warp
    ChangeMap(ChangeMapBody),
    /// Pay experience
    AwardExperience(AwardExperienceBody),
}

impl Event for CharacterCommand {
    fn event_type(&self) -> &'static str {
        match self.kind {
            CharacterCommandKind::ChangeMap(_) => "CHANGE_MAP",
            CharacterCommandKind::AwardExperience(_) => "AWARD_EXPERIENCE",
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

/// Body of AWARD_EXPERIENCE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardExperienceBody {
    /// Amounts by kind
    pub distributions: Vec<ExperienceDistribution>,
}

/// One experience amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceDistribution {
    /// Distribution kind
    pub experience_type: String,
    /// Amount
    pub amount: u32,
}

/// Command for the reactors of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorFieldCommand {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Map id
    pub map_id: u32,
    /// Field instance
    pub instance: Uuid,
    /// What to do
    #[serde(flatten)]
    pub kind: ReactorCommandKind,
}

/// Reactor command discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactorCommandKind {
    /// Remove every reactor of the field
    DestroyInField,
}

impl ReactorFieldCommand {
    /// Clear the reactors of one of an instance's maps.
    #[must_use]
    pub const fn destroy_in_field(instance: &Instance, map_id: u32) -> Self {
        Self {
            world_id: instance.world_id(),
            channel_id: instance.channel_id(),
            map_id,
            instance: instance.id(),
            kind: ReactorCommandKind::DestroyInField,
        }
    }
}

impl Event for ReactorFieldCommand {
    fn event_type(&self) -> &'static str {
        match self.kind {
            ReactorCommandKind::DestroyInField => "DESTROY_IN_FIELD",
        }
    }
}

/// Command for the system message service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessageCommand {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Recipient
    pub character_id: u32,
    /// What to do
    #[serde(flatten)]
    pub kind: SystemMessageKind,
}

/// System message discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemMessageKind {
    /// Show a message
    SendMessage(SendMessageBody),
}

/// Body of SEND_MESSAGE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    /// Client message kind
    pub message_type: String,
    /// Text
    pub message: String,
}

impl SystemMessageCommand {
    /// Message one character.
    #[must_use]
    pub fn send(entry: &CharacterEntry, message_type: &str, message: &str) -> Self {
        Self {
            world_id: entry.world_id,
            channel_id: entry.channel_id,
            character_id: entry.character_id,
            kind: SystemMessageKind::SendMessage(SendMessageBody {
                message_type: message_type.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

impl Event for SystemMessageCommand {
    fn event_type(&self) -> &'static str {
        match self.kind {
            SystemMessageKind::SendMessage(_) => "SEND_MESSAGE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_command_decodes() {
        let command: PartyQuestCommand = serde_json::from_value(json!({
            "worldId": 0,
            "characterId": 1001,
            "type": "REGISTER",
            "body": { "questId": "kpq", "partyId": 7, "channelId": 2 }
        }))
        .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(command.event_type(), "REGISTER");
        let CommandKind::Register(body) = command.kind else {
            unreachable!("not a register command");
        };
        assert_eq!(body.party_id, 7);
        assert_eq!(body.map_id, 0);
    }

    #[test]
    fn leave_needs_no_body() {
        let command: PartyQuestCommand =
            serde_json::from_value(json!({ "worldId": 0, "characterId": 5, "type": "LEAVE" }))
                .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(command.kind, CommandKind::Leave);
    }

    #[test]
    fn stage_state_deltas_use_numeric_keys() {
        let command: PartyQuestCommand = serde_json::from_value(json!({
            "worldId": 0,
            "type": "UPDATE_STAGE_STATE",
            "body": {
                "instanceId": Uuid::nil(),
                "itemCounts": { "4001007": 3 }
            }
        }))
        .unwrap_or_else(|e| unreachable!("{e}"));
        let CommandKind::UpdateStageState(body) = command.kind else {
            unreachable!("not an update");
        };
        assert_eq!(body.item_counts.get(&4_001_007), Some(&3));
        assert!(body.monster_kills.is_empty());
    }

    #[test]
    fn status_body_is_camel_case() {
        let status = PartyQuestStatus {
            world_id: 1,
            instance_id: Uuid::nil(),
            quest_id: "kpq".into(),
            change: StatusChange::StageCleared {
                stage_index: 0,
                channel_id: 2,
                map_ids: vec![103_000_800],
                field_instances: vec![Uuid::nil()],
            },
        };
        let value = serde_json::to_value(&status).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(value["type"], "STAGE_CLEARED");
        assert_eq!(value["body"]["stageIndex"], 0);
        assert_eq!(value["body"]["fieldInstances"][0], Uuid::nil().to_string());
        assert_eq!(value["questId"], "kpq");
    }

    #[test]
    fn destroy_in_field_matches_the_reactor_command_shape() {
        let value = serde_json::to_value(ReactorFieldCommand {
            world_id: 0,
            channel_id: 1,
            map_id: 103_000_800,
            instance: Uuid::nil(),
            kind: ReactorCommandKind::DestroyInField,
        })
        .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(value["type"], "DESTROY_IN_FIELD");
        assert_eq!(value["mapId"], 103_000_800);
    }
}
