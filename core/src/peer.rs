//! Peer service capabilities.
//!
//! Services never talk to a transport directly. Each peer is a small trait
//! returning domain types, so the lazy initializers and processors can run
//! against HTTP clients (`realm-peers`), bus RPC, or in-process stubs
//! (`realm-testing`) without change.

use crate::registry::MapKey;
use crate::tenant::Tenant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors returned by peer capabilities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// The peer answered that the entity does not exist
    #[error("{peer} [{id}] not found")]
    NotFound {
        /// Peer service name
        peer: &'static str,
        /// Requested id
        id: String,
    },

    /// The request failed or timed out
    #[error("{peer} unavailable: {reason}")]
    Unavailable {
        /// Peer service name
        peer: &'static str,
        /// Failure detail
        reason: String,
    },

    /// The response could not be decoded
    #[error("{peer} returned an unreadable response: {reason}")]
    Decode {
        /// Peer service name
        peer: &'static str,
        /// Failure detail
        reason: String,
    },
}

/// Peer names carried in errors and metric labels.
pub mod names {
    /// Character service
    pub const CHARACTER: &str = "character";
    /// Inventory service
    pub const INVENTORY: &str = "inventory";
    /// Buff service
    pub const BUFFS: &str = "buffs";
    /// Skill service
    pub const SKILLS: &str = "skills";
    /// Static game data
    pub const DATA: &str = "data";
    /// Quest service
    pub const QUESTS: &str = "quests";
    /// Map service
    pub const MAPS: &str = "maps";
    /// Party service
    pub const PARTIES: &str = "parties";
    /// Guild service
    pub const GUILDS: &str = "guilds";
    /// Monster service
    pub const MONSTERS: &str = "monsters";
}

/// Boxed future returned by every capability.
pub type PeerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PeerError>> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Characters
// ---------------------------------------------------------------------------

/// Character attributes owned by the character service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterData {
    /// Character id
    pub id: u32,
    /// World id
    pub world_id: u8,
    /// Level
    pub level: u8,
    /// Current map
    pub map_id: u32,
    /// Base strength
    pub strength: u16,
    /// Base dexterity
    pub dexterity: u16,
    /// Base intelligence
    pub intelligence: u16,
    /// Base luck
    pub luck: u16,
    /// Current HP
    pub hp: u16,
    /// Base max HP
    pub max_hp: u16,
    /// Current MP
    pub mp: u16,
    /// Base max MP
    pub max_mp: u16,
}

/// Character service.
pub trait CharacterPeer: Send + Sync {
    /// Fetch a character by id.
    fn character_by_id(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, CharacterData>;
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Stat block of an equipable asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EquipmentStats {
    /// Strength
    pub strength: u16,
    /// Dexterity
    pub dexterity: u16,
    /// Intelligence
    pub intelligence: u16,
    /// Luck
    pub luck: u16,
    /// Max HP
    pub hp: u16,
    /// Max MP
    pub mp: u16,
    /// Weapon attack
    pub weapon_attack: u16,
    /// Magic attack
    pub magic_attack: u16,
    /// Weapon defense
    pub weapon_defense: u16,
    /// Magic defense
    pub magic_defense: u16,
    /// Accuracy
    pub accuracy: u16,
    /// Avoidability
    pub avoidability: u16,
    /// Speed
    pub speed: u16,
    /// Jump
    pub jump: u16,
}

/// An inventory asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Asset id
    pub id: u32,
    /// Slot; negative slots are equipped
    pub slot: i16,
    /// Item template id
    pub template_id: u32,
    /// Equipment stats, for equipable assets
    #[serde(default)]
    pub stats: Option<EquipmentStats>,
    /// When the asset was created (cash coupons count time from here)
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When the asset was last equipped
    #[serde(default)]
    pub equipped_since: Option<DateTime<Utc>>,
}

impl Asset {
    /// Whether the asset occupies an equipment slot.
    #[must_use]
    pub const fn is_equipped(&self) -> bool {
        self.slot < 0
    }
}

/// Inventory service.
pub trait InventoryPeer: Send + Sync {
    /// Every asset in the equipment compartment (equipped and not).
    fn equip_compartment(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<Asset>>;

    /// Every asset in the cash compartment.
    fn cash_compartment(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<Asset>>;
}

// ---------------------------------------------------------------------------
// Buffs
// ---------------------------------------------------------------------------

/// One stat change carried by a buff or a passive skill effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatChange {
    /// Stat name (e.g. `PAD`, `HYPER_BODY_HP`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Signed amount
    pub amount: i32,
}

/// An active buff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buff {
    /// Skill or item that produced the buff
    pub source_id: i32,
    /// Stat changes applied while active
    #[serde(default)]
    pub changes: Vec<StatChange>,
    /// Expiry instant
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Buff service.
pub trait BuffPeer: Send + Sync {
    /// Active buffs of a character.
    fn character_buffs(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<Buff>>;
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// A skill a character has learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSkill {
    /// Skill id
    pub id: u32,
    /// Learned level; 0 means not learned
    pub level: u8,
}

/// Skill service.
pub trait SkillPeer: Send + Sync {
    /// Skills of a character.
    fn character_skills(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<CharacterSkill>>;
}

// ---------------------------------------------------------------------------
// Game data
// ---------------------------------------------------------------------------

/// Effect of a skill at one level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillEffect {
    /// Weapon attack
    pub weapon_attack: i16,
    /// Magic attack
    pub magic_attack: i16,
    /// Weapon defense
    pub weapon_defense: i16,
    /// Magic defense
    pub magic_defense: i16,
    /// Accuracy
    pub accuracy: i16,
    /// Avoidability
    pub avoidability: i16,
    /// Speed
    pub speed: i16,
    /// Jump
    pub jump: i16,
    /// Max HP
    pub hp: i16,
    /// Max MP
    pub mp: i16,
    /// Additional named stat ups
    pub statups: Vec<StatChange>,
}

/// Static skill definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillData {
    /// Skill id
    pub id: u32,
    /// Whether the skill is cast (active) rather than passive
    #[serde(default)]
    pub action: bool,
    /// Effects indexed by level - 1
    #[serde(default)]
    pub effects: Vec<SkillEffect>,
}

impl SkillData {
    /// Passive skills apply without being cast.
    #[must_use]
    pub const fn is_passive(&self) -> bool {
        !self.action
    }

    /// Effect at a learned level (1-based).
    #[must_use]
    pub fn effect_for_level(&self, level: u8) -> Option<&SkillEffect> {
        usize::from(level)
            .checked_sub(1)
            .and_then(|index| self.effects.get(index))
    }
}

/// Weekly activity window of a cash coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// `MON`..`SUN`, or `HOL` for holidays
    pub day: String,
    /// First active hour (inclusive)
    pub start_hour: u8,
    /// Last active hour (exclusive); 24 means through midnight
    pub end_hour: u8,
}

/// Static cash item definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashItemData {
    /// Template id
    pub id: u32,
    /// Rate multiplier (0 when the item is not a coupon)
    #[serde(default)]
    pub rate: f64,
    /// Active duration in minutes; 0 means permanent
    #[serde(default)]
    pub time_minutes: i32,
    /// Weekly windows; empty means always active
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
}

impl CashItemData {
    /// Whether the item affects a rate.
    #[must_use]
    pub fn has_rate_properties(&self) -> bool {
        self.rate > 0.0
    }
}

/// One tier of a bonus-EXP equipment item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusExpTier {
    /// Bonus percent
    pub inc_exp_r: u32,
    /// Hours equipped before the tier applies
    pub term_start_hours: u32,
}

/// Static equipment definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentData {
    /// Template id
    pub id: u32,
    /// Bonus-EXP tiers
    #[serde(default)]
    pub bonus_exp: Vec<BonusExpTier>,
}

impl EquipmentData {
    /// Whether the item grants time-scaled bonus EXP.
    #[must_use]
    pub fn has_bonus_exp(&self) -> bool {
        !self.bonus_exp.is_empty()
    }
}

/// A 2D point in map coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: i16,
    /// Vertical coordinate
    pub y: i16,
}

/// Item requirement of an item-activated reactor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorItem {
    /// Item template that activates the reactor
    pub item_id: u32,
    /// Quantity that must be dropped
    pub quantity: u16,
    /// Top-left corner of the activation area, relative to the reactor
    pub lt: Point,
    /// Bottom-right corner of the activation area, relative to the reactor
    pub rb: Point,
}

/// One outbound event of a reactor state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorStateEvent {
    /// Game-data event type
    #[serde(rename = "type")]
    pub event_type: i32,
    /// State this event leads to
    pub next_state: i8,
    /// Skills that trigger this event; empty means any
    #[serde(default)]
    pub active_skills: Vec<u32>,
    /// Item requirement, for item-activated states
    #[serde(default)]
    pub item: Option<ReactorItem>,
}

/// Static reactor definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorData {
    /// Display name
    pub name: String,
    /// Outbound events per state
    #[serde(default)]
    pub state_info: BTreeMap<i8, Vec<ReactorStateEvent>>,
    /// Per-state timeout in ms
    #[serde(default)]
    pub timeout_info: BTreeMap<i8, i32>,
}

/// Static game data service.
pub trait GameDataPeer: Send + Sync {
    /// Skill definition.
    fn skill_data(&self, tenant: &Tenant, skill_id: u32) -> PeerFuture<'_, SkillData>;

    /// Cash item definition.
    fn cash_item_data(&self, tenant: &Tenant, template_id: u32) -> PeerFuture<'_, CashItemData>;

    /// Equipment definition.
    fn equipment_data(&self, tenant: &Tenant, template_id: u32) -> PeerFuture<'_, EquipmentData>;

    /// Reactor definition.
    fn reactor_data(&self, tenant: &Tenant, classification: u32) -> PeerFuture<'_, ReactorData>;
}

// ---------------------------------------------------------------------------
// Quests, maps, parties
// ---------------------------------------------------------------------------

/// Progress of one quest for one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestState {
    /// Never started
    NotStarted,
    /// In progress
    Started,
    /// Completed
    Completed,
}

/// Quest progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestStatus {
    /// Quest id
    pub quest_id: u32,
    /// Progress
    pub state: QuestState,
}

/// Quest service.
pub trait QuestPeer: Send + Sync {
    /// Progress of one quest; characters that never touched it report `NotStarted`.
    fn quest_status(&self, tenant: &Tenant, character_id: u32, quest_id: u32) -> PeerFuture<'_, QuestStatus>;
}

/// Map service.
pub trait MapPeer: Send + Sync {
    /// Number of characters in a field.
    fn player_count(&self, tenant: &Tenant, world: u8, channel: u8, map: u32) -> PeerFuture<'_, u32>;
}

/// Party roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    /// Party id
    pub id: u32,
    /// Leader character id
    pub leader_id: u32,
    /// Member character ids, leader included
    pub members: Vec<u32>,
}

/// Party service.
pub trait PartyPeer: Send + Sync {
    /// Party by id.
    fn party(&self, tenant: &Tenant, party_id: u32) -> PeerFuture<'_, Party>;

    /// Party a character belongs to.
    fn party_of(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Party>;
}

/// Guild roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guild {
    /// Guild id
    pub id: u32,
    /// Member character ids
    pub members: Vec<u32>,
}

/// Guild service.
pub trait GuildPeer: Send + Sync {
    /// Guild a character belongs to.
    fn guild_of(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Guild>;
}

/// Monster to place in a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterSpawn {
    /// Monster template id
    pub monster_id: u32,
    /// Spawn x
    pub x: i16,
    /// Spawn y
    pub y: i16,
    /// Foothold id
    pub fh: i16,
}

/// Monster service.
pub trait MonsterPeer: Send + Sync {
    /// Spawn one monster in `field`.
    fn spawn_monster(&self, tenant: &Tenant, field: &MapKey, spawn: MonsterSpawn) -> PeerFuture<'_, ()>;

    /// Remove every monster in `field`. An empty field is not an error.
    fn destroy_monsters(&self, tenant: &Tenant, field: &MapKey) -> PeerFuture<'_, ()>;
}
