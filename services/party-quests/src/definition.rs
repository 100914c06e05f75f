//! Party-quest definitions.
//!
//! A definition is catalog data: how characters register, the stages they
//! play through, what each stage needs to clear and what it pays out. Runtime
//! progress lives on [`Instance`](crate::model::Instance), never here.

use realm_core::catalog::Document;
use realm_core::{RealmError, RealmResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A party quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    /// Catalog id; assigned on create when nil
    #[serde(default)]
    pub id: Uuid,
    /// Quest id, unique per tenant (`"kpq"`, `"lpq"`)
    pub quest_id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Field lock mode
    #[serde(default)]
    pub field_lock: String,
    /// Global time limit in seconds; 0 means none
    #[serde(default)]
    pub duration: u64,
    /// How characters enter
    pub registration: Registration,
    /// Checked by the caller before registering
    #[serde(default)]
    pub start_requirements: Vec<Condition>,
    /// Map everyone is sent to on the way out
    #[serde(default)]
    pub exit: u32,
    /// Optional round after completion
    #[serde(default)]
    pub bonus: Option<Bonus>,
    /// Stages in play order
    #[serde(default)]
    pub stages: Vec<Stage>,
    /// Paid on completion
    #[serde(default)]
    pub rewards: Vec<Reward>,
}

impl Definition {
    /// Check invariants and put stages in index order.
    ///
    /// # Errors
    ///
    /// Validation on an empty quest id, a timed registration without a
    /// window, or duplicate stage indices.
    pub fn prepare(mut self) -> RealmResult<Self> {
        if self.quest_id.trim().is_empty() {
            return Err(RealmError::validation("party quest definition needs a quest id"));
        }
        if self.registration.mode == RegistrationMode::Timed && self.registration.duration == 0 {
            return Err(RealmError::validation(format!(
                "timed registration for [{}] needs a duration",
                self.quest_id
            )));
        }
        self.stages.sort_by_key(|s| s.index);
        if self.stages.windows(2).any(|w| w[0].index == w[1].index) {
            return Err(RealmError::validation(format!(
                "party quest [{}] has duplicate stage indices",
                self.quest_id
            )));
        }
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        Ok(self)
    }

    /// Stage at a play position.
    #[must_use]
    pub fn stage(&self, position: u32) -> Option<&Stage> {
        usize::try_from(position).ok().and_then(|i| self.stages.get(i))
    }

    /// Map ids of the stage at a play position; empty past the end.
    #[must_use]
    pub fn stage_maps(&self, position: u32) -> &[u32] {
        self.stage(position).map_or(&[], |s| s.map_ids.as_slice())
    }

    /// Number of stages.
    #[must_use]
    pub fn stage_count(&self) -> u32 {
        u32::try_from(self.stages.len()).unwrap_or(u32::MAX)
    }
}

impl Document for Definition {
    const COLLECTION: &'static str = "party_quests";

    fn document_id(&self) -> Uuid {
        self.id
    }

    fn lookup_key(&self) -> String {
        self.quest_id.clone()
    }
}

/// Registration rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Who registers
    #[serde(rename = "type")]
    pub kind: RegistrationType,
    /// When the run starts
    pub mode: RegistrationMode,
    /// Timed window in seconds
    #[serde(default)]
    pub duration: u64,
    /// Map registration happens on; 0 means anywhere
    #[serde(default)]
    pub map_id: u32,
    /// Grouping for individual registration
    #[serde(default)]
    pub affinity: Affinity,
}

/// Who registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationType {
    /// A party leader registers the whole party
    Party,
    /// Characters register one at a time
    Individual,
}

/// When a registered instance starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationMode {
    /// Right away
    Instant,
    /// When the registration window closes
    Timed,
}

/// How individual registrants are grouped into instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affinity {
    /// Anyone on the same world and channel
    #[default]
    None,
    /// Members of the same party
    Party,
    /// Members of the same guild
    Guild,
}

/// Round after completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bonus {
    /// Bonus map
    pub map_id: u32,
    /// Time limit in seconds; 0 means none
    #[serde(default)]
    pub duration: u64,
    /// How the round is entered
    pub entry: BonusEntry,
    /// Where characters wait for a manual entry; 0 means stay put
    #[serde(default)]
    pub completion_map_id: u32,
}

/// How the bonus round is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusEntry {
    /// As soon as the quest completes
    Auto,
    /// On an explicit enter-bonus command
    Manual,
}

/// One stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Play position
    pub index: u32,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Stage kind
    #[serde(rename = "type")]
    pub kind: StageType,
    /// Maps of the stage; characters are warped to the first
    #[serde(default)]
    pub map_ids: Vec<u32>,
    /// Time limit in seconds; 0 means none
    #[serde(default)]
    pub duration: u64,
    /// Whether advancing out of this stage warps
    #[serde(default)]
    pub warp_type: WarpType,
    /// All must hold to clear
    #[serde(default)]
    pub clear_conditions: Vec<Condition>,
    /// Paid on clear
    #[serde(default)]
    pub rewards: Vec<Reward>,
    /// Run against the stage maps on clear
    #[serde(default)]
    pub clear_actions: Vec<ClearAction>,
    /// Free-form settings (`digits`, `positions`, `friendlyMonster`, ...)
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Stage {
    /// Numeric property, if present.
    #[must_use]
    pub fn property_u32(&self, key: &str) -> Option<u32> {
        self.properties
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Escort monster of the stage. A block without `monsterId` is no escort.
    #[must_use]
    pub fn friendly_monster(&self) -> Option<FriendlyMonster> {
        let value = self.properties.get("friendlyMonster")?;
        serde_json::from_value(value.clone()).ok()
    }
}

/// Side effect of clearing a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearAction {
    /// Remove every monster from the stage maps
    DestroyMonsters,
    /// Unrecognized; logged and skipped
    #[serde(other)]
    Other,
}

/// Monster the party has to keep alive through a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendlyMonster {
    /// Monster template
    pub monster_id: u32,
    /// Spawn x
    #[serde(default)]
    pub x: i16,
    /// Spawn y
    #[serde(default)]
    pub y: i16,
    /// Foothold id
    #[serde(default)]
    pub fh: i16,
    /// Broadcast once the monster is placed
    #[serde(default)]
    pub spawn_message: String,
    /// Hit announcements
    #[serde(default)]
    pub on_damaged: OnDamaged,
    /// Death handling
    #[serde(default)]
    pub on_killed: OnKilled,
    /// Drop announcements
    #[serde(default)]
    pub on_drop: OnDrop,
}

/// Broadcast `message` every `hit_interval` hits. Zero disables it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDamaged {
    /// Hits between announcements
    #[serde(default)]
    pub hit_interval: u32,
    /// Announcement
    #[serde(default)]
    pub message: String,
}

/// What the death of the escort does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnKilled {
    /// Broadcast on death
    #[serde(default)]
    pub message: String,
    /// Consequence
    #[serde(default)]
    pub action: KilledAction,
}

/// Consequence of losing the escort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KilledAction {
    /// Fail and tear down the instance
    Fail,
    /// Only the message
    #[default]
    #[serde(other)]
    None,
}

/// Drop announcement; `{count}` becomes the running item total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDrop {
    /// Announcement template
    #[serde(default)]
    pub message_template: String,
}

/// Stage kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    /// Collect items
    ItemCollection,
    /// Kill monsters
    MonsterKilling,
    /// Guess a generated combination
    CombinationPuzzle,
    /// Find the right portals
    WarpPuzzle,
    /// Timed bonus round; expiry ends the run
    Bonus,
    /// Script-driven
    #[serde(other)]
    Custom,
}

/// Warp behavior on advance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarpType {
    /// Stay; scripts move characters
    None,
    /// Warp to the next stage's first map
    #[default]
    #[serde(other)]
    Auto,
}

/// One clear condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// What is compared
    #[serde(rename = "type")]
    pub kind: ConditionType,
    /// Item or monster id
    #[serde(default)]
    pub reference_id: u32,
    /// Custom data key
    #[serde(default)]
    pub reference_key: String,
    /// Comparison
    pub operator: Operator,
    /// Threshold
    pub value: u32,
}

/// Condition subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    /// Stage item counter
    Item,
    /// Stage kill counter
    MonsterKill,
    /// Stage custom value by key
    CustomData,
    /// Anything else; always holds
    #[serde(other)]
    Unknown,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// Anything else; never holds
    #[serde(other)]
    Unknown,
}

/// A payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    /// Payout kind
    #[serde(rename = "type")]
    pub kind: RewardType,
    /// Amount
    #[serde(default)]
    pub amount: u32,
}

/// Payout kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    /// Experience to every participant
    Experience,
    /// Handled elsewhere
    #[serde(other)]
    Other,
}
