//! Party-quest instances and their lifecycle.

use crate::definition::{Definition, Stage, StageType};
use chrono::{DateTime, Utc};
use rand::Rng;
use realm_core::RealmResult;
use realm_core::registry::{ContainerKey, Record};
use realm_core::state_machine::TransitionTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Digits and positions of a combination when the stage does not say.
const DEFAULT_COMBINATION: u32 = 3;

/// Where an instance is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Collecting characters
    Registering,
    /// Playing a stage
    Active,
    /// Stage cleared, waiting to advance
    Clearing,
    /// Every stage cleared
    Completed,
    /// Playing the bonus round
    Bonus,
    /// Forfeited or timed out
    Failed,
}

impl InstanceState {
    /// Lowercase name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registering => "registering",
            Self::Active => "active",
            Self::Clearing => "clearing",
            Self::Completed => "completed",
            Self::Bonus => "bonus",
            Self::Failed => "failed",
        }
    }

    /// Whether a character may leave in this state.
    #[must_use]
    pub const fn is_leavable(self) -> bool {
        matches!(self, Self::Active | Self::Clearing | Self::Completed | Self::Bonus)
    }
}

/// What drives a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Registration closed
    Start,
    /// Clear conditions met, or forced
    Clear,
    /// Move on; `last` when no stage follows
    Advance {
        /// The current stage is the last one
        last: bool,
    },
    /// Enter the bonus round
    EnterBonus,
    /// Forfeit or global timeout
    Fail,
}

/// Lifecycle table shared by every instance.
///
/// # Errors
///
/// Only if the table itself is malformed.
pub fn lifecycle() -> RealmResult<TransitionTable<InstanceState, Instance, Signal>> {
    use InstanceState::{Active, Bonus, Clearing, Completed, Failed, Registering};

    TransitionTable::builder(Registering)
        .transition(Registering, Active, |_, s| *s == Signal::Start)
        .transition(Registering, Failed, |_, s| *s == Signal::Fail)
        .transition(Active, Clearing, |_, s| *s == Signal::Clear)
        .transition(Active, Active, |_, s| *s == Signal::Advance { last: false })
        .transition(Active, Completed, |_, s| *s == Signal::Advance { last: true })
        .transition(Active, Failed, |_, s| *s == Signal::Fail)
        .transition(Clearing, Active, |_, s| *s == Signal::Advance { last: false })
        .transition(Clearing, Completed, |_, s| *s == Signal::Advance { last: true })
        .transition(Clearing, Failed, |_, s| *s == Signal::Fail)
        .transition(Completed, Bonus, |_, s| *s == Signal::EnterBonus)
        .terminal(Failed)
        .build()
}

/// A registered character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterEntry {
    /// Character id
    pub character_id: u32,
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
}

/// Counters of the stage being played.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageState {
    /// Items collected by id
    pub item_counts: BTreeMap<u32, u32>,
    /// Monsters killed by id
    pub monster_kills: BTreeMap<u32, u32>,
    /// Generated combination for puzzle stages
    pub combination: Vec<u32>,
    /// Puzzle attempts
    pub attempts: u32,
    /// Script-owned values
    pub custom_data: BTreeMap<String, Value>,
}

impl StageState {
    /// Fresh counters for a stage; puzzle stages get a new combination.
    #[must_use]
    pub fn for_stage(stage: &Stage) -> Self {
        let mut state = Self::default();
        if stage.kind == StageType::CombinationPuzzle {
            let digits = stage.property_u32("digits").unwrap_or(DEFAULT_COMBINATION).max(1);
            let positions = stage.property_u32("positions").unwrap_or(DEFAULT_COMBINATION);
            let mut rng = rand::thread_rng();
            state.combination = (0..positions).map(|_| rng.gen_range(0..digits)).collect();
        }
        state
    }

    /// Add counter deltas.
    #[must_use]
    pub fn with_counts(mut self, items: &BTreeMap<u32, u32>, kills: &BTreeMap<u32, u32>) -> Self {
        for (id, delta) in items {
            let count = self.item_counts.entry(*id).or_default();
            *count = count.saturating_add(*delta);
        }
        for (id, delta) in kills {
            let count = self.monster_kills.entry(*id).or_default();
            *count = count.saturating_add(*delta);
        }
        self
    }

    /// Set values, then bump counters by one.
    #[must_use]
    pub fn with_custom(mut self, updates: &BTreeMap<String, String>, increments: &[String]) -> Self {
        for (key, value) in updates {
            self.custom_data.insert(key.clone(), Value::String(value.clone()));
        }
        for key in increments {
            let next = self.custom_number(key).saturating_add(1);
            self.custom_data.insert(key.clone(), Value::from(next));
        }
        self
    }

    /// Bump one counter by `by`.
    #[must_use]
    pub fn with_increment(mut self, key: &str, by: u32) -> Self {
        let next = self.custom_number(key).saturating_add(by);
        self.custom_data.insert(key.to_string(), Value::from(next));
        self
    }

    /// Custom value read as a number; absent or non-numeric reads as 0.
    #[must_use]
    pub fn custom_number(&self, key: &str) -> u32 {
        match self.custom_data.get(key) {
            Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }
}

/// One run of a party quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    id: Uuid,
    definition_id: Uuid,
    quest_id: String,
    state: InstanceState,
    world_id: u8,
    channel_id: u8,
    party_id: u32,
    affinity_id: u32,
    characters: Vec<CharacterEntry>,
    stage_index: u32,
    registered_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    stage_started_at: Option<DateTime<Utc>>,
    stage_state: StageState,
}

/// Where a new instance comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Registering party; 0 for individual registration
    pub party_id: u32,
    /// Party or guild grouping individual registrants; 0 for none
    pub affinity_id: u32,
    /// Registered characters
    pub characters: Vec<CharacterEntry>,
}

impl Instance {
    /// A fresh instance in `registering`.
    #[must_use]
    pub fn register(definition: &Definition, enrollment: Enrollment, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition_id: definition.id,
            quest_id: definition.quest_id.clone(),
            state: InstanceState::Registering,
            world_id: enrollment.world_id,
            channel_id: enrollment.channel_id,
            party_id: enrollment.party_id,
            affinity_id: enrollment.affinity_id,
            characters: enrollment.characters,
            stage_index: 0,
            registered_at: now,
            started_at: None,
            stage_started_at: None,
            stage_state: StageState::default(),
        }
    }

    /// Instance id; also the field instance of its stage maps.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Definition it runs.
    #[must_use]
    pub const fn definition_id(&self) -> Uuid {
        self.definition_id
    }

    /// Quest id.
    #[must_use]
    pub fn quest_id(&self) -> &str {
        &self.quest_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> InstanceState {
        self.state
    }

    /// World id.
    #[must_use]
    pub const fn world_id(&self) -> u8 {
        self.world_id
    }

    /// Channel id.
    #[must_use]
    pub const fn channel_id(&self) -> u8 {
        self.channel_id
    }

    /// Registering party.
    #[must_use]
    pub const fn party_id(&self) -> u32 {
        self.party_id
    }

    /// Individual registration grouping.
    #[must_use]
    pub const fn affinity_id(&self) -> u32 {
        self.affinity_id
    }

    /// Registered characters in registration order.
    #[must_use]
    pub fn characters(&self) -> &[CharacterEntry] {
        &self.characters
    }

    /// Registered character, if present.
    #[must_use]
    pub fn character(&self, character_id: u32) -> Option<&CharacterEntry> {
        self.characters.iter().find(|c| c.character_id == character_id)
    }

    /// Play position of the current stage.
    #[must_use]
    pub const fn stage_index(&self) -> u32 {
        self.stage_index
    }

    /// When the instance was created.
    #[must_use]
    pub const fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// When play began.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the current stage, completion wait or bonus round began.
    #[must_use]
    pub const fn stage_started_at(&self) -> Option<DateTime<Utc>> {
        self.stage_started_at
    }

    /// Counters of the current stage.
    #[must_use]
    pub const fn stage_state(&self) -> &StageState {
        &self.stage_state
    }

    /// Whether this is a registering instance individual registrants may join.
    #[must_use]
    pub fn accepts(&self, quest_id: &str, world_id: u8, channel_id: u8, affinity_id: u32) -> bool {
        self.state == InstanceState::Registering
            && self.quest_id == quest_id
            && self.world_id == world_id
            && (channel_id == 0 || self.channel_id == channel_id)
            && (affinity_id == 0 || self.affinity_id == affinity_id)
    }

    /// Play begins on stage 0.
    #[must_use]
    pub fn started(&self, stage_state: StageState, now: DateTime<Utc>) -> Self {
        Self {
            state: InstanceState::Active,
            stage_index: 0,
            started_at: Some(now),
            stage_started_at: Some(now),
            stage_state,
            ..self.clone()
        }
    }

    /// Play moves to another stage.
    #[must_use]
    pub fn advanced(&self, stage_index: u32, stage_state: StageState, now: DateTime<Utc>) -> Self {
        Self {
            state: InstanceState::Active,
            stage_index,
            stage_started_at: Some(now),
            stage_state,
            ..self.clone()
        }
    }

    /// The bonus round begins.
    #[must_use]
    pub fn in_bonus(&self, now: DateTime<Utc>) -> Self {
        Self {
            state: InstanceState::Bonus,
            stage_started_at: Some(now),
            stage_state: StageState::default(),
            ..self.clone()
        }
    }

    /// Same instance in another state.
    #[must_use]
    pub fn with_state(&self, state: InstanceState) -> Self {
        Self { state, ..self.clone() }
    }

    /// Restart the stage clock.
    #[must_use]
    pub fn with_stage_clock(&self, now: DateTime<Utc>) -> Self {
        Self {
            stage_started_at: Some(now),
            ..self.clone()
        }
    }

    /// Replace the stage counters.
    #[must_use]
    pub fn with_stage_state(&self, stage_state: StageState) -> Self {
        Self {
            stage_state,
            ..self.clone()
        }
    }

    /// Add a character.
    #[must_use]
    pub fn with_character(&self, entry: CharacterEntry) -> Self {
        let mut next = self.clone();
        next.characters.push(entry);
        next
    }

    /// Remove a character.
    #[must_use]
    pub fn without_character(&self, character_id: u32) -> Self {
        let mut next = self.clone();
        next.characters.retain(|c| c.character_id != character_id);
        next
    }
}

/// Whole seconds from `since` to `now`; 0 when `since` is unset.
#[must_use]
pub fn elapsed_secs(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    since.map_or(0, |t| (now - t).num_seconds())
}

/// Whether a limit of `limit` seconds counted from `since` has run out.
#[must_use]
pub fn expired(since: Option<DateTime<Utc>>, limit: u64, now: DateTime<Utc>) -> bool {
    since.is_some() && limit > 0 && u64::try_from(elapsed_secs(since, now)).is_ok_and(|e| e >= limit)
}

/// Seconds left of a limit counted from `since`, floored at 0.
#[must_use]
pub fn remaining_secs(since: Option<DateTime<Utc>>, limit: u64, now: DateTime<Utc>) -> u64 {
    let elapsed = u64::try_from(elapsed_secs(since, now).max(0)).unwrap_or(0);
    limit.saturating_sub(elapsed)
}

impl Record for Instance {
    type Id = Uuid;
    const KIND: &'static str = "party quest instance";

    fn id(&self) -> Uuid {
        self.id
    }

    fn participants(&self) -> Vec<u32> {
        self.characters.iter().map(|c| c.character_id).collect()
    }

    fn containers(&self) -> Vec<ContainerKey> {
        if self.party_id == 0 {
            Vec::new()
        } else {
            vec![ContainerKey::Party(self.party_id)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::WarpType;
    use chrono::Duration;
    use proptest::prelude::*;
    use serde_json::json;

    fn puzzle(properties: serde_json::Map<String, Value>) -> Stage {
        Stage {
            index: 0,
            name: "door".into(),
            kind: StageType::CombinationPuzzle,
            map_ids: vec![],
            duration: 0,
            warp_type: WarpType::Auto,
            clear_conditions: vec![],
            rewards: vec![],
            clear_actions: vec![],
            properties,
        }
    }

    fn table() -> TransitionTable<InstanceState, Instance, Signal> {
        lifecycle().unwrap_or_else(|e| unreachable!("{e}"))
    }

    #[test]
    fn lifecycle_walks_to_completion() {
        let t = table();
        let sample = Instance {
            id: Uuid::nil(),
            definition_id: Uuid::nil(),
            quest_id: String::new(),
            state: InstanceState::Registering,
            world_id: 0,
            channel_id: 0,
            party_id: 0,
            affinity_id: 0,
            characters: vec![],
            stage_index: 0,
            registered_at: Utc::now(),
            started_at: None,
            stage_started_at: None,
            stage_state: StageState::default(),
        };
        let mut state = InstanceState::Registering;
        for signal in [
            Signal::Start,
            Signal::Clear,
            Signal::Advance { last: false },
            Signal::Clear,
            Signal::Advance { last: true },
            Signal::EnterBonus,
        ] {
            state = t.next(state, &sample, &signal).unwrap_or_else(|| unreachable!("{signal:?} from {state:?}"));
        }
        assert_eq!(state, InstanceState::Bonus);

        assert_eq!(t.next(InstanceState::Clearing, &sample, &Signal::Clear), None);
        assert_eq!(t.next(InstanceState::Registering, &sample, &Signal::Clear), None);
        assert_eq!(t.next(InstanceState::Failed, &sample, &Signal::Start), None);
        assert!(t.is_terminal(InstanceState::Failed));
    }

    #[test]
    fn combination_follows_stage_properties() {
        let props = json!({ "digits": 2, "positions": 5 });
        let state = StageState::for_stage(&puzzle(props.as_object().cloned().unwrap_or_default()));
        assert_eq!(state.combination.len(), 5);
        assert!(state.combination.iter().all(|d| *d < 2));

        let state = StageState::for_stage(&puzzle(serde_json::Map::new()));
        assert_eq!(state.combination.len(), 3);
    }

    #[test]
    fn custom_data_increments_numeric_and_textual_values() {
        let updates = BTreeMap::from([("door".to_string(), "4".to_string())]);
        let state = StageState::default()
            .with_custom(&updates, &[])
            .with_custom(&BTreeMap::new(), &["door".to_string(), "fresh".to_string()]);
        assert_eq!(state.custom_number("door"), 5);
        assert_eq!(state.custom_number("fresh"), 1);
        assert_eq!(state.custom_number("missing"), 0);
    }

    #[test]
    fn timers_count_whole_seconds() {
        let start = Utc::now();
        assert!(!expired(Some(start), 60, start + Duration::seconds(59)));
        assert!(expired(Some(start), 60, start + Duration::seconds(60)));
        assert!(!expired(Some(start), 0, start + Duration::days(1)));
        assert!(!expired(None, 60, start + Duration::days(1)));
        assert_eq!(remaining_secs(Some(start), 60, start + Duration::seconds(15)), 45);
        assert_eq!(remaining_secs(Some(start), 60, start + Duration::seconds(90)), 0);
    }

    proptest! {
        #[test]
        fn counter_deltas_accumulate(deltas in proptest::collection::vec((0u32..4, 0u32..1000), 0..20)) {
            let mut state = StageState::default();
            let mut expected: BTreeMap<u32, u32> = BTreeMap::new();
            for (id, delta) in deltas {
                state = state.with_counts(&BTreeMap::from([(id, delta)]), &BTreeMap::new());
                *expected.entry(id).or_default() += delta;
            }
            prop_assert_eq!(state.item_counts, expected);
        }
    }
}
