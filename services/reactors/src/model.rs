//! Reactor records and their game-data driven transitions.

use chrono::{DateTime, Utc};
use realm_core::peer::{ReactorData, ReactorItem, ReactorStateEvent};
use realm_core::registry::{MapKey, Record};
use realm_core::{RealmError, RealmResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Lowest reactor id handed out.
pub const MIN_ID: u32 = 1_000_000_001;
/// Highest reactor id handed out; allocation wraps back to [`MIN_ID`].
pub const MAX_ID: u32 = 2_000_000_000;

/// Process-wide reactor id sequence.
#[derive(Debug)]
pub struct ReactorIds {
    next: AtomicU32,
}

impl Default for ReactorIds {
    fn default() -> Self {
        Self {
            next: AtomicU32::new(MIN_ID),
        }
    }
}

impl ReactorIds {
    /// Sequence starting at [`MIN_ID`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence starting at `first`, for tests around the wrap.
    #[must_use]
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first.clamp(MIN_ID, MAX_ID)),
        }
    }

    /// Next id, wrapping after [`MAX_ID`].
    pub fn allocate(&self) -> u32 {
        let advance = |id: u32| Some(if id >= MAX_ID { MIN_ID } else { id + 1 });
        match self.next.fetch_update(Ordering::Relaxed, Ordering::Relaxed, advance) {
            Ok(id) | Err(id) => id,
        }
    }
}

/// What a CREATE asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorSpawn {
    /// Game-data classification; must be non-zero
    pub classification: u32,
    /// Display name; taken from game data when empty
    #[serde(default)]
    pub name: String,
    /// Initial state
    #[serde(default)]
    pub state: i8,
    /// Horizontal position
    pub x: i16,
    /// Vertical position
    pub y: i16,
    /// Re-creation cooldown after destruction, in ms
    #[serde(default)]
    pub delay: u32,
    /// Facing
    #[serde(default)]
    pub direction: u8,
}

/// Outcome of picking the event a HIT follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Move to a state present in the table
    Advance(i8),
    /// The reactor is spent
    Trigger,
}

/// A live reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reactor {
    id: u32,
    field: MapKey,
    classification: u32,
    name: String,
    state: i8,
    event_state: u8,
    x: i16,
    y: i16,
    delay: u32,
    direction: u8,
    update_time: DateTime<Utc>,
    data: ReactorData,
}

impl Reactor {
    /// Build a reactor from a spawn request and its game data.
    ///
    /// # Errors
    ///
    /// [`RealmError::Validation`] when the classification is zero.
    pub fn new(
        id: u32,
        field: MapKey,
        spawn: ReactorSpawn,
        data: ReactorData,
        now: DateTime<Utc>,
    ) -> RealmResult<Self> {
        if spawn.classification == 0 {
            return Err(RealmError::validation("reactor classification is required"));
        }
        let name = if spawn.name.is_empty() {
            data.name.clone()
        } else {
            spawn.name
        };
        Ok(Self {
            id,
            field,
            classification: spawn.classification,
            name,
            state: spawn.state,
            event_state: 0,
            x: spawn.x,
            y: spawn.y,
            delay: spawn.delay,
            direction: spawn.direction,
            update_time: now,
            data,
        })
    }

    /// Reactor id
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Field the reactor lives in
    #[must_use]
    pub const fn field(&self) -> MapKey {
        self.field
    }

    /// Classification
    #[must_use]
    pub const fn classification(&self) -> u32 {
        self.classification
    }

    /// Name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> i8 {
        self.state
    }

    /// Event state
    #[must_use]
    pub const fn event_state(&self) -> u8 {
        self.event_state
    }

    /// Horizontal position
    #[must_use]
    pub const fn x(&self) -> i16 {
        self.x
    }

    /// Vertical position
    #[must_use]
    pub const fn y(&self) -> i16 {
        self.y
    }

    /// Cooldown in ms recorded on destruction
    #[must_use]
    pub const fn delay(&self) -> u32 {
        self.delay
    }

    /// Facing
    #[must_use]
    pub const fn direction(&self) -> u8 {
        self.direction
    }

    /// Last change
    #[must_use]
    pub const fn update_time(&self) -> DateTime<Utc> {
        self.update_time
    }

    /// Game data
    #[must_use]
    pub const fn data(&self) -> &ReactorData {
        &self.data
    }

    /// Copy in a new state.
    #[must_use]
    pub fn with_state(&self, state: i8, now: DateTime<Utc>) -> Self {
        Self {
            state,
            update_time: now,
            ..self.clone()
        }
    }

    fn events(&self, state: i8) -> &[ReactorStateEvent] {
        self.data.state_info.get(&state).map_or(&[], Vec::as_slice)
    }

    /// Where a HIT with `skill_id` leads from the current state.
    #[must_use]
    pub fn step(&self, skill_id: u32) -> Step {
        let chosen = self
            .events(self.state)
            .iter()
            .find(|e| e.active_skills.is_empty() || e.active_skills.contains(&skill_id));
        match chosen {
            Some(event) if self.data.state_info.contains_key(&event.next_state) => {
                Step::Advance(event.next_state)
            },
            _ => Step::Trigger,
        }
    }

    /// A state with no events, or whose events all lead outside the table.
    #[must_use]
    pub fn is_terminal(&self, state: i8) -> bool {
        self.events(state)
            .iter()
            .all(|e| !self.data.state_info.contains_key(&e.next_state))
    }

    /// Item requirements of the current state.
    pub fn item_requirements(&self) -> impl Iterator<Item = &ReactorItem> {
        self.events(self.state).iter().filter_map(|e| e.item.as_ref())
    }

    /// Whether a drop of `quantity` × `item_id` at `(x, y)` satisfies one of
    /// the current state's item requirements.
    #[must_use]
    pub fn accepts_drop(&self, item_id: u32, quantity: u16, x: i16, y: i16) -> bool {
        let (x, y) = (i32::from(x), i32::from(y));
        let (rx, ry) = (i32::from(self.x), i32::from(self.y));
        self.item_requirements().any(|item| {
            item.item_id == item_id
                && quantity >= item.quantity
                && (rx + i32::from(item.lt.x)..=rx + i32::from(item.rb.x)).contains(&x)
                && (ry + i32::from(item.lt.y)..=ry + i32::from(item.rb.y)).contains(&y)
        })
    }

    /// Cooldown slot this reactor occupies once destroyed.
    #[must_use]
    pub const fn cooldown_key(&self) -> CooldownKey {
        CooldownKey {
            field: self.field,
            classification: self.classification,
            x: self.x,
            y: self.y,
        }
    }
}

impl Record for Reactor {
    type Id = u32;
    const KIND: &'static str = "reactor";

    fn id(&self) -> u32 {
        self.id
    }

    fn map_key(&self) -> Option<MapKey> {
        Some(self.field)
    }
}

/// Position a destroyed reactor may not be re-created at until its delay passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CooldownKey {
    /// Field
    pub field: MapKey,
    /// Classification
    pub classification: u32,
    /// Horizontal position
    pub x: i16,
    /// Vertical position
    pub y: i16,
}
