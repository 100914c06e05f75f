//! Instanced routes and their voyages.
//!
//! An instanced route has no schedule. The first character to start it opens
//! a voyage, a private instance of the transit maps, and later characters
//! join it until it fills up or its boarding window closes. The voyage then
//! travels and, on arrival, sends everyone aboard to the destination.

use chrono::{DateTime, Duration, Utc};
use realm_core::catalog::Document;
use realm_core::registry::{ContainerKey, Record};
use realm_core::{RealmError, RealmResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An on-demand transport route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRoute {
    /// Catalog id; assigned on creation when nil
    #[serde(default)]
    pub id: Uuid,
    /// Unique name within a tenant
    pub name: String,
    /// Where passengers board, and where interrupted voyages return them
    pub start_map_id: u32,
    /// Maps instanced per voyage; passengers are warped into the first
    pub transit_map_ids: Vec<u32>,
    /// Arrival map
    pub destination_map_id: u32,
    /// Passengers per voyage
    pub capacity: u32,
    /// How long a voyage accepts passengers after it opens
    pub boarding_window_secs: u64,
    /// Boarding close to arrival
    pub travel_secs: u64,
    /// Shown on entering a transit map
    #[serde(default)]
    pub transit_message: String,
}

impl InstanceRoute {
    /// Check maps, capacity and durations, and assign an id if missing.
    ///
    /// # Errors
    ///
    /// Validation on an empty name, no transit maps, a zero capacity,
    /// boarding window or travel time.
    pub fn prepare(mut self) -> RealmResult<Self> {
        if self.name.trim().is_empty() {
            return Err(RealmError::validation("route name must not be empty"));
        }
        if self.transit_map_ids.is_empty() {
            return Err(RealmError::validation(format!(
                "route [{}] needs at least one transit map",
                self.name
            )));
        }
        for (value, what) in [
            (u64::from(self.capacity), "capacity"),
            (self.boarding_window_secs, "boarding window"),
            (self.travel_secs, "travel time"),
        ] {
            if value == 0 {
                return Err(RealmError::validation(format!("route [{}] {what} must be positive", self.name)));
            }
        }
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        Ok(self)
    }

    /// Whether `map_id` is one of this route's transit maps.
    #[must_use]
    pub fn has_transit_map(&self, map_id: u32) -> bool {
        self.transit_map_ids.contains(&map_id)
    }

    /// Age past which a voyage is considered stuck: twice its boarding and
    /// travel time.
    #[must_use]
    pub fn max_lifetime(&self) -> Duration {
        seconds(self.boarding_window_secs.saturating_add(self.travel_secs).saturating_mul(2))
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::from(u32::try_from(secs).unwrap_or(u32::MAX)))
}

impl Document for InstanceRoute {
    const COLLECTION: &'static str = "transport_instance_routes";

    fn document_id(&self) -> Uuid {
        self.id
    }

    fn lookup_key(&self) -> String {
        self.name.clone()
    }
}

impl Record for InstanceRoute {
    type Id = Uuid;
    const KIND: &'static str = "instance route";

    fn id(&self) -> Uuid {
        self.id
    }

    fn containers(&self) -> Vec<ContainerKey> {
        self.transit_map_ids.iter().copied().map(ContainerKey::Map).collect()
    }
}

/// Where a voyage is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoyageState {
    /// Accepting passengers
    Boarding,
    /// Under way
    InTransit,
    /// Emptied and about to be removed; accepts nobody
    Released,
}

/// A character aboard a voyage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passenger {
    /// Character id
    pub character_id: u32,
    /// World the character boarded in
    pub world_id: u8,
    /// Channel the character boarded in
    pub channel_id: u8,
}

/// What the timers owe a voyage at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    /// Nothing yet
    Nothing,
    /// Boarding closed; the voyage leaves
    Departure,
    /// Travel time elapsed; passengers go to the destination
    Arrival,
    /// Alive past the route's maximum lifetime
    Stuck,
}

/// One running instance of an instanced route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voyage {
    id: Uuid,
    route_id: Uuid,
    state: VoyageState,
    passengers: Vec<Passenger>,
    created_at: DateTime<Utc>,
    boarding_until: DateTime<Utc>,
    arrival_at: DateTime<Utc>,
}

impl Voyage {
    /// Open a voyage of `route` with its first passenger.
    #[must_use]
    pub fn open(route: &InstanceRoute, passenger: Passenger, now: DateTime<Utc>) -> Self {
        let boarding_until = now + seconds(route.boarding_window_secs);
        Self {
            id: Uuid::new_v4(),
            route_id: route.id,
            state: VoyageState::Boarding,
            passengers: vec![passenger],
            created_at: now,
            boarding_until,
            arrival_at: boarding_until + seconds(route.travel_secs),
        }
    }

    /// Voyage id; also the field instance of its transit maps.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Route this voyage runs.
    #[must_use]
    pub const fn route_id(&self) -> Uuid {
        self.route_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> VoyageState {
        self.state
    }

    /// Characters aboard, in boarding order.
    #[must_use]
    pub fn passengers(&self) -> &[Passenger] {
        &self.passengers
    }

    /// Opening time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// End of the boarding window.
    #[must_use]
    pub const fn boarding_until(&self) -> DateTime<Utc> {
        self.boarding_until
    }

    /// Scheduled arrival.
    #[must_use]
    pub const fn arrival_at(&self) -> DateTime<Utc> {
        self.arrival_at
    }

    /// Whether one more passenger can board at `now`.
    #[must_use]
    pub fn accepts(&self, capacity: u32, now: DateTime<Utc>) -> bool {
        self.state == VoyageState::Boarding
            && now <= self.boarding_until
            && u32::try_from(self.passengers.len()).is_ok_and(|n| n < capacity)
    }

    /// Seconds until arrival, never negative.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((self.arrival_at - now).num_seconds()).unwrap_or(0)
    }

    /// Whether a character is aboard.
    #[must_use]
    pub fn carries(&self, character_id: u32) -> bool {
        self.passengers.iter().any(|p| p.character_id == character_id)
    }

    /// What the timers owe this voyage at `now`. A voyage past its maximum
    /// lifetime is stuck whatever its state.
    #[must_use]
    pub fn due(&self, max_lifetime: Duration, now: DateTime<Utc>) -> Due {
        if now - self.created_at > max_lifetime {
            return Due::Stuck;
        }
        match self.state {
            VoyageState::Boarding if now > self.boarding_until => Due::Departure,
            VoyageState::InTransit if now > self.arrival_at => Due::Arrival,
            _ => Due::Nothing,
        }
    }

    /// This voyage with one more passenger.
    ///
    /// # Errors
    ///
    /// Conflict when the voyage is full or no longer boarding.
    pub fn with_passenger(&self, capacity: u32, passenger: Passenger, now: DateTime<Utc>) -> RealmResult<Self> {
        if !self.accepts(capacity, now) {
            return Err(RealmError::Conflict(format!("voyage [{}] is not boarding", self.id)));
        }
        let mut next = self.clone();
        next.passengers.push(passenger);
        Ok(next)
    }

    /// This voyage without a character. An emptied voyage is released.
    ///
    /// # Errors
    ///
    /// Not-found when the character is not aboard.
    pub fn without(&self, character_id: u32) -> RealmResult<(Self, Passenger)> {
        let Some(index) = self.passengers.iter().position(|p| p.character_id == character_id) else {
            return Err(RealmError::not_found("passenger", character_id));
        };
        let mut next = self.clone();
        let passenger = next.passengers.remove(index);
        if next.passengers.is_empty() {
            next.state = VoyageState::Released;
        }
        Ok((next, passenger))
    }

    /// This voyage under way.
    #[must_use]
    pub fn departed(&self) -> Self {
        Self {
            state: VoyageState::InTransit,
            ..self.clone()
        }
    }
}

impl Record for Voyage {
    type Id = Uuid;
    const KIND: &'static str = "voyage";

    fn id(&self) -> Uuid {
        self.id
    }

    fn participants(&self) -> Vec<u32> {
        self.passengers.iter().map(|p| p.character_id).collect()
    }

    fn containers(&self) -> Vec<ContainerKey> {
        vec![ContainerKey::Route(self.route_id)]
    }
}
