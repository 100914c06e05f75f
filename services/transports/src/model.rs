//! Live route records and their time-derived state.

use crate::route::RouteDefinition;
use crate::schedule::Trip;
use chrono::{DateTime, NaiveTime, Utc};
use realm_core::registry::{ContainerKey, Record};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a route is in its cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    /// No trip left today
    #[default]
    OutOfService,
    /// Waiting for the next boarding window
    AwaitingReturn,
    /// Passengers may board
    OpenEntry,
    /// Boarding closed, not yet departed
    LockedEntry,
    /// Travelling
    InTransit,
}

impl RouteState {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OutOfService => "out_of_service",
            Self::AwaitingReturn => "awaiting_return",
            Self::OpenEntry => "open_entry",
            Self::LockedEntry => "locked_entry",
            Self::InTransit => "in_transit",
        }
    }
}

/// State of a schedule at a time of day.
///
/// A trip in transit wins. Otherwise the next trip is the earliest departure
/// still ahead today, or one whose boarding began before midnight for a
/// departure after it; its boarding window decides between open, locked and
/// awaiting. With no such trip the route is out of service.
#[must_use]
pub fn state_at(schedule: &[Trip], now: NaiveTime) -> RouteState {
    if schedule.iter().any(|t| t.in_transit(now)) {
        return RouteState::InTransit;
    }
    let next = schedule
        .iter()
        .filter(|t| t.departure > now)
        .min_by_key(|t| t.departure)
        .or_else(|| schedule.iter().find(|t| t.pending(now)));
    match next {
        None => RouteState::OutOfService,
        Some(trip) if trip.boarding(now) => RouteState::OpenEntry,
        Some(trip) if trip.locked(now) => RouteState::LockedEntry,
        Some(_) => RouteState::AwaitingReturn,
    }
}

/// A route with its schedule and last computed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    definition: RouteDefinition,
    state: RouteState,
    schedule: Vec<Trip>,
}

impl Route {
    /// Route out of service until its first evaluation.
    #[must_use]
    pub const fn new(definition: RouteDefinition, schedule: Vec<Trip>) -> Self {
        Self {
            definition,
            state: RouteState::OutOfService,
            schedule,
        }
    }

    /// Route id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.definition.id
    }

    /// Catalog definition.
    #[must_use]
    pub const fn definition(&self) -> &RouteDefinition {
        &self.definition
    }

    /// Last computed state.
    #[must_use]
    pub const fn state(&self) -> RouteState {
        self.state
    }

    /// Today's trips, in departure order.
    #[must_use]
    pub fn schedule(&self) -> &[Trip] {
        &self.schedule
    }

    /// The state the schedule dictates at `now`.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> RouteState {
        state_at(&self.schedule, now.time())
    }

    /// Copy in another state.
    #[must_use]
    pub fn with_state(&self, state: RouteState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

impl Record for Route {
    type Id = Uuid;
    const KIND: &'static str = "transport route";

    fn id(&self) -> Uuid {
        self.definition.id
    }

    fn containers(&self) -> Vec<ContainerKey> {
        std::iter::once(self.definition.staging_map_id)
            .chain(self.definition.en_route_map_ids.iter().copied())
            .map(ContainerKey::Map)
            .collect()
    }
}
