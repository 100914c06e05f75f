//! Catalog documents: route definitions and shared vessels.

use realm_core::catalog::Document;
use realm_core::{RealmError, RealmResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Seconds in a day.
pub const DAY_SECS: u64 = 86_400;

/// A scheduled transport route.
///
/// Durations are seconds. Boarding opens `boarding_window_secs +
/// pre_departure_secs` before each departure and closes `pre_departure_secs`
/// before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDefinition {
    /// Catalog id; assigned on creation when nil
    #[serde(default)]
    pub id: Uuid,
    /// Unique name within a tenant
    pub name: String,
    /// Where passengers come from, and where logouts land
    pub start_map_id: u32,
    /// Boarding area
    pub staging_map_id: u32,
    /// Maps occupied while travelling
    pub en_route_map_ids: Vec<u32>,
    /// Arrival map
    pub destination_map_id: u32,
    /// Map watching the vessel arrive
    #[serde(default)]
    pub observation_map_id: u32,
    /// Boarding open period
    pub boarding_window_secs: u64,
    /// Gap between boarding close and departure
    #[serde(default)]
    pub pre_departure_secs: u64,
    /// Departure to arrival
    pub travel_secs: u64,
    /// Departure to departure
    pub cycle_interval_secs: u64,
}

impl RouteDefinition {
    /// Check durations and maps, and assign an id if missing.
    ///
    /// # Errors
    ///
    /// Validation on an empty name, no en-route maps, a zero boarding window,
    /// travel time or cycle, or a cycle longer than a day.
    pub fn prepare(mut self) -> RealmResult<Self> {
        if self.name.trim().is_empty() {
            return Err(RealmError::validation("route name must not be empty"));
        }
        if self.en_route_map_ids.is_empty() {
            return Err(RealmError::validation(format!(
                "route [{}] needs at least one en-route map",
                self.name
            )));
        }
        for (value, what) in [
            (self.boarding_window_secs, "boarding window"),
            (self.travel_secs, "travel time"),
            (self.cycle_interval_secs, "cycle interval"),
        ] {
            if value == 0 {
                return Err(RealmError::validation(format!("route [{}] {what} must be positive", self.name)));
            }
        }
        if self.cycle_interval_secs > DAY_SECS {
            return Err(RealmError::validation(format!(
                "route [{}] cycle interval exceeds a day",
                self.name
            )));
        }
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        Ok(self)
    }

    /// Boarding open to departure.
    #[must_use]
    pub const fn lead_secs(&self) -> u64 {
        self.boarding_window_secs.saturating_add(self.pre_departure_secs)
    }

    /// Whether a character on `map_id` is aboard or waiting to board.
    #[must_use]
    pub fn holds(&self, map_id: u32) -> bool {
        map_id == self.staging_map_id || self.en_route_map_ids.contains(&map_id)
    }
}

impl Document for RouteDefinition {
    const COLLECTION: &'static str = "transport_routes";

    fn document_id(&self) -> Uuid {
        self.id
    }

    fn lookup_key(&self) -> String {
        self.name.clone()
    }
}

/// One vessel serving two routes in turn.
///
/// Route B departs `route A travel + turnaround` after route A, and each
/// route runs every other cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedVessel {
    /// Catalog id; assigned on creation when nil
    #[serde(default)]
    pub id: Uuid,
    /// Unique name within a tenant
    pub name: String,
    /// Leading route
    pub route_a_id: Uuid,
    /// Return route
    pub route_b_id: Uuid,
    /// Pause between route A arriving and route B departing
    pub turnaround_secs: u64,
}

impl SharedVessel {
    /// Check the pairing and assign an id if missing.
    ///
    /// # Errors
    ///
    /// Validation on a nil or repeated route, or a zero turnaround.
    pub fn prepare(mut self) -> RealmResult<Self> {
        if self.route_a_id.is_nil() || self.route_b_id.is_nil() {
            return Err(RealmError::validation(format!("vessel [{}] needs two routes", self.name)));
        }
        if self.route_a_id == self.route_b_id {
            return Err(RealmError::validation(format!(
                "vessel [{}] cannot pair a route with itself",
                self.name
            )));
        }
        if self.turnaround_secs == 0 {
            return Err(RealmError::validation(format!(
                "vessel [{}] turnaround must be positive",
                self.name
            )));
        }
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        Ok(self)
    }

    /// Whether this vessel serves a route.
    #[must_use]
    pub fn serves(&self, route_id: Uuid) -> bool {
        self.route_a_id == route_id || self.route_b_id == route_id
    }
}

impl Document for SharedVessel {
    const COLLECTION: &'static str = "transport_vessels";

    fn document_id(&self) -> Uuid {
        self.id
    }

    fn lookup_key(&self) -> String {
        self.name.clone()
    }
}
