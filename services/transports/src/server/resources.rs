//! JSON:API representations of routes, vessels and voyages.

use crate::model::{Route, RouteState};
use crate::route::SharedVessel;
use crate::schedule::Trip;
use crate::voyage::{InstanceRoute, Voyage};
use realm_web::ToResource;
use serde::Serialize;

/// Attributes of a `routes` resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAttributes {
    /// Route name
    pub name: String,
    /// Current state
    pub state: RouteState,
    /// Where passengers come from
    pub start_map_id: u32,
    /// Boarding area
    pub staging_map_id: u32,
    /// Maps occupied while travelling
    pub en_route_map_ids: Vec<u32>,
    /// Arrival map
    pub destination_map_id: u32,
    /// Map watching the vessel arrive
    pub observation_map_id: u32,
    /// Boarding open period in seconds
    pub boarding_window_secs: u64,
    /// Boarding close to departure in seconds
    pub pre_departure_secs: u64,
    /// Departure to arrival in seconds
    pub travel_secs: u64,
    /// Departure to departure in seconds
    pub cycle_interval_secs: u64,
    /// Today's trips
    pub schedule: Vec<Trip>,
}

impl ToResource for Route {
    const TYPE: &'static str = "routes";
    type Attributes = RouteAttributes;

    fn resource_id(&self) -> String {
        self.id().to_string()
    }

    fn attributes(&self) -> RouteAttributes {
        let d = self.definition();
        RouteAttributes {
            name: d.name.clone(),
            state: self.state(),
            start_map_id: d.start_map_id,
            staging_map_id: d.staging_map_id,
            en_route_map_ids: d.en_route_map_ids.clone(),
            destination_map_id: d.destination_map_id,
            observation_map_id: d.observation_map_id,
            boarding_window_secs: d.boarding_window_secs,
            pre_departure_secs: d.pre_departure_secs,
            travel_secs: d.travel_secs,
            cycle_interval_secs: d.cycle_interval_secs,
            schedule: self.schedule().to_vec(),
        }
    }
}

impl ToResource for SharedVessel {
    const TYPE: &'static str = "vessels";
    type Attributes = Self;

    fn resource_id(&self) -> String {
        self.id.to_string()
    }

    fn attributes(&self) -> Self {
        self.clone()
    }
}

impl ToResource for InstanceRoute {
    const TYPE: &'static str = "instance-routes";
    type Attributes = Self;

    fn resource_id(&self) -> String {
        self.id.to_string()
    }

    fn attributes(&self) -> Self {
        self.clone()
    }
}

impl ToResource for Voyage {
    const TYPE: &'static str = "instances";
    type Attributes = Self;

    fn resource_id(&self) -> String {
        self.id().to_string()
    }

    fn attributes(&self) -> Self {
        self.clone()
    }
}
