//! Daily trip schedules.
//!
//! A route departs every cycle from midnight. Trips are stored as times of
//! day; a boarding window that opens before midnight or an arrival after it
//! simply wraps.

use crate::route::{DAY_SECS, RouteDefinition, SharedVessel};
use chrono::NaiveTime;
use realm_core::{RealmError, RealmResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One departure of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    /// Trip id
    pub trip_id: Uuid,
    /// Owning route
    pub route_id: Uuid,
    /// Boarding opens
    pub boarding_open: NaiveTime,
    /// Boarding closes
    pub boarding_closed: NaiveTime,
    /// Vessel leaves
    pub departure: NaiveTime,
    /// Vessel arrives
    pub arrival: NaiveTime,
}

impl Trip {
    /// The trip of `route` departing `departure_secs` after midnight.
    ///
    /// # Errors
    ///
    /// Validation unless boarding open < boarding closed <= departure < arrival.
    pub fn departing(route: &RouteDefinition, departure_secs: u64) -> RealmResult<Self> {
        let departure = signed(departure_secs)?;
        let closed = departure - signed(route.pre_departure_secs)?;
        let open = closed - signed(route.boarding_window_secs)?;
        let arrival = departure + signed(route.travel_secs)?;
        if !(open < closed && closed <= departure && departure < arrival) {
            return Err(RealmError::validation(format!(
                "route [{}] trip at {departure_secs}s is out of order",
                route.name
            )));
        }
        Ok(Self {
            trip_id: Uuid::new_v4(),
            route_id: route.id,
            boarding_open: time_of_day(open)?,
            boarding_closed: time_of_day(closed)?,
            departure: time_of_day(departure)?,
            arrival: time_of_day(arrival)?,
        })
    }

    /// Whether the vessel is travelling at `now`.
    #[must_use]
    pub fn in_transit(&self, now: NaiveTime) -> bool {
        within(now, self.departure, self.arrival)
    }

    /// Whether boarding is open at `now`.
    #[must_use]
    pub fn boarding(&self, now: NaiveTime) -> bool {
        within(now, self.boarding_open, self.boarding_closed)
    }

    /// Whether boarding has closed but the vessel has not left at `now`.
    #[must_use]
    pub fn locked(&self, now: NaiveTime) -> bool {
        within(now, self.boarding_closed, self.departure)
    }

    /// Whether `now` falls anywhere between boarding open and departure.
    #[must_use]
    pub fn pending(&self, now: NaiveTime) -> bool {
        within(now, self.boarding_open, self.departure)
    }
}

/// `start <= now < end` on a 24-hour clock; an end before the start wraps
/// past midnight.
#[must_use]
pub fn within(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start <= now && now < end
    } else {
        now >= start || now < end
    }
}

const SIGNED_DAY: i64 = 86_400;

fn signed(secs: u64) -> RealmResult<i64> {
    i64::try_from(secs).map_err(|_| RealmError::validation(format!("duration {secs}s out of range")))
}

fn time_of_day(secs: i64) -> RealmResult<NaiveTime> {
    u32::try_from(secs.rem_euclid(SIGNED_DAY))
        .ok()
        .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, 0))
        .ok_or_else(|| RealmError::validation(format!("{secs}s is not a time of day")))
}

/// Departures of one route: `offset_secs` after midnight, then every
/// `cycle_secs` until the day ends.
///
/// # Errors
///
/// Validation on a zero cycle or a malformed trip.
pub fn trips(route: &RouteDefinition, offset_secs: u64, cycle_secs: u64) -> RealmResult<Vec<Trip>> {
    if cycle_secs == 0 {
        return Err(RealmError::validation(format!("route [{}] has no cycle", route.name)));
    }
    let mut trips = Vec::new();
    let mut departure = offset_secs;
    while departure < DAY_SECS {
        trips.push(Trip::departing(route, departure)?);
        departure = departure.saturating_add(cycle_secs);
    }
    Ok(trips)
}

/// Schedules of every route of a tenant, keyed by route id.
///
/// Routes sharing a vessel alternate: each runs every other cycle, and the
/// return route is offset by the outbound travel time plus the turnaround.
/// A vessel naming an unknown route is skipped and its known route keeps a
/// schedule of its own.
///
/// # Errors
///
/// Validation on a malformed route.
pub fn schedules(routes: &[RouteDefinition], vessels: &[SharedVessel]) -> RealmResult<BTreeMap<Uuid, Vec<Trip>>> {
    let by_id: BTreeMap<Uuid, &RouteDefinition> = routes.iter().map(|r| (r.id, r)).collect();
    let mut out = BTreeMap::new();

    for vessel in vessels {
        let (Some(a), Some(b)) = (by_id.get(&vessel.route_a_id), by_id.get(&vessel.route_b_id)) else {
            tracing::warn!(vessel = %vessel.name, "Shared vessel names an unknown route");
            continue;
        };
        if out.contains_key(&a.id) || out.contains_key(&b.id) {
            tracing::warn!(vessel = %vessel.name, "Route already served by another vessel");
            continue;
        }
        let offset = a.travel_secs.saturating_add(vessel.turnaround_secs);
        out.insert(a.id, trips(a, 0, a.cycle_interval_secs.saturating_mul(2))?);
        out.insert(b.id, trips(b, offset, b.cycle_interval_secs.saturating_mul(2))?);
    }
    for route in routes {
        if !out.contains_key(&route.id) {
            out.insert(route.id, trips(route, 0, route.cycle_interval_secs)?);
        }
    }
    Ok(out)
}
