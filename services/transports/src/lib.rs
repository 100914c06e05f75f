//! # Realm Transports
//!
//! Scheduled transport routes. Each route departs on a fixed cycle from
//! midnight; its state (awaiting return, boarding open, boarding locked, in
//! transit, out of service) is read off the day's trip schedule on every
//! tick, so nothing but the last observed state is kept between ticks. Two
//! routes can share one vessel and alternate.
//!
//! Characters logging out while waiting to board or aboard are sent back to
//! the route's start map.
//!
//! Instanced routes run on demand instead. Starting one boards the character
//! onto a voyage, a private instance of the route's transit maps shared with
//! whoever else boards before it fills up or its boarding window closes.
//! Voyages arrive after a fixed travel time, and walking off the transit
//! maps, logging out or a voyage getting stuck ends the trip early.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod events;
pub mod handlers;
pub mod instanced;
pub mod model;
pub mod processor;
pub mod route;
pub mod schedule;
pub mod server;
pub mod states;
pub mod voyage;

pub use model::{Route, RouteState};
pub use instanced::InstanceTransportProcessor;
pub use processor::TransportProcessor;
pub use route::{RouteDefinition, SharedVessel};
pub use voyage::{InstanceRoute, Passenger, Voyage, VoyageState};
