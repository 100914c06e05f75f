//! # Realm Reactors
//!
//! Interactive map objects driven by game-data state tables. A hit walks the
//! reactor's table; a state with nowhere left to go tells the scripting
//! service the reactor was triggered and destroys it. A destroyed reactor
//! leaves a cooldown at its position that swallows re-creation until its
//! delay has passed.
//!
//! Item reactors also listen for drops: an item of the right kind and amount
//! landing inside the reactor's area schedules one delayed hit.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod cooldown;
pub mod events;
pub mod handlers;
pub mod model;
pub mod processor;
pub mod server;
pub mod sweep;

pub use model::{Reactor, ReactorSpawn};
pub use processor::{HitOutcome, ReactorProcessor};
