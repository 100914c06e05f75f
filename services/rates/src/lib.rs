//! # Realm Rates
//!
//! Per-character rate multipliers for experience, mesos, item drops and quest
//! experience. A rate is the product of its factors:
//!
//! ```text
//! rate = 1.0 × world × buffs × tracked items
//! ```
//!
//! Tracked items are evaluated at read time. Bonus-EXP equipment climbs its
//! tiers the longer it stays equipped; coupons apply inside their weekly
//! windows until their duration runs out. A periodic sweep drops expired
//! coupons and publishes `RATE_CHANGED`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod events;
pub mod expiry;
pub mod handlers;
pub mod initializer;
pub mod model;
pub mod processor;
pub mod server;
pub mod world;

pub use model::{RateModel, RateType, TrackedItem};
pub use processor::{RateView, RatesProcessor};
