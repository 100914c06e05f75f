//! # Realm Stats
//!
//! Effective character statistics. Each character's model holds base values
//! from the character service plus contributions from equipped assets, active
//! buffs and passive skills:
//!
//! ```text
//! effective = floor((base + Σ flat) × (1 + Σ percent))
//! ```
//!
//! A model is built lazily on first read and kept current from the asset,
//! buff, character and skill status streams. Every change to a computed value
//! publishes `STAT_CHANGED`; a drop in max HP or max MP also commands the
//! character service to clamp current values.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod events;
pub mod handlers;
pub mod initializer;
pub mod model;
pub mod processor;
pub mod server;

pub use model::{BaseStats, StatModel, StatType};
pub use processor::StatsProcessor;
