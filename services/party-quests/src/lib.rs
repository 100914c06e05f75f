//! # Realm Party Quests
//!
//! Party quests are staged runs defined in the catalog. A party, or a group of
//! individuals sharing an affinity, registers for a quest and gets its own
//! instance. The instance walks its stages: clear conditions are checked
//! against counters fed by other services, a clear pays stage rewards, an
//! advance warps everyone to the next stage's maps. The last advance completes
//! the quest and may open a bonus round.
//!
//! Global, stage, bonus and registration limits are all evaluated on a tick
//! from the timestamps stored on the instance.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod conditions;
pub mod config;
pub mod definition;
pub mod events;
pub mod handlers;
pub mod model;
pub mod processor;
pub mod server;
pub mod timers;

pub use definition::Definition;
pub use model::Instance;
pub use processor::{PartyQuestProcessor, RegisterRequest};
