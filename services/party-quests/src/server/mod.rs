//! HTTP surface of the party-quests service.

pub mod health;
pub mod resources;
pub mod routes;
pub mod state;

pub use health::PartyQuestsHealth;
pub use routes::build_router;
pub use state::AppState;
