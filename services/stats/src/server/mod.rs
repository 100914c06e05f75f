//! HTTP surface of the stats service.

pub mod health;
pub mod resources;
pub mod routes;
pub mod state;

pub use health::StatsHealth;
pub use routes::build_router;
pub use state::AppState;
