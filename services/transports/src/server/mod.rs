//! HTTP surface of the transports service.

pub mod health;
pub mod resources;
pub mod routes;
pub mod state;

pub use health::TransportsHealth;
pub use routes::build_router;
pub use state::AppState;
