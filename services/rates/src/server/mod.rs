//! HTTP surface of the rates service.

pub mod health;
pub mod resources;
pub mod routes;
pub mod state;

pub use health::RatesHealth;
pub use routes::build_router;
pub use state::AppState;
