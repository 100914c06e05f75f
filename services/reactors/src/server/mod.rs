//! HTTP surface of the reactors service.

pub mod health;
pub mod resources;
pub mod routes;
pub mod state;

pub use health::ReactorsHealth;
pub use routes::build_router;
pub use state::AppState;
