//! HTTP request handlers shared by every service.

pub mod health;

pub use health::{HealthProbe, health_check, health_routes, readiness_check};
