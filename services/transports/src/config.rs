//! Transports service configuration.

use realm_core::topic::env_or;
use realm_runtime::ServiceConfig;

/// Environment-derived settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared service settings
    pub service: ServiceConfig,
    /// World whose staging maps are counted for passengers (`TRANSPORT_WORLD_ID`)
    pub world_id: u8,
    /// Channel whose staging maps are counted for passengers (`TRANSPORT_CHANNEL_ID`)
    pub channel_id: u8,
}

impl Config {
    /// Read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            service: ServiceConfig::from_env("transports"),
            world_id: env_or("TRANSPORT_WORLD_ID", 0),
            channel_id: env_or("TRANSPORT_CHANNEL_ID", 0),
        }
    }
}
