//! Reactors service configuration.

use realm_core::topic::env_or;
use realm_runtime::ServiceConfig;
use std::time::Duration;

/// Default item activation delay.
pub const DEFAULT_ACTIVATION_DELAY_MS: u64 = 5_000;

/// Environment-derived settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared service settings
    pub service: ServiceConfig,
    /// Delay between a matching drop and its hit (`REACTOR_ITEM_ACTIVATION_DELAY_MS`)
    pub activation_delay_ms: u64,
}

impl Config {
    /// Read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            service: ServiceConfig::from_env("reactors"),
            activation_delay_ms: env_or("REACTOR_ITEM_ACTIVATION_DELAY_MS", DEFAULT_ACTIVATION_DELAY_MS),
        }
    }

    /// Item activation delay.
    #[must_use]
    pub const fn activation_delay(&self) -> Duration {
        Duration::from_millis(self.activation_delay_ms)
    }
}
