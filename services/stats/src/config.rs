//! Stats service configuration.

use realm_runtime::ServiceConfig;

/// Environment-derived settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared service settings
    pub service: ServiceConfig,
}

impl Config {
    /// Read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            service: ServiceConfig::from_env("stats"),
        }
    }
}
