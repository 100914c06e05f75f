//! Party-quests service configuration.

use realm_core::topic::env_or;
use realm_runtime::ServiceConfig;

/// Default wait for a manual bonus entry before the instance is dropped.
pub const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 120;

/// Environment-derived settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared service settings
    pub service: ServiceConfig,
    /// Manual bonus entry window (`PQ_COMPLETION_TIMEOUT_SECS`)
    pub completion_timeout_secs: u64,
}

impl Config {
    /// Read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            service: ServiceConfig::from_env("party-quests"),
            completion_timeout_secs: env_or("PQ_COMPLETION_TIMEOUT_SECS", DEFAULT_COMPLETION_TIMEOUT_SECS),
        }
    }
}
