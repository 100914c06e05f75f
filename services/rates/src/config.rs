//! Rates service configuration.

use realm_core::topic::env_or;
use realm_runtime::ServiceConfig;
use std::time::Duration;

/// Default coupon sweep period.
pub const DEFAULT_EXPIRY_INTERVAL_SECS: u64 = 60;

/// Environment-derived settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared service settings
    pub service: ServiceConfig,
    /// Seconds between coupon expiry sweeps (`COUPON_EXPIRY_INTERVAL_SECS`)
    pub expiry_interval_secs: u64,
}

impl Config {
    /// Read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            service: ServiceConfig::from_env("rates"),
            expiry_interval_secs: env_or("COUPON_EXPIRY_INTERVAL_SECS", DEFAULT_EXPIRY_INTERVAL_SECS),
        }
    }

    /// Coupon sweep period, never below one second.
    #[must_use]
    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_secs.max(1))
    }
}
