//! Settings every realm service reads from its environment.
//!
//! Service crates embed [`ServiceConfig`] in their own `Config` and add the
//! knobs only they use. Missing or unparseable values fall back to defaults.

use realm_core::topic::env_or;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default Kafka bootstrap servers.
pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "localhost:9092";
/// Default peer root.
pub const DEFAULT_BASE_SERVICE_URL: &str = "http://localhost:8080/api/";
/// Default tick period.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Shared service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Kafka bootstrap servers (comma-separated)
    pub bootstrap_servers: String,
    /// Consumer group of this service
    pub consumer_group: String,
    /// REST bind host
    pub rest_host: IpAddr,
    /// REST bind port
    pub rest_port: u16,
    /// Prometheus scrape port
    pub metrics_port: u16,
    /// Tick period in milliseconds
    pub tick_interval_ms: u64,
    /// Catalog database; `None` keeps catalogs in memory
    pub database_url: Option<String>,
    /// Root URL of the peer services
    pub base_service_url: String,
}

impl ServiceConfig {
    /// Load from the environment; `service` names the default consumer group.
    #[must_use]
    pub fn from_env(service: &str) -> Self {
        Self {
            bootstrap_servers: env::var("BOOTSTRAP_SERVERS")
                .unwrap_or_else(|_| DEFAULT_BOOTSTRAP_SERVERS.to_string()),
            consumer_group: env::var("CONSUMER_GROUP_ID")
                .unwrap_or_else(|_| format!("{service}-service")),
            rest_host: env_or("REST_HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            rest_port: env_or("REST_PORT", 8080),
            metrics_port: env_or("METRICS_PORT", 9090),
            tick_interval_ms: env_or("TICK_INTERVAL_MS", DEFAULT_TICK_INTERVAL_MS),
            database_url: env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            base_service_url: env::var("BASE_SERVICE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_SERVICE_URL.to_string()),
        }
    }

    /// REST listen address.
    #[must_use]
    pub const fn rest_addr(&self) -> SocketAddr {
        SocketAddr::new(self.rest_host, self.rest_port)
    }

    /// Metrics listen address.
    #[must_use]
    pub const fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.rest_host, self.metrics_port)
    }

    /// Tick period.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
