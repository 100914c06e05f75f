//! # Realm Runtime
//!
//! Background machinery shared by every realm service.
//!
//! ## Components
//!
//! - **Config**: environment settings shared by services
//! - **Ticker**: periodic sweep of time-dependent entities
//! - **Timers**: keyed, cancellable delayed callbacks
//! - **Consumer**: per-topic bus consumer dispatching to a handler
//! - **Retry**: exponential backoff for peer requests
//! - **Health**: component health reports
//! - **Metrics**: Prometheus recorder and scrape endpoint
//! - **Lifecycle**: shutdown signal and task draining
//!
//! ## Example
//!
//! ```ignore
//! use realm_runtime::{lifecycle::Shutdown, ticker::Ticker};
//!
//! let shutdown = Shutdown::new();
//! let ticker = Ticker::new(config.tick_interval(), clock.clone());
//! let handle = ticker.spawn(coupon_sweep, shutdown.subscribe());
//!
//! realm_runtime::lifecycle::shutdown_signal().await;
//! shutdown.trigger();
//! ```

/// Environment settings shared by services
pub mod config;

/// Per-topic bus consumer loop
pub mod consumer;

/// Component health model
pub mod health;

/// Shutdown coordination
pub mod lifecycle;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// Periodic tick loop
pub mod ticker;

/// Cancellable delayed timers
pub mod timer;

pub use config::ServiceConfig;
pub use consumer::{Consumer, MessageHandler};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use lifecycle::Shutdown;
pub use retry::RetryPolicy;
pub use ticker::{Tickable, Ticker};
pub use timer::TimerSet;
