//! Prometheus metrics for the realm services.
//!
//! Covered:
//! - Bus publishes and consumed commands
//! - Registry entity counts
//! - Tick sweep latency
//! - Peer failures and lazy initializer runs
//!
//! # Example
//!
//! ```rust,no_run
//! use realm_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! let (_tx, shutdown) = tokio::sync::watch::channel(false);
//! tokio::spawn(server.serve(shutdown));
//! # Ok(())
//! # }
//! ```

use axum::Router;
use axum::routing::get;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// Failed to bind HTTP server
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Prometheus metrics server.
///
/// Exposes `GET /metrics` on its own port for scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once served.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed (several servers in one test binary) is
    /// tolerated with a warning and leaves [`handle`](Self::handle) empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }

    /// Router exposing `GET /metrics`.
    #[must_use]
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.as_ref().map(PrometheusHandle::render).unwrap_or_default() }
            }),
        )
    }

    /// Serve `/metrics` until `shutdown` flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<(), MetricsError> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await?;
        Ok(())
    }
}

fn register_metrics() {
    describe_counter!(
        "realm.events.published",
        "Messages published to the bus, by topic"
    );
    describe_counter!(
        "realm.commands.consumed",
        "Inbound bus messages handled, by topic and outcome"
    );
    describe_gauge!(
        "realm.registry.entities",
        "Live records held in a registry, by record kind"
    );
    describe_histogram!(
        "realm.tick.duration_seconds",
        "Time taken by one tick sweep, by ticker"
    );
    describe_counter!(
        "realm.peer.failures",
        "Peer requests that failed after retries, by peer"
    );
    describe_counter!(
        "realm.initializer.runs",
        "Lazy initializer runs, by model"
    );
    describe_gauge!(
        "realm.timers.pending",
        "Delayed timers waiting to fire, by timer set"
    );
}

/// Record one lazy initializer run for `model` (`stats`, `rates`).
pub fn record_initializer_run(model: &'static str) {
    counter!("realm.initializer.runs", "model" => model).increment(1);
}

/// Record the duration of one tick sweep.
pub fn record_tick(ticker: &'static str, duration: Duration) {
    histogram!("realm.tick.duration_seconds", "ticker" => ticker).record(duration.as_secs_f64());
}

/// Record one consumed bus message.
pub fn record_consumed(topic: &str, outcome: &'static str) {
    counter!("realm.commands.consumed", "topic" => topic.to_string(), "outcome" => outcome)
        .increment(1);
}
