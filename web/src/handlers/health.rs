//! Health check endpoints.
//!
//! `GET /health` is liveness only; `GET /health/ready` asks the service for a
//! [`HealthReport`] and answers 503 when it is unhealthy.

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use realm_runtime::{HealthReport, HealthStatus};
use std::sync::Arc;

/// Something that can describe its own health.
pub trait HealthProbe: Send + Sync {
    /// Current report.
    fn report(&self) -> HealthReport;
}

/// Liveness: the process is running.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness: 200 for healthy or degraded, 503 for unhealthy.
#[allow(clippy::unused_async)]
pub async fn readiness_check(
    State(probe): State<Arc<dyn HealthProbe>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = probe.report();
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}

/// `/health` and `/health/ready` over a probe.
pub fn health_routes(probe: Arc<dyn HealthProbe>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .with_state(probe)
}
