//! Error responses for realm handlers.
//!
//! [`AppError`] bridges [`RealmError`] and HTTP: each error kind has one
//! status code and the body is always `{"code", "message"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use realm_core::RealmError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn get_reactor(
///     TenantHeaders(tenant): TenantHeaders,
///     Path(id): Path<u32>,
///     State(state): State<AppState>,
/// ) -> Result<JsonApi<Document<ReactorResource>>, AppError> {
///     let reactor = state.registry.get(&tenant, &id)?;
///     Ok(JsonApi::one(&reactor))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} [{id}] not found"),
        )
    }

    /// 409 Conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            message,
        )
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            message,
        )
    }

    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        } else {
            tracing::debug!(status = %self.status, code = self.code, message = %self.message, "Request rejected");
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RealmError> for AppError {
    fn from(err: RealmError) -> Self {
        let message = err.to_string();
        match err {
            RealmError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
            RealmError::Validation(_) => Self::bad_request(message),
            RealmError::InvalidState { .. } => {
                Self::new(StatusCode::CONFLICT, "INVALID_STATE", message)
            },
            RealmError::Conflict(_) => Self::conflict(message),
            RealmError::PeerUnavailable { .. } => Self::unavailable(message),
            RealmError::Bus(_) | RealmError::Fatal(_) => {
                Self::internal("An internal error occurred").with_source(anyhow::Error::new(err))
            },
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_core::event_bus::EventBusError;

    #[test]
    fn realm_errors_map_to_status() {
        let cases = [
            (RealmError::not_found("reactor", 7), StatusCode::NOT_FOUND),
            (RealmError::validation("classification required"), StatusCode::BAD_REQUEST),
            (
                RealmError::invalid_state("instance", "x", "Registering", "clear stage"),
                StatusCode::CONFLICT,
            ),
            (RealmError::Conflict("taken".into()), StatusCode::CONFLICT),
            (
                RealmError::PeerUnavailable {
                    peer: "character",
                    reason: "timeout".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RealmError::Bus(EventBusError::ConnectionFailed("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (RealmError::Fatal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = AppError::from(RealmError::Fatal("secret".into()));
        assert_eq!(err.to_string(), "[INTERNAL_SERVER_ERROR] An internal error occurred");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn not_found_renders_resource_and_id() {
        let err = AppError::not_found("route", "abc");
        assert_eq!(err.to_string(), "[NOT_FOUND] route [abc] not found");
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
