//! Error kinds shared by every service.

use crate::catalog::CatalogError;
use crate::event::EventError;
use crate::event_bus::EventBusError;
use crate::peer::PeerError;
use thiserror::Error;

/// Errors produced by registry, processor, and initializer operations.
///
/// The variants follow how a caller is expected to react: not-found and
/// validation are caller errors, peer unavailability is transient, invalid
/// state means the command raced a transition, and fatal errors stop the process.
#[derive(Error, Debug)]
pub enum RealmError {
    /// Lookup of a missing entity
    #[error("{kind} [{id}] not found")]
    NotFound {
        /// Entity kind (e.g. `reactor`)
        kind: &'static str,
        /// Rendered id
        id: String,
    },

    /// Required field missing, referenced id zero, or malformed input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Outbound request to a peer service failed or timed out
    #[error("peer [{peer}] unavailable: {reason}")]
    PeerUnavailable {
        /// Peer service name
        peer: &'static str,
        /// Failure detail
        reason: String,
    },

    /// Operation attempted in a state that does not allow it
    #[error("{entity} [{id}] is {actual}, cannot {operation}")]
    InvalidState {
        /// Entity kind
        entity: &'static str,
        /// Rendered id
        id: String,
        /// Current state
        actual: String,
        /// Attempted operation
        operation: &'static str,
    },

    /// A secondary index key is already bound to another entity
    #[error("conflict: {0}")]
    Conflict(String),

    /// Outbound event delivery failed
    #[error("event bus error: {0}")]
    Bus(#[from] EventBusError),

    /// Unrecoverable failure
    #[error("fatal: {0}")]
    Fatal(String),
}

impl RealmError {
    /// Build a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Build a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build an invalid-state error.
    #[must_use]
    pub fn invalid_state(
        entity: &'static str,
        id: impl ToString,
        actual: impl ToString,
        operation: &'static str,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.to_string(),
            actual: actual.to_string(),
            operation,
        }
    }

    /// Whether the error is a not-found condition.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<PeerError> for RealmError {
    fn from(err: PeerError) -> Self {
        match err {
            PeerError::NotFound { peer, id } => Self::NotFound { kind: peer, id },
            PeerError::Unavailable { peer, reason } | PeerError::Decode { peer, reason } => {
                Self::PeerUnavailable { peer, reason }
            },
        }
    }
}

impl From<EventError> for RealmError {
    fn from(err: EventError) -> Self {
        Self::Fatal(err.to_string())
    }
}

impl From<CatalogError> for RealmError {
    fn from(err: CatalogError) -> Self {
        Self::Fatal(err.to_string())
    }
}

/// Result alias for service operations.
pub type RealmResult<T> = Result<T, RealmError>;
