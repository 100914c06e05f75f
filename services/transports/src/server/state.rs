//! Shared handler state.

use crate::instanced::InstanceTransportProcessor;
use crate::processor::TransportProcessor;

/// State handed to every route.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Scheduled route operations
    pub processor: TransportProcessor,
    /// Instanced route and voyage operations
    pub instanced: InstanceTransportProcessor,
}

impl AppState {
    /// State over both processors.
    #[must_use]
    pub const fn new(processor: TransportProcessor, instanced: InstanceTransportProcessor) -> Self {
        Self { processor, instanced }
    }
}
