//! Shared handler state.

use crate::processor::ReactorProcessor;

/// State handed to every route.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Reactor operations
    pub processor: ReactorProcessor,
}

impl AppState {
    /// State over a processor.
    #[must_use]
    pub const fn new(processor: ReactorProcessor) -> Self {
        Self { processor }
    }
}
