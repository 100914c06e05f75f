//! Shared handler state.

use crate::processor::RatesProcessor;

/// State handed to every route.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Rate operations
    pub processor: RatesProcessor,
}

impl AppState {
    /// State over a processor.
    #[must_use]
    pub const fn new(processor: RatesProcessor) -> Self {
        Self { processor }
    }
}
