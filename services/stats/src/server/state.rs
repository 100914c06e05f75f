//! Shared handler state.

use crate::processor::StatsProcessor;

/// State handed to every route.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Stat operations
    pub processor: StatsProcessor,
}

impl AppState {
    /// State over a processor.
    #[must_use]
    pub const fn new(processor: StatsProcessor) -> Self {
        Self { processor }
    }
}
