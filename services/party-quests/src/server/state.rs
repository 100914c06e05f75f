//! Shared handler state.

use crate::processor::PartyQuestProcessor;

/// State handed to every route.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Party-quest operations
    pub processor: PartyQuestProcessor,
}

impl AppState {
    /// State over a processor.
    #[must_use]
    pub const fn new(processor: PartyQuestProcessor) -> Self {
        Self { processor }
    }
}
