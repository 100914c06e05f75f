//! Periodic cooldown cleanup.

use crate::processor::ReactorProcessor;
use chrono::{DateTime, Utc};
use realm_runtime::ticker::{Tickable, TickFuture};

/// Forgets cooldowns whose delay has passed.
#[derive(Debug, Clone)]
pub struct CooldownSweep {
    processor: ReactorProcessor,
}

impl CooldownSweep {
    /// Sweeper over a processor.
    #[must_use]
    pub const fn new(processor: ReactorProcessor) -> Self {
        Self { processor }
    }
}

impl Tickable for CooldownSweep {
    fn name(&self) -> &'static str {
        "reactor-cooldowns"
    }

    fn tick(&self, now: DateTime<Utc>) -> TickFuture<'_> {
        Box::pin(async move {
            let dropped = self.processor.sweep_cooldowns(now);
            if dropped > 0 {
                tracing::debug!(dropped, "Cooldown sweep");
            }
        })
    }
}
