//! Readiness of the stats service.

use crate::processor::StatsProcessor;
use realm_runtime::{HealthCheck, HealthReport};
use realm_web::HealthProbe;

/// Reports how many tenants and models are held in memory.
#[derive(Debug, Clone)]
pub struct StatsHealth {
    processor: StatsProcessor,
}

impl StatsHealth {
    /// Probe over a processor.
    #[must_use]
    pub const fn new(processor: StatsProcessor) -> Self {
        Self { processor }
    }
}

impl HealthProbe for StatsHealth {
    fn report(&self) -> HealthReport {
        let registry = self.processor.registry();
        let tenants = registry.tenants();
        let models: usize = tenants.iter().map(|t| registry.len(t)).sum();
        HealthReport::new(
            "realm-stats",
            vec![
                HealthCheck::healthy("registry")
                    .with_metadata("tenants", tenants.len())
                    .with_metadata("models", models),
            ],
        )
    }
}
