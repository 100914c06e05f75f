//! Readiness of the rates service.

use crate::processor::RatesProcessor;
use realm_runtime::{HealthCheck, HealthReport};
use realm_web::HealthProbe;

/// Reports the live models and how many items they track.
#[derive(Debug, Clone)]
pub struct RatesHealth {
    processor: RatesProcessor,
}

impl RatesHealth {
    /// Probe over a processor.
    #[must_use]
    pub const fn new(processor: RatesProcessor) -> Self {
        Self { processor }
    }
}

impl HealthProbe for RatesHealth {
    fn report(&self) -> HealthReport {
        let registry = self.processor.registry();
        let tenants = registry.tenants();
        let (models, items) = tenants
            .iter()
            .flat_map(|t| registry.snapshot(t))
            .fold((0usize, 0usize), |(models, items), m| (models + 1, items + m.items().len()));
        HealthReport::new(
            "realm-rates",
            vec![
                HealthCheck::healthy("registry")
                    .with_metadata("tenants", tenants.len())
                    .with_metadata("models", models)
                    .with_metadata("trackedItems", items),
            ],
        )
    }
}
