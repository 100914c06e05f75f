//! Readiness of the reactors service.

use crate::processor::ReactorProcessor;
use realm_runtime::{HealthCheck, HealthReport};
use realm_web::HealthProbe;

/// Reports live reactors, cooldowns and pending activations.
#[derive(Debug, Clone)]
pub struct ReactorsHealth {
    processor: ReactorProcessor,
}

impl ReactorsHealth {
    /// Probe over a processor.
    #[must_use]
    pub const fn new(processor: ReactorProcessor) -> Self {
        Self { processor }
    }
}

impl HealthProbe for ReactorsHealth {
    fn report(&self) -> HealthReport {
        let registry = self.processor.registry();
        let tenants = registry.tenants();
        let reactors: usize = tenants.iter().map(|t| registry.len(t)).sum();
        HealthReport::new(
            "realm-reactors",
            vec![
                HealthCheck::healthy("registry")
                    .with_metadata("tenants", tenants.len())
                    .with_metadata("reactors", reactors)
                    .with_metadata("cooldowns", self.processor.cooldowns().len())
                    .with_metadata("pendingActivations", self.processor.activations().pending()),
            ],
        )
    }
}
