//! Readiness of the transports service.

use crate::instanced::InstanceTransportProcessor;
use crate::model::RouteState;
use crate::processor::TransportProcessor;
use realm_runtime::{HealthCheck, HealthReport};
use realm_web::HealthProbe;

/// Reports loaded routes, how many are travelling, and running voyages.
#[derive(Debug, Clone)]
pub struct TransportsHealth {
    processor: TransportProcessor,
    instanced: InstanceTransportProcessor,
}

impl TransportsHealth {
    /// Health report over both processors.
    #[must_use]
    pub const fn new(processor: TransportProcessor, instanced: InstanceTransportProcessor) -> Self {
        Self { processor, instanced }
    }
}

impl HealthProbe for TransportsHealth {
    fn report(&self) -> HealthReport {
        let registry = self.processor.registry();
        let tenants = registry.tenants();
        let routes: Vec<_> = tenants.iter().flat_map(|t| registry.snapshot(t)).collect();
        let in_transit = routes.iter().filter(|r| r.state() == RouteState::InTransit).count();
        let voyages = self.instanced.voyages();
        let running: usize = voyages.tenants().iter().map(|t| voyages.len(t)).sum();
        HealthReport::new(
            "realm-transports",
            vec![
                HealthCheck::healthy("registry")
                    .with_metadata("tenants", tenants.len())
                    .with_metadata("routes", routes.len())
                    .with_metadata("inTransit", in_transit)
                    .with_metadata("voyages", running),
            ],
        )
    }
}
