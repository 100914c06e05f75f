//! Readiness of the party-quests service.

use crate::model::InstanceState;
use crate::processor::PartyQuestProcessor;
use realm_runtime::{HealthCheck, HealthReport};
use realm_web::HealthProbe;

/// Reports live instances, and how many are being played.
#[derive(Debug, Clone)]
pub struct PartyQuestsHealth {
    processor: PartyQuestProcessor,
}

impl PartyQuestsHealth {
    /// Probe over a processor.
    #[must_use]
    pub const fn new(processor: PartyQuestProcessor) -> Self {
        Self { processor }
    }
}

impl HealthProbe for PartyQuestsHealth {
    fn report(&self) -> HealthReport {
        let tenants = self.processor.registry().tenants();
        let instances: Vec<_> = tenants.iter().flat_map(|t| self.processor.instances(t)).collect();
        let playing = instances
            .iter()
            .filter(|i| matches!(i.state(), InstanceState::Active | InstanceState::Clearing | InstanceState::Bonus))
            .count();
        HealthReport::new(
            "realm-party-quests",
            vec![
                HealthCheck::healthy("registry")
                    .with_metadata("tenants", tenants.len())
                    .with_metadata("instances", instances.len())
                    .with_metadata("playing", playing),
            ],
        )
    }
}
