//! Periodic route state recomputation and voyage timers.

use crate::instanced::InstanceTransportProcessor;
use crate::processor::TransportProcessor;
use chrono::{DateTime, Utc};
use realm_runtime::ticker::{TickFuture, Tickable, for_each_tenant};

/// Recomputes the state of every loaded route on each tick.
#[derive(Debug, Clone)]
pub struct TransportStates {
    processor: TransportProcessor,
}

impl TransportStates {
    /// Ticker over a processor.
    #[must_use]
    pub const fn new(processor: TransportProcessor) -> Self {
        Self { processor }
    }
}

impl Tickable for TransportStates {
    fn name(&self) -> &'static str {
        "transport-states"
    }

    fn tick(&self, now: DateTime<Utc>) -> TickFuture<'_> {
        Box::pin(async move {
            let processor = &self.processor;
            for_each_tenant(processor.registry().tenants(), |tenant| async move {
                let changed = processor.update_states(&tenant, now).await;
                if changed > 0 {
                    tracing::debug!(tenant = %tenant, changed, "Transport routes moved on");
                }
            })
            .await;
        })
    }
}

/// Closes boarding, delivers arrivals and recovers stuck voyages.
#[derive(Debug, Clone)]
pub struct VoyageTimers {
    instanced: InstanceTransportProcessor,
}

impl VoyageTimers {
    /// Ticker over a processor.
    #[must_use]
    pub const fn new(instanced: InstanceTransportProcessor) -> Self {
        Self { instanced }
    }
}

impl Tickable for VoyageTimers {
    fn name(&self) -> &'static str {
        "voyage-timers"
    }

    fn tick(&self, now: DateTime<Utc>) -> TickFuture<'_> {
        Box::pin(async move {
            let instanced = &self.instanced;
            for_each_tenant(instanced.voyages().tenants(), |tenant| async move {
                let moved = instanced.tick(&tenant, now).await;
                if moved > 0 {
                    tracing::debug!(tenant = %tenant, moved, "Voyages moved on");
                }
            })
            .await;
        })
    }
}
