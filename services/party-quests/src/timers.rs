//! Instance timers.
//!
//! Nothing is scheduled per instance. Each tick looks at every instance,
//! works out which of its limits has run out from the stored timestamps, and
//! acts on the first one found.

use crate::definition::{Definition, RegistrationMode, StageType};
use crate::model::{Instance, InstanceState, expired};
use crate::processor::PartyQuestProcessor;
use chrono::{DateTime, Utc};
use realm_runtime::ticker::{TickFuture, Tickable, for_each_tenant};

/// A limit that has run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Timed registration closed; start
    Registration,
    /// Global limit; fail
    Global,
    /// Stage limit; advance
    Stage,
    /// Bonus round or bonus stage limit; destroy
    Bonus,
    /// Manual bonus entry never came; destroy
    Completion,
}

/// The limit of an instance that has run out at `now`, if any.
#[must_use]
pub fn due(instance: &Instance, definition: &Definition, completion_timeout_secs: u64, now: DateTime<Utc>) -> Option<Expiry> {
    let stage_clock = instance.stage_started_at();
    match instance.state() {
        InstanceState::Registering => {
            let registration = &definition.registration;
            (registration.mode == RegistrationMode::Timed
                && expired(Some(instance.registered_at()), registration.duration, now))
            .then_some(Expiry::Registration)
        },
        InstanceState::Active | InstanceState::Clearing => {
            if expired(instance.started_at(), definition.duration, now) {
                return Some(Expiry::Global);
            }
            if instance.state() == InstanceState::Clearing {
                return None;
            }
            let stage = definition.stage(instance.stage_index())?;
            if !expired(stage_clock, stage.duration, now) {
                return None;
            }
            Some(if stage.kind == StageType::Bonus {
                Expiry::Bonus
            } else {
                Expiry::Stage
            })
        },
        InstanceState::Completed => expired(stage_clock, completion_timeout_secs, now).then_some(Expiry::Completion),
        InstanceState::Bonus => definition
            .bonus
            .as_ref()
            .filter(|b| expired(stage_clock, b.duration, now))
            .map(|_| Expiry::Bonus),
        InstanceState::Failed => None,
    }
}

/// Runs every instance timer of every tenant.
#[derive(Debug, Clone)]
pub struct PartyQuestTimers {
    processor: PartyQuestProcessor,
}

impl PartyQuestTimers {
    /// Timers over a processor.
    #[must_use]
    pub const fn new(processor: PartyQuestProcessor) -> Self {
        Self { processor }
    }
}

impl Tickable for PartyQuestTimers {
    fn name(&self) -> &'static str {
        "party-quest-timers"
    }

    fn tick(&self, now: DateTime<Utc>) -> TickFuture<'_> {
        Box::pin(async move {
            let processor = &self.processor;
            for_each_tenant(processor.registry().tenants(), |tenant| async move {
                let fired = processor.expire(&tenant, now).await;
                if fired > 0 {
                    tracing::debug!(tenant = %tenant, fired, "Party quest timers fired");
                }
            })
            .await;
        })
    }
}
