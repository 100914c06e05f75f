//! Reactor operations.
//!
//! Transitions are decided under the registry write lock. A reactor is
//! removed before anything announces its end, so only the caller that removed
//! it publishes TRIGGER and DESTROYED.

use crate::cooldown::Cooldowns;
use crate::events::{CommandKind, ReactorAction, ReactorCommand, ReactorStatus, Topics};
use crate::model::{CooldownKey, Reactor, ReactorIds, ReactorSpawn, Step};
use chrono::{DateTime, Utc};
use realm_core::emitter::Emitter;
use realm_core::environment::Clock;
use realm_core::peer::GameDataPeer;
use realm_core::registry::{MapKey, Record, TenantRegistry};
use realm_core::status::{DropChange, DropStatus};
use realm_core::{RealmError, RealmResult, Tenant};
use realm_runtime::TimerSet;
use std::sync::Arc;
use std::time::Duration;

/// Default delay between a matching drop and the hit it causes.
pub const DEFAULT_ACTIVATION_DELAY: Duration = Duration::from_millis(crate::config::DEFAULT_ACTIVATION_DELAY_MS);

/// What a hit did to the reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitOutcome {
    /// The reactor moved to a new, non-terminal state
    Advanced(Reactor),
    /// The reactor was spent and removed
    Destroyed(Reactor),
}

impl HitOutcome {
    /// The reactor as it was left.
    #[must_use]
    pub const fn reactor(&self) -> &Reactor {
        match self {
            Self::Advanced(r) | Self::Destroyed(r) => r,
        }
    }
}

/// Reactors service entry point.
#[derive(Clone)]
pub struct ReactorProcessor {
    registry: Arc<TenantRegistry<Reactor>>,
    cooldowns: Arc<Cooldowns>,
    activations: Arc<TimerSet<(Tenant, u32)>>,
    ids: Arc<ReactorIds>,
    peers: Arc<dyn GameDataPeer>,
    emitter: Emitter,
    topics: Topics,
    clock: Arc<dyn Clock>,
    activation_delay: Duration,
}

impl ReactorProcessor {
    /// Processor over fresh registries.
    #[must_use]
    pub fn new(peers: Arc<dyn GameDataPeer>, emitter: Emitter, topics: Topics, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Arc::new(TenantRegistry::new()),
            cooldowns: Arc::new(Cooldowns::new()),
            activations: Arc::new(TimerSet::new("reactor-activations")),
            ids: Arc::new(ReactorIds::new()),
            peers,
            emitter,
            topics,
            clock,
            activation_delay: DEFAULT_ACTIVATION_DELAY,
        }
    }

    /// Replace the item activation delay.
    #[must_use]
    pub fn with_activation_delay(mut self, delay: Duration) -> Self {
        self.activation_delay = delay;
        self
    }

    /// The reactor registry.
    #[must_use]
    pub fn registry(&self) -> &TenantRegistry<Reactor> {
        &self.registry
    }

    /// Re-creation cooldowns.
    #[must_use]
    pub fn cooldowns(&self) -> &Cooldowns {
        &self.cooldowns
    }

    /// Pending item activations.
    #[must_use]
    pub fn activations(&self) -> &TimerSet<(Tenant, u32)> {
        &self.activations
    }

    /// Current clock reading.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// One reactor.
    ///
    /// # Errors
    ///
    /// Not-found if no such reactor is live.
    pub fn get(&self, tenant: &Tenant, reactor_id: u32) -> RealmResult<Reactor> {
        self.registry.get(tenant, &reactor_id)
    }

    /// Every reactor of a field, ordered by id.
    #[must_use]
    pub fn in_field(&self, tenant: &Tenant, field: &MapKey) -> Vec<Reactor> {
        let mut reactors = self.registry.by_spatial(tenant, field);
        reactors.sort_by_key(Reactor::id);
        reactors
    }

    /// Spawn a reactor. Returns `None` when its position is still on cooldown.
    ///
    /// # Errors
    ///
    /// Validation on a zero classification, peer errors fetching its game
    /// data, registry or bus errors.
    pub async fn create(
        &self,
        tenant: &Tenant,
        field: MapKey,
        spawn: ReactorSpawn,
    ) -> RealmResult<Option<Reactor>> {
        if spawn.classification == 0 {
            return Err(RealmError::validation("reactor classification is required"));
        }
        let now = self.now();
        let key = CooldownKey {
            field,
            classification: spawn.classification,
            x: spawn.x,
            y: spawn.y,
        };
        if self.cooldowns.is_active(tenant, &key, now) {
            tracing::debug!(
                tenant = %tenant,
                field = %field,
                classification = spawn.classification,
                x = spawn.x,
                y = spawn.y,
                "Reactor position on cooldown, create dropped"
            );
            return Ok(None);
        }

        let data = self.peers.reactor_data(tenant, spawn.classification).await?;
        let reactor = Reactor::new(self.ids.allocate(), field, spawn, data, now)?;

        let registry = &self.registry;
        let status = &self.topics.status;
        let reactor = self
            .emitter
            .emit(tenant, |buffer| {
                let reactor = registry.insert(tenant, reactor)?;
                buffer.put(status, reactor.id(), &ReactorStatus::created(&reactor))?;
                Ok(reactor)
            })
            .await?;
        self.cooldowns.clear(tenant, &key);

        tracing::info!(
            tenant = %tenant,
            reactor_id = reactor.id(),
            classification = reactor.classification(),
            field = %field,
            "Created reactor"
        );
        Ok(Some(reactor))
    }

    /// Queue a CREATE on the command topic; the reactor appears once the
    /// command is consumed.
    ///
    /// # Errors
    ///
    /// Validation on a zero classification; bus errors.
    pub async fn request_create(&self, tenant: &Tenant, field: MapKey, spawn: ReactorSpawn) -> RealmResult<()> {
        if spawn.classification == 0 {
            return Err(RealmError::validation("reactor classification is required"));
        }
        let command = ReactorCommand {
            world_id: field.world,
            channel_id: field.channel,
            map_id: field.map,
            instance: field.instance,
            kind: CommandKind::Create(spawn),
        };
        let topic = &self.topics.command;
        self.emitter
            .emit(tenant, |buffer| Ok(buffer.put(topic, field.map, &command)?))
            .await
    }

    /// Hit a reactor.
    ///
    /// The scripting service hears about the hit before the state table is
    /// consulted; failing to tell it does not fail the hit.
    ///
    /// # Errors
    ///
    /// Not-found if the reactor is gone; registry or bus errors.
    pub async fn hit(
        &self,
        tenant: &Tenant,
        reactor_id: u32,
        character_id: u32,
        skill_id: u32,
    ) -> RealmResult<HitOutcome> {
        let reactor = self.registry.get(tenant, &reactor_id)?;

        let actions = &self.topics.actions;
        if let Err(e) = self
            .emitter
            .emit(tenant, |buffer| {
                Ok(buffer.put(actions, reactor_id, &ReactorAction::hit(&reactor, character_id, skill_id))?)
            })
            .await
        {
            tracing::warn!(tenant = %tenant, reactor_id, error = %e, "Failed to forward hit to scripts");
        }

        let now = self.now();
        let (advanced, step) = self.registry.update_with(tenant, &reactor_id, |current| {
            let step = current.step(skill_id);
            let next = match step {
                Step::Advance(state) => current.with_state(state, now),
                Step::Trigger => current.clone(),
            };
            Ok((next, step))
        })?;
        let outcome = match step {
            Step::Advance(state) if !advanced.is_terminal(state) => {
                let status = &self.topics.status;
                self.emitter
                    .emit(tenant, |buffer| Ok(buffer.put(status, reactor_id, &ReactorStatus::hit(&advanced))?))
                    .await?;
                HitOutcome::Advanced(advanced)
            },
            _ => HitOutcome::Destroyed(self.trigger(tenant, reactor_id, character_id, now).await?),
        };
        tracing::debug!(
            tenant = %tenant,
            reactor_id,
            character_id,
            skill_id,
            state = outcome.reactor().state(),
            destroyed = matches!(outcome, HitOutcome::Destroyed(_)),
            "Reactor hit"
        );
        Ok(outcome)
    }

    /// Tell scripts the reactor is spent, then destroy it.
    ///
    /// # Errors
    ///
    /// Not-found if the reactor is gone; bus errors.
    pub async fn trigger_and_destroy(
        &self,
        tenant: &Tenant,
        reactor_id: u32,
        character_id: u32,
    ) -> RealmResult<Reactor> {
        self.trigger(tenant, reactor_id, character_id, self.now()).await
    }

    /// Destroy one reactor.
    ///
    /// # Errors
    ///
    /// Not-found if the reactor is gone; bus errors.
    pub async fn destroy(&self, tenant: &Tenant, reactor_id: u32) -> RealmResult<Reactor> {
        let reactor = self
            .remove(tenant, reactor_id, self.now())
            .ok_or_else(|| RealmError::not_found(Reactor::KIND, reactor_id))?;
        self.announce_destroyed(tenant, std::slice::from_ref(&reactor)).await?;
        Ok(reactor)
    }

    /// Destroy every reactor of a field. Returns how many went.
    ///
    /// # Errors
    ///
    /// Bus errors.
    pub async fn destroy_in_field(&self, tenant: &Tenant, field: &MapKey) -> RealmResult<usize> {
        let now = self.now();
        let reactors: Vec<Reactor> = self
            .in_field(tenant, field)
            .iter()
            .filter_map(|reactor| self.remove(tenant, reactor.id(), now))
            .collect();
        self.announce_destroyed(tenant, &reactors).await?;
        if !reactors.is_empty() {
            tracing::info!(tenant = %tenant, field = %field, destroyed = reactors.len(), "Destroyed reactors in field");
        }
        Ok(reactors.len())
    }

    /// Lift every cooldown of a field. Returns how many were lifted.
    pub fn clear_cooldowns(&self, tenant: &Tenant, field: &MapKey) -> usize {
        let cleared = self.cooldowns.clear_field(tenant, field);
        tracing::debug!(tenant = %tenant, field = %field, cleared, "Cleared reactor cooldowns");
        cleared
    }

    /// Drop elapsed cooldowns. Returns how many went.
    pub fn sweep_cooldowns(&self, now: DateTime<Utc>) -> usize {
        self.cooldowns.sweep(now)
    }

    /// Schedule a delayed hit on every reactor whose item requirement the
    /// dropped item satisfies. Returns how many activations were scheduled;
    /// a reactor with one already pending is skipped.
    pub fn on_drop(&self, tenant: &Tenant, status: &DropStatus) -> usize {
        let DropChange::Spawned(spawned) = &status.change else {
            return 0;
        };
        let field = MapKey::new(status.world_id, status.channel_id, status.map_id, status.instance);
        let mut scheduled = 0;
        for reactor in self.in_field(tenant, &field) {
            if !reactor.accepts_drop(spawned.item_id, spawned.quantity, spawned.x, spawned.y) {
                continue;
            }
            let processor = self.clone();
            let owner = tenant.clone();
            let reactor_id = reactor.id();
            let fire = async move {
                if let Err(e) = processor.hit(&owner, reactor_id, 0, 0).await {
                    tracing::warn!(tenant = %owner, reactor_id, error = %e, "Item activation failed");
                }
            };
            if self
                .activations
                .schedule((tenant.clone(), reactor_id), self.activation_delay, fire)
            {
                tracing::debug!(
                    tenant = %tenant,
                    reactor_id,
                    drop_id = status.drop_id,
                    item_id = spawned.item_id,
                    "Scheduled item activation"
                );
                scheduled += 1;
            }
        }
        scheduled
    }

    /// Cancel every pending activation, then destroy every reactor of every
    /// tenant. Returns how many reactors went.
    pub async fn teardown(&self) -> usize {
        self.activations.cancel_all();
        let mut destroyed = 0;
        for tenant in self.registry.tenants() {
            for reactor in self.registry.snapshot(&tenant) {
                match self.destroy(&tenant, reactor.id()).await {
                    Ok(_) => destroyed += 1,
                    Err(e) if e.is_not_found() => {},
                    Err(e) => {
                        tracing::error!(tenant = %tenant, reactor_id = reactor.id(), error = %e, "Teardown destroy failed");
                    },
                }
            }
        }
        tracing::info!(destroyed, "Reactors torn down");
        destroyed
    }

    /// Remove a spent reactor, tell scripts, then announce it. Only the
    /// caller that removed the reactor publishes anything.
    async fn trigger(
        &self,
        tenant: &Tenant,
        reactor_id: u32,
        character_id: u32,
        now: DateTime<Utc>,
    ) -> RealmResult<Reactor> {
        let reactor = self
            .remove(tenant, reactor_id, now)
            .ok_or_else(|| RealmError::not_found(Reactor::KIND, reactor_id))?;
        let actions = &self.topics.actions;
        if let Err(e) = self
            .emitter
            .emit(tenant, |buffer| {
                Ok(buffer.put(actions, reactor_id, &ReactorAction::trigger(&reactor, character_id))?)
            })
            .await
        {
            tracing::warn!(tenant = %tenant, reactor_id, error = %e, "Failed to forward trigger to scripts");
        }
        self.announce_destroyed(tenant, std::slice::from_ref(&reactor)).await?;
        Ok(reactor)
    }

    /// Delete under the registry lock; `None` if someone else already did.
    fn remove(&self, tenant: &Tenant, reactor_id: u32, now: DateTime<Utc>) -> Option<Reactor> {
        let reactor = self.registry.delete(tenant, &reactor_id)?;
        self.activations.cancel(&(tenant.clone(), reactor_id));
        self.cooldowns.record(tenant, reactor.cooldown_key(), reactor.delay(), now);
        Some(reactor)
    }

    async fn announce_destroyed(&self, tenant: &Tenant, reactors: &[Reactor]) -> RealmResult<()> {
        let status = &self.topics.status;
        self.emitter
            .emit(tenant, |buffer| {
                for reactor in reactors {
                    buffer.put(status, reactor.id(), &ReactorStatus::destroyed(reactor))?;
                }
                Ok(())
            })
            .await
    }
}

impl std::fmt::Debug for ReactorProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorProcessor")
            .field("topics", &self.topics)
            .field("activation_delay", &self.activation_delay)
            .finish_non_exhaustive()
    }
}
