//! Rate operations.
//!
//! Tracked items are re-evaluated on every read: the stored model keeps the
//! item definitions and their start instants, and [`RateView`] folds them
//! with the stored factors at the current clock reading.

use crate::events::{RateChanged, Topics, buffer_changes};
use crate::initializer::{self, RatesPeers, buff_factors};
use crate::model::{RateModel, RateType, TrackedItem, WORLD_SOURCE, buff_source, item_source};
use crate::world::WorldRates;
use chrono::{DateTime, Utc};
use realm_core::contribution::{Contribution, ContributionSet};
use realm_core::emitter::Emitter;
use realm_core::environment::Clock;
use realm_core::init_tracker::InitTracker;
use realm_core::peer::StatChange;
use realm_core::registry::{ContainerKey, TenantRegistry};
use realm_core::{RealmResult, Tenant};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Rates of one character at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateView {
    /// Character id
    pub character_id: u32,
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Computed rates
    pub rates: BTreeMap<RateType, f64>,
    /// Every factor that went into them
    pub factors: Vec<Contribution<RateType>>,
}

impl RateView {
    /// Evaluate `model` at `now`.
    #[must_use]
    pub fn at(model: &RateModel, now: DateTime<Utc>) -> Self {
        let factors = model.all_factors(now);
        Self {
            character_id: model.character_id(),
            world_id: model.world_id(),
            channel_id: model.channel_id(),
            rates: model.rates(now),
            factors: factors.to_vec(),
        }
    }

    /// One rate.
    #[must_use]
    pub fn rate(&self, rate_type: RateType) -> f64 {
        self.rates.get(&rate_type).copied().unwrap_or(1.0)
    }
}

/// Rates service entry point.
#[derive(Clone)]
pub struct RatesProcessor {
    registry: Arc<TenantRegistry<RateModel>>,
    tracker: Arc<InitTracker>,
    worlds: Arc<WorldRates>,
    peers: Arc<dyn RatesPeers>,
    emitter: Emitter,
    topics: Topics,
    clock: Arc<dyn Clock>,
}

impl RatesProcessor {
    /// Processor over fresh registries.
    #[must_use]
    pub fn new(
        peers: Arc<dyn RatesPeers>,
        emitter: Emitter,
        topics: Topics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: Arc::new(TenantRegistry::new()),
            tracker: Arc::new(InitTracker::new()),
            worlds: Arc::new(WorldRates::new()),
            peers,
            emitter,
            topics,
            clock,
        }
    }

    /// The model registry.
    #[must_use]
    pub fn registry(&self) -> &TenantRegistry<RateModel> {
        &self.registry
    }

    /// The initialization tracker.
    #[must_use]
    pub fn tracker(&self) -> &InitTracker {
        &self.tracker
    }

    /// Peer services.
    #[must_use]
    pub fn peers(&self) -> &dyn RatesPeers {
        self.peers.as_ref()
    }

    /// Current clock reading.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn fresh(&self, tenant: &Tenant, world_id: u8, channel_id: u8, character_id: u32) -> RateModel {
        let world = self
            .worlds
            .get(tenant, world_id)
            .into_iter()
            .map(|(rate_type, multiplier)| Contribution::multiplier(WORLD_SOURCE, rate_type, multiplier))
            .collect::<ContributionSet<RateType>>();
        RateModel::new(character_id, world_id, channel_id).with_factors(world)
    }

    async fn ensure(
        &self,
        tenant: &Tenant,
        world_id: u8,
        channel_id: u8,
        character_id: u32,
    ) -> RealmResult<RateModel> {
        if !self.tracker.try_begin(tenant, character_id) {
            return self.registry.get_or_create(tenant, &character_id, || {
                self.fresh(tenant, world_id, channel_id, character_id)
            });
        }

        realm_runtime::metrics::record_initializer_run("rates");
        let seed = initializer::gather(self.peers.as_ref(), tenant, character_id, self.now()).await;
        self.registry.get_or_create(tenant, &character_id, || {
            self.fresh(tenant, world_id, channel_id, character_id)
        })?;
        let model = self.registry.update(tenant, &character_id, |current| {
            let seeded = seed
                .items
                .into_iter()
                .fold(current.clone(), |model, item| model.with_item(item));
            Ok(seeded.with_factors(seeded.factors().with_many(seed.factors)))
        })?;
        self.tracker.mark_complete(tenant, character_id);

        tracing::info!(
            tenant = %tenant,
            character_id,
            items = model.items().len(),
            "Initialized rates"
        );
        Ok(model)
    }

    /// Rates of a character, initializing on first access. Expired coupons
    /// are dropped before evaluation.
    ///
    /// # Errors
    ///
    /// Registry or bus errors.
    pub async fn get(
        &self,
        tenant: &Tenant,
        world_id: u8,
        channel_id: u8,
        character_id: u32,
    ) -> RealmResult<RateView> {
        let model = self.ensure(tenant, world_id, channel_id, character_id).await?;
        let now = self.now();
        let model = if model.expired_items(now).is_empty() {
            model
        } else {
            self.mutate(tenant, character_id, |m| Ok(m.without_expired(now))).await?
        };
        Ok(RateView::at(&model, now))
    }

    /// Current factors of tracked items.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub async fn item_factors(
        &self,
        tenant: &Tenant,
        world_id: u8,
        channel_id: u8,
        character_id: u32,
    ) -> RealmResult<Vec<Contribution<RateType>>> {
        self.get(tenant, world_id, channel_id, character_id).await?;
        let model = self.registry.get(tenant, &character_id)?;
        Ok(model.item_factors(self.now()))
    }

    /// Discard the model and initialize again.
    ///
    /// # Errors
    ///
    /// Registry or bus errors.
    pub async fn refresh(
        &self,
        tenant: &Tenant,
        world_id: u8,
        channel_id: u8,
        character_id: u32,
    ) -> RealmResult<RateView> {
        let previous = self.registry.find(tenant, &character_id);
        self.tracker.clear(tenant, character_id);
        self.registry.delete(tenant, &character_id);

        let model = self.ensure(tenant, world_id, channel_id, character_id).await?;
        let now = self.now();
        if let Some(previous) = previous {
            let topics = &self.topics;
            self.emitter
                .emit(tenant, |buffer| {
                    buffer_changes(buffer, topics, &previous, &model, now)?;
                    Ok(())
                })
                .await?;
        }
        Ok(RateView::at(&model, now))
    }

    async fn mutate(
        &self,
        tenant: &Tenant,
        character_id: u32,
        change: impl FnOnce(&RateModel) -> RealmResult<RateModel>,
    ) -> RealmResult<RateModel> {
        let registry = &self.registry;
        let topics = &self.topics;
        let now = self.now();
        self.emitter
            .emit(tenant, |buffer| {
                let (model, previous) = registry.update_with(tenant, &character_id, |current| {
                    Ok((change(current)?, current.clone()))
                })?;
                buffer_changes(buffer, topics, &previous, &model, now)?;
                Ok(model)
            })
            .await
    }

    /// Add or replace a factor.
    ///
    /// # Errors
    ///
    /// Not-found if the character has no model; registry or bus errors.
    pub async fn add_factor(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source: &str,
        rate_type: RateType,
        multiplier: f64,
    ) -> RealmResult<RateModel> {
        let factor = Contribution::multiplier(source, rate_type, multiplier);
        self.mutate(tenant, character_id, |m| Ok(m.with_factors(m.factors().with(factor))))
            .await
    }

    /// Remove one `(source, rate type)` factor.
    ///
    /// # Errors
    ///
    /// See [`add_factor`](Self::add_factor).
    pub async fn remove_factor(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source: &str,
        rate_type: RateType,
    ) -> RealmResult<RateModel> {
        self.mutate(tenant, character_id, |m| {
            Ok(m.with_factors(m.factors().without(source, rate_type)))
        })
        .await
    }

    /// Remove every factor of a source.
    ///
    /// # Errors
    ///
    /// See [`add_factor`](Self::add_factor).
    pub async fn remove_by_source(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source: &str,
    ) -> RealmResult<RateModel> {
        self.mutate(tenant, character_id, |m| {
            Ok(m.with_factors(m.factors().without_source(source)))
        })
        .await
    }

    /// Set a world rate and push it to every live model of that world.
    ///
    /// Returns how many models were updated.
    ///
    /// # Errors
    ///
    /// Bus errors; a model removed concurrently is skipped.
    pub async fn update_world_rate(
        &self,
        tenant: &Tenant,
        world_id: u8,
        rate_type: RateType,
        multiplier: f64,
    ) -> RealmResult<usize> {
        self.worlds.set(tenant, world_id, rate_type, multiplier);
        let mut updated = 0;
        for model in self.registry.by_container(tenant, &ContainerKey::World(world_id)) {
            match self
                .add_factor(tenant, model.character_id(), WORLD_SOURCE, rate_type, multiplier)
                .await
            {
                Ok(_) => updated += 1,
                Err(e) if e.is_not_found() => {},
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            tenant = %tenant,
            world_id,
            rate_type = %rate_type,
            multiplier,
            updated,
            "Updated world rate"
        );
        Ok(updated)
    }

    /// Apply a buff's rate effects.
    ///
    /// # Errors
    ///
    /// See [`add_factor`](Self::add_factor).
    pub async fn add_buff_factors(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source_id: i32,
        changes: &[StatChange],
    ) -> RealmResult<RateModel> {
        let source = buff_source(source_id);
        let factors = buff_factors(source_id, changes);
        self.mutate(tenant, character_id, |m| {
            Ok(m.with_factors(m.factors().without_source(&source).with_many(factors)))
        })
        .await
    }

    /// Retract a buff.
    ///
    /// # Errors
    ///
    /// See [`add_factor`](Self::add_factor).
    pub async fn remove_buff_factors(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source_id: i32,
    ) -> RealmResult<RateModel> {
        self.remove_by_source(tenant, character_id, &buff_source(source_id))
            .await
    }

    /// Start tracking an item, replacing one with the same template.
    ///
    /// # Errors
    ///
    /// See [`add_factor`](Self::add_factor).
    pub async fn track_item(
        &self,
        tenant: &Tenant,
        character_id: u32,
        item: TrackedItem,
    ) -> RealmResult<RateModel> {
        tracing::debug!(
            character_id,
            template_id = item.template_id(),
            rate_type = %item.rate_type(),
            "Tracking item"
        );
        self.mutate(tenant, character_id, |m| Ok(m.with_item(item))).await
    }

    /// Stop tracking an item and drop any static factors of it.
    ///
    /// # Errors
    ///
    /// See [`add_factor`](Self::add_factor).
    pub async fn untrack_item(
        &self,
        tenant: &Tenant,
        character_id: u32,
        template_id: u32,
    ) -> RealmResult<RateModel> {
        let source = item_source(template_id);
        self.mutate(tenant, character_id, |m| {
            let next = m.without_item(template_id);
            Ok(next.with_factors(next.factors().without_source(&source)))
        })
        .await
    }

    /// Move the equip time of a bonus-EXP item; `None` pauses it.
    ///
    /// Items that are not tracked bonus-EXP equipment are left alone.
    ///
    /// # Errors
    ///
    /// See [`add_factor`](Self::add_factor).
    pub async fn update_equipped_since(
        &self,
        tenant: &Tenant,
        character_id: u32,
        template_id: u32,
        since: Option<DateTime<Utc>>,
    ) -> RealmResult<RateModel> {
        self.mutate(tenant, character_id, |m| {
            Ok(match m.items().get(&template_id) {
                Some(TrackedItem::BonusExp { tiers, .. }) => m.with_item(TrackedItem::BonusExp {
                    template_id,
                    tiers: tiers.clone(),
                    equipped_since: since,
                }),
                _ => m.clone(),
            })
        })
        .await
    }

    /// Drop expired coupons of every character of a tenant.
    ///
    /// Each character that lost a coupon gets a `RATE_CHANGED`. Returns the
    /// number of coupons dropped.
    pub async fn sweep_expired(&self, tenant: &Tenant, now: DateTime<Utc>) -> usize {
        let mut dropped = 0;
        for model in self.registry.snapshot(tenant) {
            let expired = model.expired_items(now);
            if expired.is_empty() {
                continue;
            }
            let registry = &self.registry;
            let topics = &self.topics;
            let character_id = model.character_id();
            let result = self
                .emitter
                .emit(tenant, |buffer| {
                    let next = registry.update(tenant, &character_id, |m| Ok(m.without_expired(now)))?;
                    buffer.put(
                        &topics.status,
                        character_id,
                        &RateChanged {
                            world_id: next.world_id(),
                            channel_id: next.channel_id(),
                            character_id,
                            rates: next.rates(now),
                        },
                    )?;
                    Ok(())
                })
                .await;
            match result {
                Ok(()) => {
                    tracing::info!(tenant = %tenant, character_id, ?expired, "Expired coupons");
                    dropped += expired.len();
                },
                Err(e) if e.is_not_found() => {},
                Err(e) => {
                    tracing::error!(tenant = %tenant, character_id, error = %e, "Coupon expiry failed");
                },
            }
        }
        dropped
    }

    /// Forget a character (logout).
    pub fn remove_character(&self, tenant: &Tenant, character_id: u32) {
        self.registry.delete(tenant, &character_id);
        self.tracker.clear(tenant, character_id);
        tracing::debug!(tenant = %tenant, character_id, "Removed rate model");
    }
}

impl std::fmt::Debug for RatesProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatesProcessor")
            .field("topics", &self.topics)
            .finish_non_exhaustive()
    }
}
