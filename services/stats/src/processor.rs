//! Stat operations.
//!
//! Every mutation runs inside [`Emitter::emit`]: the registry update and the
//! resulting `STAT_CHANGED` / `CLAMP_HP_MP` messages are produced under the
//! tenant write lock, then published once the update has committed. A
//! mutation for a character with no model fails with not-found; models are
//! only created by [`StatsProcessor::get`].

use crate::events::{Topics, buffer_changes};
use crate::initializer::{self, StatsPeers};
use crate::model::{
    BaseStats, StatModel, StatType, buff_bonuses, buff_source, equipment_bonuses,
    equipment_source, passive_bonuses, passive_source,
};
use realm_core::contribution::Contribution;
use realm_core::emitter::Emitter;
use realm_core::init_tracker::InitTracker;
use realm_core::peer::{EquipmentStats, SkillEffect, StatChange};
use realm_core::registry::TenantRegistry;
use realm_core::{RealmResult, Tenant};
use std::sync::Arc;

/// Stats service entry point.
#[derive(Clone)]
pub struct StatsProcessor {
    registry: Arc<TenantRegistry<StatModel>>,
    tracker: Arc<InitTracker>,
    peers: Arc<dyn StatsPeers>,
    emitter: Emitter,
    topics: Topics,
}

impl StatsProcessor {
    /// Processor over fresh registries.
    #[must_use]
    pub fn new(peers: Arc<dyn StatsPeers>, emitter: Emitter, topics: Topics) -> Self {
        Self {
            registry: Arc::new(TenantRegistry::new()),
            tracker: Arc::new(InitTracker::new()),
            peers,
            emitter,
            topics,
        }
    }

    /// The model registry.
    #[must_use]
    pub fn registry(&self) -> &TenantRegistry<StatModel> {
        &self.registry
    }

    /// Peer services.
    #[must_use]
    pub fn peers(&self) -> &dyn StatsPeers {
        self.peers.as_ref()
    }

    /// The initialization tracker.
    #[must_use]
    pub fn tracker(&self) -> &InitTracker {
        &self.tracker
    }

    /// Effective stats of a character, initializing from peers on first access.
    ///
    /// # Errors
    ///
    /// Registry errors only; peer failures degrade the model instead.
    pub async fn get(
        &self,
        tenant: &Tenant,
        world_id: u8,
        channel_id: u8,
        character_id: u32,
    ) -> RealmResult<StatModel> {
        if !self.tracker.try_begin(tenant, character_id) {
            return self.registry.get_or_create(tenant, &character_id, || {
                StatModel::new(character_id, world_id, channel_id)
            });
        }

        realm_runtime::metrics::record_initializer_run("stats");
        let seed = initializer::gather(self.peers.as_ref(), tenant, character_id).await;
        self.registry.get_or_create(tenant, &character_id, || {
            StatModel::new(character_id, world_id, channel_id)
        })?;
        let model = self.registry.update(tenant, &character_id, |current| {
            let base = seed.base.unwrap_or(*current.base());
            Ok(current
                .with_base(base)
                .with_bonuses(current.bonuses().with_many(seed.bonuses)))
        })?;
        self.tracker.mark_complete(tenant, character_id);

        tracing::info!(
            tenant = %tenant,
            character_id,
            bonuses = model.bonuses().len(),
            "Initialized stats"
        );
        Ok(model)
    }

    /// Discard the model and initialize again from peers.
    ///
    /// Changes against the discarded model are published, including a clamp
    /// when max HP or MP went down.
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
    ) -> RealmResult<StatModel> {
        let previous = self.registry.find(tenant, &character_id);
        self.tracker.clear(tenant, character_id);
        self.registry.delete(tenant, &character_id);

        let model = self.get(tenant, world_id, channel_id, character_id).await?;
        if let Some(previous) = previous {
            let topics = &self.topics;
            self.emitter
                .emit(tenant, |buffer| {
                    buffer_changes(buffer, topics, &previous, &model)?;
                    Ok(())
                })
                .await?;
        }
        Ok(model)
    }

    async fn mutate(
        &self,
        tenant: &Tenant,
        character_id: u32,
        change: impl FnOnce(&StatModel) -> StatModel,
    ) -> RealmResult<StatModel> {
        let registry = &self.registry;
        let topics = &self.topics;
        self.emitter
            .emit(tenant, |buffer| {
                let (model, previous) = registry.update_with(tenant, &character_id, |current| {
                    Ok((change(current), current.clone()))
                })?;
                buffer_changes(buffer, topics, &previous, &model)?;
                Ok(model)
            })
            .await
    }

    /// Replace the base values.
    ///
    /// # Errors
    ///
    /// Not-found if the character has no model; registry or bus errors.
    pub async fn set_base(
        &self,
        tenant: &Tenant,
        character_id: u32,
        base: BaseStats,
    ) -> RealmResult<StatModel> {
        self.mutate(tenant, character_id, |m| m.with_base(base)).await
    }

    /// Re-read base values from the character service.
    ///
    /// # Errors
    ///
    /// Peer-unavailable if the character cannot be fetched; see [`set_base`](Self::set_base).
    pub async fn refresh_base(&self, tenant: &Tenant, character_id: u32) -> RealmResult<StatModel> {
        let character = self.peers.character_by_id(tenant, character_id).await?;
        self.set_base(tenant, character_id, BaseStats::from(&character)).await
    }

    /// Add or replace a flat bonus.
    ///
    /// # Errors
    ///
    /// See [`set_base`](Self::set_base).
    pub async fn add_bonus(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source: &str,
        stat: StatType,
        amount: i32,
    ) -> RealmResult<StatModel> {
        let bonus = Contribution::flat(source, stat, amount);
        self.mutate(tenant, character_id, |m| m.with_bonuses(m.bonuses().with(bonus)))
            .await
    }

    /// Add or replace a percentage bonus (`0.10` is +10%).
    ///
    /// # Errors
    ///
    /// See [`set_base`](Self::set_base).
    pub async fn add_multiplier_bonus(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source: &str,
        stat: StatType,
        multiplier: f64,
    ) -> RealmResult<StatModel> {
        let bonus = Contribution::multiplier(source, stat, multiplier);
        self.mutate(tenant, character_id, |m| m.with_bonuses(m.bonuses().with(bonus)))
            .await
    }

    /// Remove one `(source, stat)` bonus.
    ///
    /// # Errors
    ///
    /// See [`set_base`](Self::set_base).
    pub async fn remove_bonus(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source: &str,
        stat: StatType,
    ) -> RealmResult<StatModel> {
        self.mutate(tenant, character_id, |m| {
            m.with_bonuses(m.bonuses().without(source, stat))
        })
        .await
    }

    /// Remove every bonus of a source.
    ///
    /// # Errors
    ///
    /// See [`set_base`](Self::set_base).
    pub async fn remove_by_source(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source: &str,
    ) -> RealmResult<StatModel> {
        self.mutate(tenant, character_id, |m| {
            m.with_bonuses(m.bonuses().without_source(source))
        })
        .await
    }

    async fn replace_source(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source: &str,
        bonuses: Vec<Contribution<StatType>>,
    ) -> RealmResult<StatModel> {
        self.mutate(tenant, character_id, |m| {
            m.with_bonuses(m.bonuses().without_source(source).with_many(bonuses))
        })
        .await
    }

    /// Apply an equipped asset's stats.
    ///
    /// # Errors
    ///
    /// See [`set_base`](Self::set_base).
    pub async fn add_equipment_bonuses(
        &self,
        tenant: &Tenant,
        character_id: u32,
        asset_id: u32,
        stats: &EquipmentStats,
    ) -> RealmResult<StatModel> {
        let source = equipment_source(asset_id);
        self.replace_source(tenant, character_id, &source, equipment_bonuses(asset_id, stats))
            .await
    }

    /// Retract an asset's stats.
    ///
    /// # Errors
    ///
    /// See [`set_base`](Self::set_base).
    pub async fn remove_equipment_bonuses(
        &self,
        tenant: &Tenant,
        character_id: u32,
        asset_id: u32,
    ) -> RealmResult<StatModel> {
        self.remove_by_source(tenant, character_id, &equipment_source(asset_id))
            .await
    }

    /// Apply a buff's stat changes.
    ///
    /// # Errors
    ///
    /// See [`set_base`](Self::set_base).
    pub async fn add_buff_bonuses(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source_id: i32,
        changes: &[StatChange],
    ) -> RealmResult<StatModel> {
        let source = buff_source(source_id);
        self.replace_source(tenant, character_id, &source, buff_bonuses(source_id, changes))
            .await
    }

    /// Retract a buff.
    ///
    /// # Errors
    ///
    /// See [`set_base`](Self::set_base).
    pub async fn remove_buff_bonuses(
        &self,
        tenant: &Tenant,
        character_id: u32,
        source_id: i32,
    ) -> RealmResult<StatModel> {
        self.remove_by_source(tenant, character_id, &buff_source(source_id))
            .await
    }

    /// Apply a passive skill's effect.
    ///
    /// # Errors
    ///
    /// See [`set_base`](Self::set_base).
    pub async fn add_passive_bonuses(
        &self,
        tenant: &Tenant,
        character_id: u32,
        skill_id: u32,
        effect: &SkillEffect,
    ) -> RealmResult<StatModel> {
        let source = passive_source(skill_id);
        self.replace_source(tenant, character_id, &source, passive_bonuses(skill_id, effect))
            .await
    }

    /// Retract a passive skill.
    ///
    /// # Errors
    ///
    /// See [`set_base`](Self::set_base).
    pub async fn remove_passive_bonuses(
        &self,
        tenant: &Tenant,
        character_id: u32,
        skill_id: u32,
    ) -> RealmResult<StatModel> {
        self.remove_by_source(tenant, character_id, &passive_source(skill_id))
            .await
    }

    /// Re-evaluate a passive skill after a level change.
    ///
    /// # Errors
    ///
    /// Peer-unavailable if the skill data cannot be fetched; see [`set_base`](Self::set_base).
    pub async fn refresh_passive(
        &self,
        tenant: &Tenant,
        character_id: u32,
        skill_id: u32,
        level: u8,
    ) -> RealmResult<StatModel> {
        let data = self.peers.skill_data(tenant, skill_id).await?;
        match data.effect_for_level(level).filter(|_| data.is_passive()) {
            Some(effect) => {
                self.add_passive_bonuses(tenant, character_id, skill_id, effect)
                    .await
            },
            None => {
                self.remove_passive_bonuses(tenant, character_id, skill_id)
                    .await
            },
        }
    }

    /// Forget a character (logout). The next access initializes again.
    pub fn remove_character(&self, tenant: &Tenant, character_id: u32) {
        self.registry.delete(tenant, &character_id);
        self.tracker.clear(tenant, character_id);
        tracing::debug!(tenant = %tenant, character_id, "Removed stats model");
    }
}

impl std::fmt::Debug for StatsProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsProcessor")
            .field("topics", &self.topics)
            .finish_non_exhaustive()
    }
}
