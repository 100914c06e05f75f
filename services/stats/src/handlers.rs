//! Inbound peer status handlers.
//!
//! Changes for characters without a model are dropped: the model picks them
//! up from the peers when it is first read.

use crate::processor::StatsProcessor;
use realm_core::event::SerializedEvent;
use realm_core::peer::EquipmentStats;
use realm_core::status::{
    AssetChange, AssetStatus, BuffChange, BuffStatus, CharacterChange, CharacterStatus,
    SkillChange, SkillStatus,
};
use realm_core::{RealmError, RealmResult, Tenant};
use realm_runtime::consumer::{HandlerFuture, MessageHandler};

fn ignore_absent<T>(result: RealmResult<T>) -> RealmResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            tracing::debug!(error = %e, "No stats model, change ignored");
            Ok(())
        },
        Err(e) => Err(e),
    }
}

/// Equipment moves and deletions.
#[derive(Debug, Clone)]
pub struct AssetStatusHandler {
    processor: StatsProcessor,
}

impl AssetStatusHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: StatsProcessor) -> Self {
        Self { processor }
    }

    async fn equipped_stats(
        &self,
        tenant: &Tenant,
        status: &AssetStatus,
        carried: Option<&EquipmentStats>,
    ) -> RealmResult<Option<EquipmentStats>> {
        if let Some(stats) = carried {
            return Ok(Some(*stats));
        }
        let assets = self
            .processor
            .peers()
            .equip_compartment(tenant, status.character_id)
            .await?;
        Ok(assets
            .into_iter()
            .find(|a| a.id == status.asset_id)
            .and_then(|a| a.stats))
    }

    async fn apply(&self, tenant: Tenant, status: AssetStatus) -> RealmResult<()> {
        let character_id = status.character_id;
        match &status.change {
            AssetChange::Moved(moved) if status.is_equip() => {
                let Some(stats) = self
                    .equipped_stats(&tenant, &status, moved.stats.as_ref())
                    .await?
                else {
                    tracing::debug!(asset_id = status.asset_id, "Equipped asset has no stats");
                    return Ok(());
                };
                ignore_absent(
                    self.processor
                        .add_equipment_bonuses(&tenant, character_id, status.asset_id, &stats)
                        .await,
                )
            },
            AssetChange::Moved(_) if status.is_unequip() => ignore_absent(
                self.processor
                    .remove_equipment_bonuses(&tenant, character_id, status.asset_id)
                    .await,
            ),
            AssetChange::Deleted if status.slot < 0 => ignore_absent(
                self.processor
                    .remove_equipment_bonuses(&tenant, character_id, status.asset_id)
                    .await,
            ),
            _ => Ok(()),
        }
    }
}

impl MessageHandler for AssetStatusHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let status: AssetStatus = event.decode().map_err(RealmError::from)?;
            self.apply(event.tenant, status).await
        })
    }
}

/// Buff application and expiry.
#[derive(Debug, Clone)]
pub struct BuffStatusHandler {
    processor: StatsProcessor,
}

impl BuffStatusHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: StatsProcessor) -> Self {
        Self { processor }
    }
}

impl MessageHandler for BuffStatusHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let status: BuffStatus = event.decode().map_err(RealmError::from)?;
            let tenant = &event.tenant;
            match status.change {
                BuffChange::Applied(buff) => ignore_absent(
                    self.processor
                        .add_buff_bonuses(tenant, status.character_id, buff.source_id, &buff.changes)
                        .await,
                ),
                BuffChange::Expired(buff) => ignore_absent(
                    self.processor
                        .remove_buff_bonuses(tenant, status.character_id, buff.source_id)
                        .await,
                ),
                BuffChange::Other => Ok(()),
            }
        })
    }
}

/// Logout and base stat changes.
#[derive(Debug, Clone)]
pub struct CharacterStatusHandler {
    processor: StatsProcessor,
}

impl CharacterStatusHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: StatsProcessor) -> Self {
        Self { processor }
    }
}

impl MessageHandler for CharacterStatusHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let status: CharacterStatus = event.decode().map_err(RealmError::from)?;
            let tenant = &event.tenant;
            match status.change {
                CharacterChange::Logout(_) => {
                    self.processor.remove_character(tenant, status.character_id);
                    Ok(())
                },
                CharacterChange::StatChanged(_) => {
                    if !self.processor.registry().contains(tenant, &status.character_id) {
                        return Ok(());
                    }
                    ignore_absent(self.processor.refresh_base(tenant, status.character_id).await)
                },
                _ => Ok(()),
            }
        })
    }
}

/// Skill level changes, re-evaluating passives.
#[derive(Debug, Clone)]
pub struct SkillStatusHandler {
    processor: StatsProcessor,
}

impl SkillStatusHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: StatsProcessor) -> Self {
        Self { processor }
    }
}

impl MessageHandler for SkillStatusHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let status: SkillStatus = event.decode().map_err(RealmError::from)?;
            let tenant = &event.tenant;
            match status.change {
                SkillChange::Updated(skill) => {
                    if !self.processor.registry().contains(tenant, &status.character_id) {
                        return Ok(());
                    }
                    ignore_absent(
                        self.processor
                            .refresh_passive(tenant, status.character_id, skill.skill_id, skill.level)
                            .await,
                    )
                },
                SkillChange::Other => Ok(()),
            }
        })
    }
}
