//! Inbound status handlers for the rates service.

use crate::events::WorldRateChanged;
use crate::model::{RateType, TrackedItem};
use crate::processor::RatesProcessor;
use chrono::{DateTime, Utc};
use realm_core::event::SerializedEvent;
use realm_core::peer::PeerError;
use realm_core::status::{AssetChange, AssetStatus, BuffChange, BuffStatus, CharacterChange, CharacterStatus};
use realm_core::{RealmError, RealmResult, Tenant};
use realm_runtime::consumer::{HandlerFuture, MessageHandler};

fn ignore_absent<T>(result: RealmResult<T>) -> RealmResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            tracing::debug!(error = %e, "No rate model, change ignored");
            Ok(())
        },
        Err(e) => Err(e),
    }
}

/// Coupon purchases, bonus-EXP equipment moves, and item deletions.
#[derive(Debug, Clone)]
pub struct AssetStatusHandler {
    processor: RatesProcessor,
}

impl AssetStatusHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: RatesProcessor) -> Self {
        Self { processor }
    }

    async fn coupon(
        &self,
        tenant: &Tenant,
        status: &AssetStatus,
        acquired_at: Option<DateTime<Utc>>,
    ) -> RealmResult<()> {
        let Some(rate_type) = RateType::for_coupon(status.template_id) else {
            return Ok(());
        };
        let data = self
            .processor
            .peers()
            .cash_item_data(tenant, status.template_id)
            .await?;
        if !data.has_rate_properties() {
            return Ok(());
        }
        let item = TrackedItem::Coupon {
            template_id: status.template_id,
            rate_type,
            base_rate: data.rate,
            duration_minutes: data.time_minutes,
            acquired_at: acquired_at.unwrap_or_else(|| self.processor.now()),
            windows: data.time_windows,
        };
        ignore_absent(self.processor.track_item(tenant, status.character_id, item).await)
    }

    async fn equipped(&self, tenant: &Tenant, status: &AssetStatus) -> RealmResult<()> {
        let data = match self
            .processor
            .peers()
            .equipment_data(tenant, status.template_id)
            .await
        {
            Ok(data) => data,
            Err(PeerError::NotFound { .. }) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !data.has_bonus_exp() {
            return Ok(());
        }
        let item = TrackedItem::BonusExp {
            template_id: status.template_id,
            tiers: data.bonus_exp,
            equipped_since: Some(self.processor.now()),
        };
        ignore_absent(self.processor.track_item(tenant, status.character_id, item).await)
    }

    async fn apply(&self, tenant: Tenant, status: AssetStatus) -> RealmResult<()> {
        if !self.processor.registry().contains(&tenant, &status.character_id) {
            tracing::debug!(character_id = status.character_id, "No rate model, asset change ignored");
            return Ok(());
        }
        match &status.change {
            AssetChange::Created(created) => self.coupon(&tenant, &status, created.created_at).await,
            AssetChange::Moved(_) if status.is_equip() => self.equipped(&tenant, &status).await,
            AssetChange::Moved(_) if status.is_unequip() => ignore_absent(
                self.processor
                    .untrack_item(&tenant, status.character_id, status.template_id)
                    .await,
            ),
            AssetChange::Deleted => ignore_absent(
                self.processor
                    .untrack_item(&tenant, status.character_id, status.template_id)
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

/// Rate buffs.
#[derive(Debug, Clone)]
pub struct BuffStatusHandler {
    processor: RatesProcessor,
}

impl BuffStatusHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: RatesProcessor) -> Self {
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
                        .add_buff_factors(tenant, status.character_id, buff.source_id, &buff.changes)
                        .await,
                ),
                BuffChange::Expired(buff) => ignore_absent(
                    self.processor
                        .remove_buff_factors(tenant, status.character_id, buff.source_id)
                        .await,
                ),
                BuffChange::Other => Ok(()),
            }
        })
    }
}

/// Logout.
#[derive(Debug, Clone)]
pub struct CharacterStatusHandler {
    processor: RatesProcessor,
}

impl CharacterStatusHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: RatesProcessor) -> Self {
        Self { processor }
    }
}

impl MessageHandler for CharacterStatusHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let status: CharacterStatus = event.decode().map_err(RealmError::from)?;
            if let CharacterChange::Logout(_) = status.change {
                self.processor.remove_character(&event.tenant, status.character_id);
            }
            Ok(())
        })
    }
}

/// Operator world rate changes.
#[derive(Debug, Clone)]
pub struct WorldRateHandler {
    processor: RatesProcessor,
}

impl WorldRateHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: RatesProcessor) -> Self {
        Self { processor }
    }
}

impl MessageHandler for WorldRateHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            if event.event_type != "WORLD_RATE_CHANGED" {
                return Ok(());
            }
            let change: WorldRateChanged = event.decode().map_err(RealmError::from)?;
            if !change.multiplier.is_finite() || change.multiplier < 0.0 {
                tracing::warn!(multiplier = change.multiplier, "Rejected world rate");
                return Ok(());
            }
            self.processor
                .update_world_rate(&event.tenant, change.world_id, change.rate_type, change.multiplier)
                .await?;
            Ok(())
        })
    }
}
