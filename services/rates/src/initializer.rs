//! Cold-start reconciliation of a character's rates.
//!
//! Three inputs, fetched in order: bonus-EXP equipment, rate coupons in the
//! cash compartment, and active buffs. A failed input is logged and skipped.

use crate::model::{RateType, TrackedItem, buff_multiplier, buff_source};
use chrono::{DateTime, Utc};
use realm_core::Tenant;
use realm_core::contribution::Contribution;
use realm_core::peer::{BuffPeer, GameDataPeer, InventoryPeer, PeerError};

/// Every peer the rates initializer reads.
pub trait RatesPeers: InventoryPeer + BuffPeer + GameDataPeer {}

impl<T> RatesPeers for T where T: InventoryPeer + BuffPeer + GameDataPeer {}

/// What the peers reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seed {
    /// Bonus-EXP equipment and coupons
    pub items: Vec<TrackedItem>,
    /// Buff factors
    pub factors: Vec<Contribution<RateType>>,
}

fn absent(tenant: &Tenant, character_id: u32, input: &'static str, error: &PeerError) {
    tracing::warn!(
        tenant = %tenant,
        character_id,
        input,
        error = %error,
        "Rate input unavailable, continuing without it"
    );
}

async fn bonus_exp_items(
    peers: &dyn RatesPeers,
    tenant: &Tenant,
    character_id: u32,
    now: DateTime<Utc>,
    seed: &mut Seed,
) {
    let assets = match peers.equip_compartment(tenant, character_id).await {
        Ok(assets) => assets,
        Err(e) => return absent(tenant, character_id, "equipment", &e),
    };
    for asset in assets.iter().filter(|a| a.is_equipped()) {
        let data = match peers.equipment_data(tenant, asset.template_id).await {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(template_id = asset.template_id, error = %e, "No equipment data");
                continue;
            },
        };
        if !data.has_bonus_exp() {
            continue;
        }
        let equipped_since = asset.equipped_since.unwrap_or_else(|| {
            tracing::warn!(
                character_id,
                template_id = asset.template_id,
                "Equipped asset has no equip time, using now"
            );
            now
        });
        seed.items.push(TrackedItem::BonusExp {
            template_id: asset.template_id,
            tiers: data.bonus_exp,
            equipped_since: Some(equipped_since),
        });
    }
}

async fn coupons(
    peers: &dyn RatesPeers,
    tenant: &Tenant,
    character_id: u32,
    now: DateTime<Utc>,
    seed: &mut Seed,
) {
    let assets = match peers.cash_compartment(tenant, character_id).await {
        Ok(assets) => assets,
        Err(e) => return absent(tenant, character_id, "cash", &e),
    };
    for asset in &assets {
        let Some(rate_type) = RateType::for_coupon(asset.template_id) else {
            continue;
        };
        let data = match peers.cash_item_data(tenant, asset.template_id).await {
            Ok(data) if data.has_rate_properties() => data,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(template_id = asset.template_id, error = %e, "No cash item data");
                continue;
            },
        };
        seed.items.push(TrackedItem::Coupon {
            template_id: asset.template_id,
            rate_type,
            base_rate: data.rate,
            duration_minutes: data.time_minutes,
            acquired_at: asset.created_at.unwrap_or(now),
            windows: data.time_windows,
        });
    }
}

async fn buffs(
    peers: &dyn RatesPeers,
    tenant: &Tenant,
    character_id: u32,
    now: DateTime<Utc>,
    seed: &mut Seed,
) {
    let buffs = match peers.character_buffs(tenant, character_id).await {
        Ok(buffs) => buffs,
        Err(e) => return absent(tenant, character_id, "buffs", &e),
    };
    for buff in buffs.iter().filter(|b| b.expires_at.is_none_or(|at| at > now)) {
        seed.factors.extend(buff_factors(buff.source_id, &buff.changes));
    }
}

/// Rate factors of a buff's stat changes.
#[must_use]
pub fn buff_factors(
    source_id: i32,
    changes: &[realm_core::peer::StatChange],
) -> Vec<Contribution<RateType>> {
    changes
        .iter()
        .filter_map(|change| {
            RateType::from_buff(&change.kind).map(|rate_type| {
                Contribution::multiplier(buff_source(source_id), rate_type, buff_multiplier(change.amount))
            })
        })
        .collect()
}

/// Gather tracked items and buff factors for one character.
pub async fn gather(
    peers: &dyn RatesPeers,
    tenant: &Tenant,
    character_id: u32,
    now: DateTime<Utc>,
) -> Seed {
    let mut seed = Seed::default();
    bonus_exp_items(peers, tenant, character_id, now, &mut seed).await;
    coupons(peers, tenant, character_id, now, &mut seed).await;
    buffs(peers, tenant, character_id, now, &mut seed).await;
    tracing::debug!(
        tenant = %tenant,
        character_id,
        items = seed.items.len(),
        factors = seed.factors.len(),
        "Gathered rate inputs"
    );
    seed
}
