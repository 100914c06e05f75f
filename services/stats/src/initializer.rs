//! Cold-start reconciliation of a character's stats.
//!
//! Inputs come from four peers, fetched in sequence: base values, equipped
//! assets, active buffs, passive skills. Each fetch stands alone. A failure is
//! logged at `warn` and the initializer carries on with what it has, so an
//! unavailable peer yields a partial model rather than no model.

use crate::model::{BaseStats, StatType, buff_bonuses, equipment_bonuses, passive_bonuses};
use realm_core::Tenant;
use realm_core::contribution::Contribution;
use realm_core::peer::{BuffPeer, CharacterPeer, GameDataPeer, InventoryPeer, PeerError, SkillPeer};

/// Every peer the stats initializer reads.
pub trait StatsPeers: CharacterPeer + InventoryPeer + BuffPeer + SkillPeer + GameDataPeer {}

impl<T> StatsPeers for T where T: CharacterPeer + InventoryPeer + BuffPeer + SkillPeer + GameDataPeer {}

/// What the peers reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seed {
    /// Base values; `None` when the character service failed
    pub base: Option<BaseStats>,
    /// Equipment, buff and passive contributions, in that order
    pub bonuses: Vec<Contribution<StatType>>,
}

fn absent(tenant: &Tenant, character_id: u32, input: &'static str, error: &PeerError) {
    tracing::warn!(
        tenant = %tenant,
        character_id,
        input,
        error = %error,
        "Stat input unavailable, continuing without it"
    );
}

/// Gather base values and contributions for one character.
pub async fn gather(peers: &dyn StatsPeers, tenant: &Tenant, character_id: u32) -> Seed {
    let mut seed = Seed::default();

    match peers.character_by_id(tenant, character_id).await {
        Ok(character) => seed.base = Some(BaseStats::from(&character)),
        Err(e) => absent(tenant, character_id, "base", &e),
    }

    match peers.equip_compartment(tenant, character_id).await {
        Ok(assets) => {
            for asset in assets.iter().filter(|a| a.is_equipped()) {
                if let Some(stats) = &asset.stats {
                    seed.bonuses.extend(equipment_bonuses(asset.id, stats));
                }
            }
        },
        Err(e) => absent(tenant, character_id, "equipment", &e),
    }

    match peers.character_buffs(tenant, character_id).await {
        Ok(buffs) => {
            for buff in &buffs {
                seed.bonuses.extend(buff_bonuses(buff.source_id, &buff.changes));
            }
        },
        Err(e) => absent(tenant, character_id, "buffs", &e),
    }

    match peers.character_skills(tenant, character_id).await {
        Ok(skills) => {
            for skill in skills.iter().filter(|s| s.level > 0) {
                match peers.skill_data(tenant, skill.id).await {
                    Ok(data) if data.is_passive() => {
                        if let Some(effect) = data.effect_for_level(skill.level) {
                            seed.bonuses.extend(passive_bonuses(skill.id, effect));
                        }
                    },
                    Ok(_) => {},
                    Err(e) => absent(tenant, character_id, "skill data", &e),
                }
            }
        },
        Err(e) => absent(tenant, character_id, "skills", &e),
    }

    tracing::debug!(
        tenant = %tenant,
        character_id,
        has_base = seed.base.is_some(),
        bonuses = seed.bonuses.len(),
        "Gathered stat inputs"
    );
    seed
}
