//! JSON:API representation of a stat model.

use crate::model::{BaseStats, StatModel, StatType};
use realm_core::contribution::Contribution;
use realm_web::ToResource;
use serde::Serialize;
use std::collections::BTreeMap;

/// Attributes of a `stats` resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatAttributes {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Effective values
    pub values: BTreeMap<StatType, u32>,
    /// Base values
    pub base: BaseStats,
    /// Every contribution, ordered by source
    pub bonuses: Vec<Contribution<StatType>>,
}

impl ToResource for StatModel {
    const TYPE: &'static str = "stats";
    type Attributes = StatAttributes;

    fn resource_id(&self) -> String {
        self.character_id().to_string()
    }

    fn attributes(&self) -> StatAttributes {
        StatAttributes {
            world_id: self.world_id(),
            channel_id: self.channel_id(),
            values: self.computed().clone(),
            base: *self.base(),
            bonuses: self.bonuses().to_vec(),
        }
    }
}
