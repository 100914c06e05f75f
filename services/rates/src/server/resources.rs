//! JSON:API representations of rates.

use crate::model::RateType;
use crate::processor::RateView;
use realm_core::contribution::Contribution;
use realm_web::ToResource;
use serde::Serialize;
use std::collections::BTreeMap;

/// Attributes of a `rates` resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateAttributes {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Rate per type
    pub rates: BTreeMap<RateType, f64>,
    /// Factors that produced them
    pub factors: Vec<Contribution<RateType>>,
}

impl ToResource for RateView {
    const TYPE: &'static str = "rates";
    type Attributes = RateAttributes;

    fn resource_id(&self) -> String {
        self.character_id.to_string()
    }

    fn attributes(&self) -> RateAttributes {
        RateAttributes {
            world_id: self.world_id,
            channel_id: self.channel_id,
            rates: self.rates.clone(),
            factors: self.factors.clone(),
        }
    }
}

/// Current factor of one tracked item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFactor(pub Contribution<RateType>);

/// Attributes of a `rate-items` resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFactorAttributes {
    /// Rate the item scales
    pub rate_type: RateType,
    /// Multiplier right now
    pub multiplier: f64,
}

impl ToResource for ItemFactor {
    const TYPE: &'static str = "rate-items";
    type Attributes = ItemFactorAttributes;

    fn resource_id(&self) -> String {
        self.0
            .source
            .strip_prefix("item:")
            .unwrap_or(&self.0.source)
            .to_string()
    }

    fn attributes(&self) -> ItemFactorAttributes {
        ItemFactorAttributes {
            rate_type: self.0.target,
            multiplier: self.0.multiplier,
        }
    }
}
