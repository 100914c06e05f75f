//! World-wide rate settings.
//!
//! Set by operators through the world rate topic. A character model picks up
//! its world's rates when it is created; later changes are pushed to every
//! live model of that world.

use crate::model::RateType;
use realm_core::Tenant;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

/// Rates per `(tenant, world)`.
#[derive(Debug, Default)]
pub struct WorldRates {
    rates: RwLock<HashMap<(Tenant, u8), BTreeMap<RateType, f64>>>,
}

impl WorldRates {
    /// No world rates set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a world rate.
    pub fn set(&self, tenant: &Tenant, world_id: u8, rate_type: RateType, multiplier: f64) {
        self.rates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((tenant.clone(), world_id))
            .or_default()
            .insert(rate_type, multiplier);
    }

    /// Rates set for a world.
    #[must_use]
    pub fn get(&self, tenant: &Tenant, world_id: u8) -> BTreeMap<RateType, f64> {
        self.rates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(tenant.clone(), world_id))
            .cloned()
            .unwrap_or_default()
    }
}
