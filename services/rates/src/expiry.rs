//! Periodic coupon expiry.

use crate::processor::RatesProcessor;
use chrono::{DateTime, Utc};
use realm_runtime::ticker::{Tickable, TickFuture, for_each_tenant};

/// Drops coupons whose duration has run out.
#[derive(Debug, Clone)]
pub struct CouponExpiry {
    processor: RatesProcessor,
}

impl CouponExpiry {
    /// Sweeper over a processor.
    #[must_use]
    pub const fn new(processor: RatesProcessor) -> Self {
        Self { processor }
    }
}

impl Tickable for CouponExpiry {
    fn name(&self) -> &'static str {
        "coupon-expiry"
    }

    fn tick(&self, now: DateTime<Utc>) -> TickFuture<'_> {
        Box::pin(async move {
            let tenants = self.processor.registry().tenants();
            for_each_tenant(tenants, |tenant| async move {
                let dropped = self.processor.sweep_expired(&tenant, now).await;
                if dropped > 0 {
                    tracing::debug!(tenant = %tenant, dropped, "Coupon sweep");
                }
            })
            .await;
        })
    }
}
