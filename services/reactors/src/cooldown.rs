//! Re-creation cooldowns of destroyed reactors.

use crate::model::CooldownKey;
use chrono::{DateTime, Duration, Utc};
use realm_core::Tenant;
use realm_core::registry::MapKey;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// `(tenant, position) → eligible-at`.
#[derive(Debug, Default)]
pub struct Cooldowns {
    entries: Mutex<HashMap<Tenant, HashMap<CooldownKey, DateTime<Utc>>>>,
}

impl Cooldowns {
    /// No cooldowns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HashMap<Tenant, HashMap<CooldownKey, DateTime<Utc>>>) -> R) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut entries)
    }

    /// Block `key` for `delay_ms` from `now`. A zero delay records nothing.
    pub fn record(&self, tenant: &Tenant, key: CooldownKey, delay_ms: u32, now: DateTime<Utc>) {
        if delay_ms == 0 {
            return;
        }
        let until = now + Duration::milliseconds(i64::from(delay_ms));
        self.with(|e| e.entry(tenant.clone()).or_default().insert(key, until));
    }

    /// Whether `key` is still blocked at `now`.
    #[must_use]
    pub fn is_active(&self, tenant: &Tenant, key: &CooldownKey, now: DateTime<Utc>) -> bool {
        self.with(|e| {
            e.get(tenant)
                .and_then(|keys| keys.get(key))
                .is_some_and(|until| *until > now)
        })
    }

    /// Lift one cooldown.
    pub fn clear(&self, tenant: &Tenant, key: &CooldownKey) {
        self.with(|e| {
            if let Some(keys) = e.get_mut(tenant) {
                keys.remove(key);
            }
        });
    }

    /// Lift every cooldown in a field. Returns how many were lifted.
    pub fn clear_field(&self, tenant: &Tenant, field: &MapKey) -> usize {
        self.with(|e| {
            e.get_mut(tenant).map_or(0, |keys| {
                let before = keys.len();
                keys.retain(|key, _| key.field != *field);
                before - keys.len()
            })
        })
    }

    /// Drop every entry whose eligible-at has passed. Returns how many went.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.with(|e| {
            let mut dropped = 0;
            for keys in e.values_mut() {
                let before = keys.len();
                keys.retain(|_, until| *until > now);
                dropped += before - keys.len();
            }
            e.retain(|_, keys| !keys.is_empty());
            dropped
        })
    }

    /// Live entries across all tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with(|e| e.values().map(HashMap::len).sum())
    }

    /// Whether no cooldown is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_testing::{other_tenant, test_tenant, test_time};
    use uuid::Uuid;

    fn key(map: u32, x: i16) -> CooldownKey {
        CooldownKey {
            field: MapKey::new(0, 1, map, Uuid::nil()),
            classification: 2_001_000,
            x,
            y: 0,
        }
    }

    #[test]
    fn cooldown_expires_after_delay() {
        let cooldowns = Cooldowns::new();
        cooldowns.record(&test_tenant(), key(1, 0), 5_000, test_time());

        assert!(cooldowns.is_active(&test_tenant(), &key(1, 0), test_time() + Duration::seconds(4)));
        assert!(!cooldowns.is_active(&test_tenant(), &key(1, 0), test_time() + Duration::seconds(5)));
        assert!(!cooldowns.is_active(&other_tenant(), &key(1, 0), test_time()));
    }

    #[test]
    fn zero_delay_records_nothing() {
        let cooldowns = Cooldowns::new();
        cooldowns.record(&test_tenant(), key(1, 0), 0, test_time());
        assert!(cooldowns.is_empty());
    }

    #[test]
    fn clear_field_keeps_other_maps() {
        let cooldowns = Cooldowns::new();
        for (map, x) in [(1, 0), (1, 5), (2, 0)] {
            cooldowns.record(&test_tenant(), key(map, x), 1_000, test_time());
        }

        assert_eq!(cooldowns.clear_field(&test_tenant(), &key(1, 0).field), 2);
        assert!(cooldowns.is_active(&test_tenant(), &key(2, 0), test_time()));
    }

    #[test]
    fn sweep_drops_only_elapsed() {
        let cooldowns = Cooldowns::new();
        cooldowns.record(&test_tenant(), key(1, 0), 1_000, test_time());
        cooldowns.record(&other_tenant(), key(1, 0), 10_000, test_time());

        assert_eq!(cooldowns.sweep(test_time() + Duration::seconds(2)), 1);
        assert_eq!(cooldowns.len(), 1);
    }
}
