//! Lazy-initialization flags.
//!
//! A `(tenant, id)` pair moves through `absent → started → complete`. The flag
//! is set *before* inputs are fetched so concurrent reads never start a second
//! initialization; a degraded record stays degraded until [`InitTracker::clear`]
//! (logout or operator refresh) resets it.

use crate::tenant::Tenant;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Started,
    Complete,
}

/// Per-tenant set of initialized entity ids.
#[derive(Debug)]
pub struct InitTracker<K = u32> {
    flags: Mutex<HashMap<Tenant, HashMap<K, Phase>>>,
}

impl<K> Default for InitTracker<K> {
    fn default() -> Self {
        Self {
            flags: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Copy + Eq + Hash> InitTracker<K> {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim initialization. Returns `true` only for the caller that
    /// set the flag.
    pub fn try_begin(&self, tenant: &Tenant, id: K) -> bool {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = flags.entry(tenant.clone()).or_default();
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, Phase::Started);
        true
    }

    /// Mark initialization finished.
    pub fn mark_complete(&self, tenant: &Tenant, id: K) {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(tenant.clone())
            .or_default()
            .insert(id, Phase::Complete);
    }

    /// Whether initialization has been claimed (started or complete).
    #[must_use]
    pub fn is_started(&self, tenant: &Tenant, id: K) -> bool {
        self.phase(tenant, id).is_some()
    }

    /// Whether initialization finished.
    #[must_use]
    pub fn is_complete(&self, tenant: &Tenant, id: K) -> bool {
        self.phase(tenant, id) == Some(Phase::Complete)
    }

    fn phase(&self, tenant: &Tenant, id: K) -> Option<Phase> {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tenant)
            .and_then(|entries| entries.get(&id).copied())
    }

    /// Forget an id so the next access initializes again.
    pub fn clear(&self, tenant: &Tenant, id: K) {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = flags.get_mut(tenant) {
            entries.remove(&id);
            if entries.is_empty() {
                flags.remove(tenant);
            }
        }
    }

    /// Forget everything. Intended for tests.
    pub fn reset(&self) {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
