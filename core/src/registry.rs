//! Tenant-partitioned in-memory registry.
//!
//! The registry is the only shared mutable state in a service. Records are
//! stored per tenant together with three secondary indices:
//!
//! ```text
//!   Mutex<HashMap<Tenant, Arc<RwLock<Partition>>>>
//!                                  │
//!        ┌──────────────┬──────────┴──────┬────────────────────┐
//!        ▼              ▼                 ▼                    ▼
//!   records        by_participant     by_container         by_spatial
//!   id → R         u32 → id           key → {id}           MapKey → {id}
//! ```
//!
//! The outer mutex is held only long enough to find or install a partition.
//! Every primary write and its index maintenance happen under the same
//! partition write lock, so an index entry is never observed without its
//! primary record. No lock is ever held across an `.await`.
//!
//! Mutation is expressed as a function `&R -> Result<R>`. The new record is
//! validated before anything is written, so a failing (or panicking) mutator
//! leaves the stored record untouched.

use crate::error::{RealmError, RealmResult};
use crate::tenant::Tenant;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Grouping key for the container index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerKey {
    /// Every entity living in a world
    World(u8),
    /// Every entity belonging to a party
    Party(u32),
    /// Every entity scheduled under a route
    Route(Uuid),
    /// Every entity on a map id, across channels and instances
    Map(u32),
}

/// Exact field coordinates: world, channel, map and map instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapKey {
    /// World id
    pub world: u8,
    /// Channel id
    pub channel: u8,
    /// Map id
    pub map: u32,
    /// Map instance (nil for the shared instance)
    pub instance: Uuid,
}

impl MapKey {
    /// Build a map key.
    #[must_use]
    pub const fn new(world: u8, channel: u8, map: u32, instance: Uuid) -> Self {
        Self {
            world,
            channel,
            map,
            instance,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.world, self.channel, self.map, self.instance
        )
    }
}

/// A value the registry can store and index.
pub trait Record: Clone + Send + Sync + 'static {
    /// Primary key. Immutable for the lifetime of the record.
    type Id: Clone + Eq + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Entity kind used in errors and metrics.
    const KIND: &'static str;

    /// Primary key of this record.
    fn id(&self) -> Self::Id;

    /// Participant ids; each resolves to at most one record per tenant.
    fn participants(&self) -> Vec<u32> {
        Vec::new()
    }

    /// Container keys this record is listed under.
    fn containers(&self) -> Vec<ContainerKey> {
        Vec::new()
    }

    /// Field the record is located in, if any.
    fn map_key(&self) -> Option<MapKey> {
        None
    }
}

struct Partition<R: Record> {
    records: BTreeMap<R::Id, R>,
    by_participant: HashMap<u32, R::Id>,
    by_container: HashMap<ContainerKey, BTreeSet<R::Id>>,
    by_spatial: HashMap<MapKey, BTreeSet<R::Id>>,
}

impl<R: Record> Default for Partition<R> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            by_participant: HashMap::new(),
            by_container: HashMap::new(),
            by_spatial: HashMap::new(),
        }
    }
}

impl<R: Record> Partition<R> {
    fn check_participants(&self, record: &R) -> RealmResult<()> {
        let id = record.id();
        for participant in record.participants() {
            if let Some(owner) = self.by_participant.get(&participant) {
                if *owner != id {
                    return Err(RealmError::Conflict(format!(
                        "participant [{participant}] already belongs to {} [{owner}]",
                        R::KIND
                    )));
                }
            }
        }
        Ok(())
    }

    fn index(&mut self, record: &R) {
        let id = record.id();
        for participant in record.participants() {
            self.by_participant.insert(participant, id.clone());
        }
        for key in record.containers() {
            self.by_container.entry(key).or_default().insert(id.clone());
        }
        if let Some(key) = record.map_key() {
            self.by_spatial.entry(key).or_default().insert(id);
        }
    }

    fn unindex(&mut self, record: &R) {
        let id = record.id();
        for participant in record.participants() {
            if self.by_participant.get(&participant) == Some(&id) {
                self.by_participant.remove(&participant);
            }
        }
        for key in record.containers() {
            remove_from_set(&mut self.by_container, &key, &id);
        }
        if let Some(key) = record.map_key() {
            remove_from_set(&mut self.by_spatial, &key, &id);
        }
    }

    fn store(&mut self, record: R) -> R {
        let id = record.id();
        if let Some(previous) = self.records.remove(&id) {
            self.unindex(&previous);
        }
        self.index(&record);
        self.records.insert(id, record.clone());
        record
    }

    fn remove(&mut self, id: &R::Id) -> Option<R> {
        let record = self.records.remove(id)?;
        self.unindex(&record);
        Some(record)
    }

    fn collect(&self, ids: Option<&BTreeSet<R::Id>>) -> Vec<R> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.records.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}

fn remove_from_set<K: Eq + Hash, I: Ord>(index: &mut HashMap<K, BTreeSet<I>>, key: &K, id: &I) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

type Shared<R> = Arc<RwLock<Partition<R>>>;

/// Concurrency-safe store of records, partitioned by tenant.
pub struct TenantRegistry<R: Record> {
    tenants: Mutex<HashMap<Tenant, Shared<R>>>,
}

impl<R: Record> Default for TenantRegistry<R> {
    fn default() -> Self {
        Self {
            tenants: Mutex::new(HashMap::new()),
        }
    }
}

impl<R: Record> fmt::Debug for TenantRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantRegistry")
            .field("kind", &R::KIND)
            .finish_non_exhaustive()
    }
}

impl<R: Record> TenantRegistry<R> {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, tenant: &Tenant) -> Shared<R> {
        let mut tenants = self.tenants.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(tenants.entry(tenant.clone()).or_default())
    }

    fn existing(&self, tenant: &Tenant) -> Option<Shared<R>> {
        self.tenants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tenant)
            .map(Arc::clone)
    }

    fn read<T>(&self, tenant: &Tenant, f: impl FnOnce(&Partition<R>) -> T) -> Option<T> {
        let partition = self.existing(tenant)?;
        let guard: RwLockReadGuard<'_, Partition<R>> =
            partition.read().unwrap_or_else(PoisonError::into_inner);
        Some(f(&guard))
    }

    fn write<T>(&self, tenant: &Tenant, f: impl FnOnce(&mut Partition<R>) -> T) -> T {
        let partition = self.partition(tenant);
        let mut guard: RwLockWriteGuard<'_, Partition<R>> =
            partition.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Look up a record.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::NotFound`] if the id is absent.
    pub fn get(&self, tenant: &Tenant, id: &R::Id) -> RealmResult<R> {
        self.find(tenant, id)
            .ok_or_else(|| RealmError::not_found(R::KIND, id))
    }

    /// Look up a record, `None` if absent.
    #[must_use]
    pub fn find(&self, tenant: &Tenant, id: &R::Id) -> Option<R> {
        self.read(tenant, |p| p.records.get(id).cloned()).flatten()
    }

    /// Whether a record exists.
    #[must_use]
    pub fn contains(&self, tenant: &Tenant, id: &R::Id) -> bool {
        self.read(tenant, |p| p.records.contains_key(id))
            .unwrap_or(false)
    }

    /// Return the existing record or install the one built by `make`.
    ///
    /// Concurrent callers for the same id observe exactly one creation.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::Validation`] if `make` yields a different id and
    /// [`RealmError::Conflict`] if one of its participants is already bound.
    pub fn get_or_create(
        &self,
        tenant: &Tenant,
        id: &R::Id,
        make: impl FnOnce() -> R,
    ) -> RealmResult<R> {
        self.write(tenant, |p| {
            if let Some(existing) = p.records.get(id) {
                return Ok(existing.clone());
            }
            let record = make();
            if record.id() != *id {
                return Err(RealmError::validation(format!(
                    "{} created with id [{}], expected [{id}]",
                    R::KIND,
                    record.id()
                )));
            }
            p.check_participants(&record)?;
            metrics::gauge!("realm.registry.entities", "kind" => R::KIND).increment(1.0);
            Ok(p.store(record))
        })
    }

    /// Install a new record.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::Conflict`] if the id exists or a participant is
    /// already bound to another record.
    pub fn insert(&self, tenant: &Tenant, record: R) -> RealmResult<R> {
        self.write(tenant, |p| {
            let id = record.id();
            if p.records.contains_key(&id) {
                return Err(RealmError::Conflict(format!(
                    "{} [{id}] already exists",
                    R::KIND
                )));
            }
            p.check_participants(&record)?;
            metrics::gauge!("realm.registry.entities", "kind" => R::KIND).increment(1.0);
            Ok(p.store(record))
        })
    }

    /// Apply a mutator to an existing record and store the result.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::NotFound`] if the id is absent (nothing is
    /// installed), the mutator's own error, [`RealmError::Validation`] if the
    /// mutator changed the id, or [`RealmError::Conflict`] on a participant clash.
    pub fn update(
        &self,
        tenant: &Tenant,
        id: &R::Id,
        mutator: impl FnOnce(&R) -> RealmResult<R>,
    ) -> RealmResult<R> {
        self.update_with(tenant, id, |current| mutator(current).map(|next| (next, ())))
            .map(|(record, ())| record)
    }

    /// Like [`update`](Self::update), but the mutator also returns a value
    /// computed under the same lock (typically the events a transition produced).
    ///
    /// # Errors
    ///
    /// See [`update`](Self::update).
    pub fn update_with<T>(
        &self,
        tenant: &Tenant,
        id: &R::Id,
        mutator: impl FnOnce(&R) -> RealmResult<(R, T)>,
    ) -> RealmResult<(R, T)> {
        let Some(partition) = self.existing(tenant) else {
            return Err(RealmError::not_found(R::KIND, id));
        };
        let mut p = partition.write().unwrap_or_else(PoisonError::into_inner);
        let current = p
            .records
            .get(id)
            .ok_or_else(|| RealmError::not_found(R::KIND, id))?;
        let (next, output) = mutator(current)?;
        if next.id() != *id {
            return Err(RealmError::validation(format!(
                "mutator changed {} id [{id}] to [{}]",
                R::KIND,
                next.id()
            )));
        }
        p.check_participants(&next)?;
        Ok((p.store(next), output))
    }

    /// Remove a record and all of its index entries. Idempotent.
    pub fn delete(&self, tenant: &Tenant, id: &R::Id) -> Option<R> {
        let partition = self.existing(tenant)?;
        let removed = partition
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            metrics::gauge!("realm.registry.entities", "kind" => R::KIND).decrement(1.0);
        }
        removed
    }

    /// Record a participant belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::NotFound`] if the participant is not bound.
    pub fn by_participant(&self, tenant: &Tenant, participant: u32) -> RealmResult<R> {
        self.read(tenant, |p| {
            p.by_participant
                .get(&participant)
                .and_then(|id| p.records.get(id).cloned())
        })
        .flatten()
        .ok_or_else(|| RealmError::not_found(R::KIND, format!("participant {participant}")))
    }

    /// Records listed under a container key, ordered by id.
    #[must_use]
    pub fn by_container(&self, tenant: &Tenant, key: &ContainerKey) -> Vec<R> {
        self.read(tenant, |p| p.collect(p.by_container.get(key)))
            .unwrap_or_default()
    }

    /// Records located in a field, ordered by id.
    #[must_use]
    pub fn by_spatial(&self, tenant: &Tenant, key: &MapKey) -> Vec<R> {
        self.read(tenant, |p| p.collect(p.by_spatial.get(key)))
            .unwrap_or_default()
    }

    /// Point-in-time copy of every record in a tenant, ordered by id.
    #[must_use]
    pub fn snapshot(&self, tenant: &Tenant) -> Vec<R> {
        self.read(tenant, |p| p.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records in a tenant.
    #[must_use]
    pub fn len(&self, tenant: &Tenant) -> usize {
        self.read(tenant, |p| p.records.len()).unwrap_or(0)
    }

    /// Whether a tenant holds no records.
    #[must_use]
    pub fn is_empty(&self, tenant: &Tenant) -> bool {
        self.len(tenant) == 0
    }

    /// Tenants that currently hold at least one record.
    #[must_use]
    pub fn tenants(&self) -> Vec<Tenant> {
        let partitions: Vec<(Tenant, Shared<R>)> = self
            .tenants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(t, p)| (t.clone(), Arc::clone(p)))
            .collect();
        let mut live: Vec<Tenant> = partitions
            .into_iter()
            .filter(|(_, p)| {
                !p.read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .records
                    .is_empty()
            })
            .map(|(t, _)| t)
            .collect();
        live.sort();
        live
    }

    /// Drop a tenant partition, returning its records.
    pub fn clear(&self, tenant: &Tenant) -> Vec<R> {
        let removed = self
            .tenants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tenant);
        let records: Vec<R> = removed
            .map(|p| {
                let mut guard = p.write().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut guard.records).into_values().collect()
            })
            .unwrap_or_default();
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("realm.registry.entities", "kind" => R::KIND)
            .decrement(records.len() as f64);
        records
    }

    /// Drop every tenant. Intended for tests.
    pub fn reset(&self) {
        self.tenants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        metrics::gauge!("realm.registry.entities", "kind" => R::KIND).set(0.0);
    }
}
