//! Durable catalog data.
//!
//! Catalogs hold definitions that outlive a process: party-quest definitions
//! and transport routes. Runtime state never lives here. Every query is scoped
//! to one tenant.

use crate::tenant::Tenant;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by catalog stores.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The backing store failed
    #[error("catalog storage error: {0}")]
    Storage(String),

    /// A stored document could not be encoded or decoded
    #[error("catalog encoding error: {0}")]
    Encoding(String),
}

/// A catalog entry.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection name, used as the storage discriminator.
    const COLLECTION: &'static str;

    /// Stable document id.
    fn document_id(&self) -> Uuid;

    /// Secondary lookup key (quest id, route name).
    fn lookup_key(&self) -> String;
}

/// Boxed future returned by catalog operations.
pub type CatalogFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CatalogError>> + Send + 'a>>;

/// Tenant-scoped document store.
pub trait Catalog<T: Document>: Send + Sync {
    /// Document by id.
    fn get(&self, tenant: &Tenant, id: Uuid) -> CatalogFuture<'_, Option<T>>;

    /// Document by lookup key.
    fn find_by_key(&self, tenant: &Tenant, key: &str) -> CatalogFuture<'_, Option<T>>;

    /// Every document of the tenant.
    fn all(&self, tenant: &Tenant) -> CatalogFuture<'_, Vec<T>>;

    /// Insert or replace by id.
    fn upsert(&self, tenant: &Tenant, document: T) -> CatalogFuture<'_, ()>;

    /// Delete by id. Returns whether a document was removed.
    fn delete(&self, tenant: &Tenant, id: Uuid) -> CatalogFuture<'_, bool>;
}

/// Process-local catalog.
#[derive(Debug)]
pub struct InMemoryCatalog<T> {
    documents: Mutex<HashMap<Tenant, BTreeMap<Uuid, T>>>,
}

impl<T> Default for InMemoryCatalog<T> {
    fn default() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Document> InMemoryCatalog<T> {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HashMap<Tenant, BTreeMap<Uuid, T>>) -> R) -> R {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut documents)
    }
}

impl<T: Document> Catalog<T> for InMemoryCatalog<T> {
    fn get(&self, tenant: &Tenant, id: Uuid) -> CatalogFuture<'_, Option<T>> {
        let found = self.with(|d| d.get(tenant).and_then(|docs| docs.get(&id).cloned()));
        Box::pin(async move { Ok(found) })
    }

    fn find_by_key(&self, tenant: &Tenant, key: &str) -> CatalogFuture<'_, Option<T>> {
        let found = self.with(|d| {
            d.get(tenant)
                .and_then(|docs| docs.values().find(|doc| doc.lookup_key() == key).cloned())
        });
        Box::pin(async move { Ok(found) })
    }

    fn all(&self, tenant: &Tenant) -> CatalogFuture<'_, Vec<T>> {
        let docs = self.with(|d| {
            d.get(tenant)
                .map(|docs| docs.values().cloned().collect())
                .unwrap_or_default()
        });
        Box::pin(async move { Ok(docs) })
    }

    fn upsert(&self, tenant: &Tenant, document: T) -> CatalogFuture<'_, ()> {
        self.with(|d| {
            d.entry(tenant.clone())
                .or_default()
                .insert(document.document_id(), document);
        });
        Box::pin(async { Ok(()) })
    }

    fn delete(&self, tenant: &Tenant, id: Uuid) -> CatalogFuture<'_, bool> {
        let removed = self.with(|d| d.get_mut(tenant).is_some_and(|docs| docs.remove(&id).is_some()));
        Box::pin(async move { Ok(removed) })
    }
}
