//! `PostgreSQL` catalog store for realm services.
//!
//! Implements [`Catalog`] from `realm-core` over one shared table. Each
//! document type is a collection; every row carries the tenant id and every
//! query filters on it.
//!
//! ```text
//!   catalog_documents
//!   ├── tenant_id   UUID
//!   ├── collection  TEXT        ("party_quests", "transport_routes")
//!   ├── id          UUID
//!   ├── key         TEXT        (lookup key)
//!   ├── document    JSONB
//!   └── updated_at  TIMESTAMPTZ
//!   PRIMARY KEY (tenant_id, collection, id)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use realm_postgres::{PgCatalog, connect};
//!
//! let pool = connect("postgres://localhost/realm").await?;
//! realm_postgres::migrate(&pool).await?;
//! let routes: PgCatalog<Route> = PgCatalog::new(pool);
//! let all = routes.all(&tenant).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use realm_core::Tenant;
use realm_core::catalog::{Catalog, CatalogError, CatalogFuture, Document};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use serde_json::Value;
use std::marker::PhantomData;
use uuid::Uuid;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`CatalogError::Storage`] if the database cannot be reached.
pub async fn connect(database_url: &str) -> Result<PgPool, CatalogError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(storage)?;
    tracing::info!("Catalog database connected");
    Ok(pool)
}

/// Create the catalog table and indices if missing.
///
/// # Errors
///
/// Returns [`CatalogError::Storage`] if a statement fails.
pub async fn migrate(pool: &PgPool) -> Result<(), CatalogError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS catalog_documents (
            tenant_id UUID NOT NULL,
            collection TEXT NOT NULL,
            id UUID NOT NULL,
            key TEXT NOT NULL,
            document JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (tenant_id, collection, id)
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(storage)?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_documents_key ON catalog_documents(tenant_id, collection, key)",
    )
    .execute(pool)
    .await
    .map_err(storage)?;

    Ok(())
}

fn storage(e: sqlx::Error) -> CatalogError {
    CatalogError::Storage(e.to_string())
}

fn decode<T: Document>(value: Value) -> Result<T, CatalogError> {
    serde_json::from_value(value).map_err(|e| CatalogError::Encoding(format!("{}: {e}", T::COLLECTION)))
}

/// Catalog of one document type stored in `PostgreSQL`.
pub struct PgCatalog<T> {
    pool: PgPool,
    _document: PhantomData<fn() -> T>,
}

impl<T> Clone for PgCatalog<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _document: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for PgCatalog<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgCatalog").finish_non_exhaustive()
    }
}

impl<T: Document> PgCatalog<T> {
    /// Catalog over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _document: PhantomData,
        }
    }
}

impl<T: Document> Catalog<T> for PgCatalog<T> {
    fn get(&self, tenant: &Tenant, id: Uuid) -> CatalogFuture<'_, Option<T>> {
        let tenant_id = tenant.id;
        Box::pin(async move {
            let row: Option<(Value,)> = sqlx::query_as(
                "SELECT document FROM catalog_documents WHERE tenant_id = $1 AND collection = $2 AND id = $3",
            )
            .bind(tenant_id)
            .bind(T::COLLECTION)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
            row.map(|(value,)| decode(value)).transpose()
        })
    }

    fn find_by_key(&self, tenant: &Tenant, key: &str) -> CatalogFuture<'_, Option<T>> {
        let tenant_id = tenant.id;
        let key = key.to_string();
        Box::pin(async move {
            let row: Option<(Value,)> = sqlx::query_as(
                r"
                SELECT document FROM catalog_documents
                WHERE tenant_id = $1 AND collection = $2 AND key = $3
                ORDER BY id
                LIMIT 1
                ",
            )
            .bind(tenant_id)
            .bind(T::COLLECTION)
            .bind(&key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
            row.map(|(value,)| decode(value)).transpose()
        })
    }

    fn all(&self, tenant: &Tenant) -> CatalogFuture<'_, Vec<T>> {
        let tenant_id = tenant.id;
        Box::pin(async move {
            let rows: Vec<(Value,)> = sqlx::query_as(
                "SELECT document FROM catalog_documents WHERE tenant_id = $1 AND collection = $2 ORDER BY id",
            )
            .bind(tenant_id)
            .bind(T::COLLECTION)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
            rows.into_iter().map(|(value,)| decode(value)).collect()
        })
    }

    fn upsert(&self, tenant: &Tenant, document: T) -> CatalogFuture<'_, ()> {
        let tenant_id = tenant.id;
        Box::pin(async move {
            let id = document.document_id();
            let key = document.lookup_key();
            let value = serde_json::to_value(&document).map_err(|e| CatalogError::Encoding(e.to_string()))?;
            sqlx::query(
                r"
                INSERT INTO catalog_documents (tenant_id, collection, id, key, document)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (tenant_id, collection, id)
                DO UPDATE SET key = EXCLUDED.key, document = EXCLUDED.document, updated_at = now()
                ",
            )
            .bind(tenant_id)
            .bind(T::COLLECTION)
            .bind(id)
            .bind(&key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

            tracing::debug!(
                %tenant_id,
                collection = T::COLLECTION,
                %id,
                key = %key,
                "Catalog document stored"
            );
            Ok(())
        })
    }

    fn delete(&self, tenant: &Tenant, id: Uuid) -> CatalogFuture<'_, bool> {
        let tenant_id = tenant.id;
        Box::pin(async move {
            let result = sqlx::query(
                "DELETE FROM catalog_documents WHERE tenant_id = $1 AND collection = $2 AND id = $3",
            )
            .bind(tenant_id)
            .bind(T::COLLECTION)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
            Ok(result.rows_affected() > 0)
        })
    }
}
