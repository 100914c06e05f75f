//! Axum integration shared by realm services.
//!
//! Each service owns its routes and state; this crate supplies the pieces
//! every read surface needs:
//!
//! ```text
//!   request ──► TenantHeaders / Filters ──► handler ──► registry
//!                                              │
//!                    AppError ◄── RealmError ──┤
//!                                              ▼
//!                                    JsonApi<Resource<A>>
//! ```
//!
//! # Example
//!
//! ```ignore
//! use realm_web::{AppError, JsonApi, TenantHeaders};
//!
//! async fn get_rates(
//!     TenantHeaders(tenant): TenantHeaders,
//!     Path(path): Path<CharacterPath>,
//!     State(state): State<AppState>,
//! ) -> Result<JsonApi<Resource<RateAttributes>>, AppError> {
//!     let model = state.processor.get(&tenant, path.world_id, path.channel_id, path.character_id).await?;
//!     Ok(JsonApi::one(&model))
//! }
//!
//! let app = Router::new()
//!     .route("/worlds/:w/channels/:c/characters/:id/rates", get(get_rates))
//!     .with_state(state);
//! realm_web::server::serve(app, addr, shutdown.subscribe()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jsonapi;
pub mod server;

pub use error::AppError;
pub use extractors::{Filters, TenantHeaders};
pub use handlers::HealthProbe;
pub use jsonapi::{Document, Input, JsonApi, Resource, ToResource};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
