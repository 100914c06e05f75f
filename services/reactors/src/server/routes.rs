//! Router configuration for the reactors service.

use super::resources::CreateReactorAttributes;
use super::state::AppState;
use crate::model::Reactor;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use realm_core::registry::MapKey;
use realm_web::{AppError, Filters, Input, JsonApi, Resource, TenantHeaders, ToResource, WebResult};
use serde::Deserialize;
use uuid::Uuid;

type ReactorResponse = JsonApi<Resource<<Reactor as ToResource>::Attributes>>;
type ReactorsResponse = JsonApi<Vec<Resource<<Reactor as ToResource>::Attributes>>>;

/// Path of a map instance.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FieldPath {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Map id
    pub map_id: u32,
    /// Instance id
    pub instance: Uuid,
}

impl FieldPath {
    const fn field(self) -> MapKey {
        MapKey::new(self.world_id, self.channel_id, self.map_id, self.instance)
    }
}

/// Path of a reactor inside a map instance.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FieldReactorPath {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Map id
    pub map_id: u32,
    /// Instance id
    pub instance: Uuid,
    /// Reactor id
    pub reactor_id: u32,
}

/// `GET /reactors/:reactorId`
///
/// # Errors
///
/// 404 if no such reactor is live.
pub async fn get_reactor(
    TenantHeaders(tenant): TenantHeaders,
    Path(reactor_id): Path<u32>,
    State(state): State<AppState>,
) -> WebResult<ReactorResponse> {
    let reactor = state.processor.get(&tenant, reactor_id)?;
    Ok(JsonApi::one(&reactor))
}

/// `GET …/instances/:instance/reactors`, optionally `filter[name]`.
///
/// # Errors
///
/// 400 on bad tenant headers.
pub async fn get_reactors_in_field(
    TenantHeaders(tenant): TenantHeaders,
    Path(path): Path<FieldPath>,
    filters: Filters,
    State(state): State<AppState>,
) -> WebResult<ReactorsResponse> {
    let name = filters.get("name");
    let reactors: Vec<Reactor> = state
        .processor
        .in_field(&tenant, &path.field())
        .into_iter()
        .filter(|r| name.is_none_or(|n| r.name() == n))
        .collect();
    Ok(JsonApi::many(&reactors))
}

/// `GET …/instances/:instance/reactors/:reactorId`
///
/// # Errors
///
/// 404 if the reactor is not live in that field.
pub async fn get_reactor_in_field(
    TenantHeaders(tenant): TenantHeaders,
    Path(path): Path<FieldReactorPath>,
    State(state): State<AppState>,
) -> WebResult<ReactorResponse> {
    let field = MapKey::new(path.world_id, path.channel_id, path.map_id, path.instance);
    let reactor = state
        .processor
        .get(&tenant, path.reactor_id)
        .ok()
        .filter(|r| r.field() == field)
        .ok_or_else(|| AppError::not_found("reactor", path.reactor_id))?;
    Ok(JsonApi::one(&reactor))
}

/// `POST …/instances/:instance/reactors` enqueues a CREATE.
///
/// # Errors
///
/// 400 on a zero classification, 500 if the command cannot be published.
pub async fn create_reactor(
    TenantHeaders(tenant): TenantHeaders,
    Path(path): Path<FieldPath>,
    State(state): State<AppState>,
    Json(input): Input<CreateReactorAttributes>,
) -> WebResult<StatusCode> {
    state
        .processor
        .request_create(&tenant, path.field(), input.data.attributes.into())
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    const FIELD: &str = "/worlds/:world_id/channels/:channel_id/maps/:map_id/instances/:instance/reactors";
    Router::new()
        .route("/reactors/:reactor_id", get(get_reactor))
        .route(FIELD, get(get_reactors_in_field).post(create_reactor))
        .route(&format!("{FIELD}/:reactor_id"), get(get_reactor_in_field))
        .with_state(state)
}
