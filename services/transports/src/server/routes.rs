//! Router configuration for the transports service.

use super::state::AppState;
use crate::model::Route;
use crate::route::{RouteDefinition, SharedVessel};
use crate::voyage::{InstanceRoute, Voyage};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use realm_web::{AppError, Filters, Input, JsonApi, Resource, TenantHeaders, ToResource, WebResult};
use uuid::Uuid;

type RouteResponse = JsonApi<Resource<<Route as ToResource>::Attributes>>;
type RoutesResponse = JsonApi<Vec<Resource<<Route as ToResource>::Attributes>>>;
type VesselResponse = JsonApi<Resource<SharedVessel>>;
type VesselsResponse = JsonApi<Vec<Resource<SharedVessel>>>;
type InstanceRouteResponse = JsonApi<Resource<InstanceRoute>>;
type InstanceRoutesResponse = JsonApi<Vec<Resource<InstanceRoute>>>;
type VoyagesResponse = JsonApi<Vec<Resource<Voyage>>>;

fn document_id(raw: &str, current: Uuid) -> Result<Uuid, AppError> {
    if raw.is_empty() {
        return Ok(current);
    }
    raw.parse()
        .map_err(|_| AppError::bad_request(format!("invalid id [{raw}]")))
}

/// `GET /transports/routes`, optionally `filter[startMapId]`.
///
/// # Errors
///
/// 400 on bad headers or a non-numeric map filter.
pub async fn get_routes(
    TenantHeaders(tenant): TenantHeaders,
    filters: Filters,
    State(state): State<AppState>,
) -> WebResult<RoutesResponse> {
    let routes = match filters.parse::<u32>("startMapId")? {
        Some(map_id) => state.processor.routes_from(&tenant, map_id).await?,
        None => state.processor.routes(&tenant).await?,
    };
    Ok(JsonApi::many(&routes))
}

/// `GET /transports/routes/:routeId`
///
/// # Errors
///
/// 404 if the tenant has no such route.
pub async fn get_route(
    TenantHeaders(tenant): TenantHeaders,
    Path(route_id): Path<Uuid>,
    State(state): State<AppState>,
) -> WebResult<RouteResponse> {
    let route = state.processor.route(&tenant, route_id).await?;
    Ok(JsonApi::one(&route))
}

/// `POST /transports/routes`
///
/// # Errors
///
/// 400 on a malformed route or id, 409 when the name is taken.
pub async fn create_route(
    TenantHeaders(tenant): TenantHeaders,
    State(state): State<AppState>,
    Json(input): Input<RouteDefinition>,
) -> WebResult<RouteResponse> {
    let mut definition = input.data.attributes;
    definition.id = document_id(&input.data.id, definition.id)?;
    let route = state.processor.create_route(&tenant, definition).await?;
    Ok(JsonApi::one(&route).with_status(StatusCode::CREATED))
}

/// `GET /transports/vessels`
///
/// # Errors
///
/// 500 if the catalog fails.
pub async fn get_vessels(
    TenantHeaders(tenant): TenantHeaders,
    State(state): State<AppState>,
) -> WebResult<VesselsResponse> {
    let vessels = state.processor.vessels(&tenant).await?;
    Ok(JsonApi::many(&vessels))
}

/// `POST /transports/vessels`
///
/// # Errors
///
/// 400 on a malformed pairing, 404 for an unknown route, 409 when the name
/// or a route is taken.
pub async fn create_vessel(
    TenantHeaders(tenant): TenantHeaders,
    State(state): State<AppState>,
    Json(input): Input<SharedVessel>,
) -> WebResult<VesselResponse> {
    let mut vessel = input.data.attributes;
    vessel.id = document_id(&input.data.id, vessel.id)?;
    let stored = state.processor.create_vessel(&tenant, vessel).await?;
    Ok(JsonApi::one(&stored).with_status(StatusCode::CREATED))
}

/// `GET /transports/instance-routes`
///
/// # Errors
///
/// 500 if the catalog fails.
pub async fn get_instance_routes(
    TenantHeaders(tenant): TenantHeaders,
    State(state): State<AppState>,
) -> WebResult<InstanceRoutesResponse> {
    let routes = state.instanced.routes(&tenant).await?;
    Ok(JsonApi::many(&routes))
}

/// `GET /transports/instance-routes/:routeId`
///
/// # Errors
///
/// 404 if the tenant has no such route.
pub async fn get_instance_route(
    TenantHeaders(tenant): TenantHeaders,
    Path(route_id): Path<Uuid>,
    State(state): State<AppState>,
) -> WebResult<InstanceRouteResponse> {
    let route = state.instanced.route(&tenant, route_id).await?;
    Ok(JsonApi::one(&route))
}

/// `POST /transports/instance-routes`
///
/// # Errors
///
/// 400 on a malformed route or id, 409 when the name is taken.
pub async fn create_instance_route(
    TenantHeaders(tenant): TenantHeaders,
    State(state): State<AppState>,
    Json(input): Input<InstanceRoute>,
) -> WebResult<InstanceRouteResponse> {
    let mut route = input.data.attributes;
    route.id = document_id(&input.data.id, route.id)?;
    let stored = state.instanced.create_route(&tenant, route).await?;
    Ok(JsonApi::one(&stored).with_status(StatusCode::CREATED))
}

/// `GET /transports/instances`, optionally `filter[routeId]`.
///
/// # Errors
///
/// 400 on bad headers or a malformed route filter.
pub async fn get_voyages(
    TenantHeaders(tenant): TenantHeaders,
    filters: Filters,
    State(state): State<AppState>,
) -> WebResult<VoyagesResponse> {
    let mut voyages = state.instanced.all_voyages(&tenant);
    if let Some(route_id) = filters.parse::<Uuid>("routeId")? {
        voyages.retain(|v| v.route_id() == route_id);
    }
    Ok(JsonApi::many(&voyages))
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/transports/routes", get(get_routes).post(create_route))
        .route("/transports/routes/:route_id", get(get_route))
        .route("/transports/vessels", get(get_vessels).post(create_vessel))
        .route(
            "/transports/instance-routes",
            get(get_instance_routes).post(create_instance_route),
        )
        .route("/transports/instance-routes/:route_id", get(get_instance_route))
        .route("/transports/instances", get(get_voyages))
        .with_state(state)
}
