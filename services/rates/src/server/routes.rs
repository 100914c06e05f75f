//! Router configuration for the rates service.

use super::resources::ItemFactor;
use super::state::AppState;
use crate::processor::RateView;
use axum::{
    Router,
    extract::{Path, State},
    routing::{get, post},
};
use realm_web::{JsonApi, Resource, TenantHeaders, ToResource, WebResult};
use serde::Deserialize;

type RateResponse = JsonApi<Resource<<RateView as ToResource>::Attributes>>;
type ItemsResponse = JsonApi<Vec<Resource<<ItemFactor as ToResource>::Attributes>>>;

/// Path of a character inside a channel.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CharacterPath {
    /// World id
    pub world_id: u8,
    /// Channel id
    pub channel_id: u8,
    /// Character id
    pub character_id: u32,
}

/// `GET …/characters/:characterId/rates`
///
/// # Errors
///
/// 400 on bad tenant headers.
pub async fn get_rates(
    TenantHeaders(tenant): TenantHeaders,
    Path(path): Path<CharacterPath>,
    State(state): State<AppState>,
) -> WebResult<RateResponse> {
    let view = state
        .processor
        .get(&tenant, path.world_id, path.channel_id, path.character_id)
        .await?;
    Ok(JsonApi::one(&view))
}

/// `GET …/characters/:characterId/rates/items`
///
/// # Errors
///
/// 400 on bad tenant headers.
pub async fn get_item_factors(
    TenantHeaders(tenant): TenantHeaders,
    Path(path): Path<CharacterPath>,
    State(state): State<AppState>,
) -> WebResult<ItemsResponse> {
    let factors: Vec<ItemFactor> = state
        .processor
        .item_factors(&tenant, path.world_id, path.channel_id, path.character_id)
        .await?
        .into_iter()
        .map(ItemFactor)
        .collect();
    Ok(JsonApi::many(&factors))
}

/// `POST …/characters/:characterId/rates/refresh`
///
/// # Errors
///
/// 400 on bad tenant headers, 500 if the change cannot be published.
pub async fn refresh_rates(
    TenantHeaders(tenant): TenantHeaders,
    Path(path): Path<CharacterPath>,
    State(state): State<AppState>,
) -> WebResult<RateResponse> {
    let view = state
        .processor
        .refresh(&tenant, path.world_id, path.channel_id, path.character_id)
        .await?;
    Ok(JsonApi::one(&view))
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    const BASE: &str = "/worlds/:world_id/channels/:channel_id/characters/:character_id/rates";
    Router::new()
        .route(BASE, get(get_rates))
        .route(&format!("{BASE}/items"), get(get_item_factors))
        .route(&format!("{BASE}/refresh"), post(refresh_rates))
        .with_state(state)
}
