//! Router configuration for the stats service.

use super::state::AppState;
use crate::model::StatModel;
use axum::{
    Router,
    extract::{Path, State},
    routing::{get, post},
};
use realm_web::{JsonApi, Resource, TenantHeaders, WebResult};
use serde::Deserialize;

type StatResponse = JsonApi<Resource<<StatModel as realm_web::ToResource>::Attributes>>;

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

/// `GET …/characters/:characterId/stats`
///
/// # Errors
///
/// 400 on bad tenant headers.
pub async fn get_stats(
    TenantHeaders(tenant): TenantHeaders,
    Path(path): Path<CharacterPath>,
    State(state): State<AppState>,
) -> WebResult<StatResponse> {
    let model = state
        .processor
        .get(&tenant, path.world_id, path.channel_id, path.character_id)
        .await?;
    Ok(JsonApi::one(&model))
}

/// `POST …/characters/:characterId/stats/refresh`
///
/// # Errors
///
/// 400 on bad tenant headers, 500 if the changes cannot be published.
pub async fn refresh_stats(
    TenantHeaders(tenant): TenantHeaders,
    Path(path): Path<CharacterPath>,
    State(state): State<AppState>,
) -> WebResult<StatResponse> {
    let model = state
        .processor
        .refresh(&tenant, path.world_id, path.channel_id, path.character_id)
        .await?;
    Ok(JsonApi::one(&model))
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/worlds/:world_id/channels/:channel_id/characters/:character_id/stats",
            get(get_stats),
        )
        .route(
            "/worlds/:world_id/channels/:channel_id/characters/:character_id/stats/refresh",
            post(refresh_stats),
        )
        .with_state(state)
}
