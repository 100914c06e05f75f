//! Router configuration for the party-quests service.

use super::resources::Timer;
use super::state::AppState;
use crate::definition::Definition;
use crate::model::Instance;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use realm_web::{AppError, Filters, Input, JsonApi, Resource, TenantHeaders, ToResource, WebResult};
use uuid::Uuid;

type InstanceResponse = JsonApi<Resource<<Instance as ToResource>::Attributes>>;
type InstancesResponse = JsonApi<Vec<Resource<<Instance as ToResource>::Attributes>>>;
type DefinitionResponse = JsonApi<Resource<Definition>>;
type DefinitionsResponse = JsonApi<Vec<Resource<Definition>>>;
type TimerResponse = JsonApi<Resource<<Timer as ToResource>::Attributes>>;

/// `GET /party-quests/instances`, optionally `filter[questId]`.
///
/// # Errors
///
/// 400 on bad tenant headers.
pub async fn get_instances(
    TenantHeaders(tenant): TenantHeaders,
    filters: Filters,
    State(state): State<AppState>,
) -> WebResult<InstancesResponse> {
    let quest_id = filters.get("questId");
    let instances: Vec<Instance> = state
        .processor
        .instances(&tenant)
        .into_iter()
        .filter(|i| quest_id.is_none_or(|q| i.quest_id() == q))
        .collect();
    Ok(JsonApi::many(&instances))
}

/// `GET /party-quests/instances/:instanceId`
///
/// # Errors
///
/// 404 if no such instance is live.
pub async fn get_instance(
    TenantHeaders(tenant): TenantHeaders,
    Path(instance_id): Path<Uuid>,
    State(state): State<AppState>,
) -> WebResult<InstanceResponse> {
    let instance = state.processor.get(&tenant, instance_id)?;
    Ok(JsonApi::one(&instance))
}

/// `GET /characters/:characterId/party-quest`
///
/// # Errors
///
/// 404 if the character is in no instance.
pub async fn get_character_instance(
    TenantHeaders(tenant): TenantHeaders,
    Path(character_id): Path<u32>,
    State(state): State<AppState>,
) -> WebResult<InstanceResponse> {
    let instance = state.processor.by_character(&tenant, character_id)?;
    Ok(JsonApi::one(&instance))
}

/// `GET /characters/:characterId/party-quest/timer`
///
/// # Errors
///
/// 404 when no instance or timer applies, 409 outside a timed state.
pub async fn get_character_timer(
    TenantHeaders(tenant): TenantHeaders,
    Path(character_id): Path<u32>,
    State(state): State<AppState>,
) -> WebResult<TimerResponse> {
    let remaining = state.processor.timer_for(&tenant, character_id).await?;
    Ok(JsonApi::one(&Timer {
        character_id,
        remaining,
    }))
}

/// `GET /party-quests/definitions`
///
/// # Errors
///
/// 500 if the catalog fails.
pub async fn get_definitions(
    TenantHeaders(tenant): TenantHeaders,
    State(state): State<AppState>,
) -> WebResult<DefinitionsResponse> {
    let definitions = state.processor.definitions(&tenant).await?;
    Ok(JsonApi::many(&definitions))
}

/// `GET /party-quests/definitions/:definitionId`
///
/// # Errors
///
/// 404 if absent.
pub async fn get_definition(
    TenantHeaders(tenant): TenantHeaders,
    Path(definition_id): Path<Uuid>,
    State(state): State<AppState>,
) -> WebResult<DefinitionResponse> {
    let definition = state.processor.definition(&tenant, definition_id).await?;
    Ok(JsonApi::one(&definition))
}

/// `POST /party-quests/definitions`
///
/// # Errors
///
/// 400 on a malformed definition or id, 409 when the quest id is taken.
pub async fn create_definition(
    TenantHeaders(tenant): TenantHeaders,
    State(state): State<AppState>,
    Json(input): Input<Definition>,
) -> WebResult<DefinitionResponse> {
    let mut definition = input.data.attributes;
    if !input.data.id.is_empty() {
        definition.id = input
            .data
            .id
            .parse()
            .map_err(|_| AppError::bad_request(format!("invalid definition id [{}]", input.data.id)))?;
    }
    let stored = state.processor.create_definition(&tenant, definition).await?;
    Ok(JsonApi::one(&stored).with_status(StatusCode::CREATED))
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/party-quests/instances", get(get_instances))
        .route("/party-quests/instances/:instance_id", get(get_instance))
        .route("/party-quests/definitions", get(get_definitions).post(create_definition))
        .route("/party-quests/definitions/:definition_id", get(get_definition))
        .route("/characters/:character_id/party-quest", get(get_character_instance))
        .route("/characters/:character_id/party-quest/timer", get(get_character_timer))
        .with_state(state)
}
