//! HTTP surface for the policy store.
//!
//! **Groups:**
//! - `GET    /group` — registered group names (optional `limit`/`offset`)
//! - `POST   /group` — create or update a group (idempotent)
//! - `GET    /group/{name}` — name and token values
//! - `GET    /group/{name}/ids` — token ids of the group's set
//! - `DELETE /group/{name}` — no-op when missing
//!
//! **Objects:**
//! - `GET    /object` — registered object uuids (optional `limit`/`offset`)
//! - `POST   /object` — create an object under a composed level
//! - `GET    /object/{uuid}` — uuid plus effective tokens and group names
//! - `GET    /object/{uuid}/ids` — effective token ids
//! - `DELETE /object/{uuid}` — no-op when missing
//!
//! **Health:**
//! - `GET /health` — server status
//!
//! Unknown names and uuids surface as 404; a caller-supplied uuid that
//! collides with a live object is 409; everything else propagates as 500.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use cape_core::{GroupResource, LevelResource, ObjectResource, TokenId};
use cape_store::{Store, StoreError};

// ── Server state ──────────────────────────────────────────────────────────

pub struct ServerState {
    store: Mutex<Store>,
}

impl ServerState {
    pub fn new(store: Store) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }
}

type ApiError = (StatusCode, String);

fn api_error(e: StoreError) -> ApiError {
    let status = match &e {
        StoreError::NotFound(..) => StatusCode::NOT_FOUND,
        StoreError::IdentifierConflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

// ── Request/response types ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateObjectRequest {
    /// Requested identifier; a fresh one is generated when omitted.
    #[serde(default)]
    uuid: Option<String>,
    level: LevelResource,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_groups(
    State(state): State<Arc<ServerState>>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    let store = state.store.lock().await;
    let names = store
        .list_group_names(page.limit, page.offset)
        .map_err(api_error)?;
    Ok(Json(names))
}

async fn create_group(
    State(state): State<Arc<ServerState>>,
    Json(group): Json<GroupResource>,
) -> Result<Json<GroupResource>, ApiError> {
    let store = state.store.lock().await;
    let members = store
        .intern_tokens(group.tokens.iter().map(String::as_str))
        .map_err(api_error)?;
    let id = store
        .create_or_update_group(&group.name, &members)
        .map_err(api_error)?;

    let tokens = store.group_values(id).map_err(api_error)?;
    Ok(Json(GroupResource {
        name: group.name,
        tokens: tokens.into_iter().collect(),
    }))
}

async fn get_group(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<Json<GroupResource>, ApiError> {
    let store = state.store.lock().await;
    let group = store.group_by_name(&name).map_err(api_error)?;
    let tokens = store.group_values(group.id).map_err(api_error)?;
    Ok(Json(GroupResource {
        name: group.name,
        tokens: tokens.into_iter().collect(),
    }))
}

async fn get_group_ids(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<TokenId>>, ApiError> {
    let store = state.store.lock().await;
    let group = store.group_by_name(&name).map_err(api_error)?;
    let ids = store.group_ids(group.id).map_err(api_error)?;
    Ok(Json(ids.into_iter().collect()))
}

async fn delete_group(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store = state.store.lock().await;
    match store.group_by_name(&name) {
        Ok(group) => store.delete_group(group.id).map_err(api_error)?,
        Err(StoreError::NotFound(..)) => {}
        Err(e) => return Err(api_error(e)),
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_objects(
    State(state): State<Arc<ServerState>>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    let store = state.store.lock().await;
    let uuids = store
        .list_object_uuids(page.limit, page.offset)
        .map_err(api_error)?;
    Ok(Json(uuids))
}

async fn create_object(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CreateObjectRequest>,
) -> Result<Json<ObjectResource>, ApiError> {
    let store = state.store.lock().await;

    // Groups are resolved first: an unknown name is the caller's error.
    let mut groups = BTreeSet::new();
    for name in &req.level.groups {
        groups.insert(store.group_by_name(name).map_err(api_error)?.id);
    }

    let members = store
        .intern_tokens(req.level.tokens.iter().map(String::as_str))
        .map_err(api_error)?;
    let set = store.get_or_create_token_set(&members).map_err(api_error)?;
    let level = store.get_or_create_level(set, &groups).map_err(api_error)?;
    let object = store
        .create_object(level, req.uuid.as_deref())
        .map_err(api_error)?;

    // The response carries the level's own token-set values; lookups via
    // GET carry the effective union.
    let stored = store.level(level).map_err(api_error)?;
    let tokens = store.token_set_values(stored.token_set).map_err(api_error)?;
    let group_names = store.level_group_names(level).map_err(api_error)?;
    Ok(Json(ObjectResource {
        uuid: object.uuid,
        level: LevelResource {
            tokens: tokens.into_iter().collect(),
            groups: group_names,
        },
    }))
}

async fn get_object(
    State(state): State<Arc<ServerState>>,
    Path(uuid): Path<String>,
) -> Result<Json<ObjectResource>, ApiError> {
    let store = state.store.lock().await;
    let object = store.object_by_uuid(&uuid).map_err(api_error)?;
    let tokens = store.level_values(object.level).map_err(api_error)?;
    let groups = store.level_group_names(object.level).map_err(api_error)?;
    Ok(Json(ObjectResource {
        uuid: object.uuid,
        level: LevelResource {
            tokens: tokens.into_iter().collect(),
            groups,
        },
    }))
}

async fn get_object_ids(
    State(state): State<Arc<ServerState>>,
    Path(uuid): Path<String>,
) -> Result<Json<Vec<TokenId>>, ApiError> {
    let store = state.store.lock().await;
    let object = store.object_by_uuid(&uuid).map_err(api_error)?;
    let ids = store.level_ids(object.level).map_err(api_error)?;
    Ok(Json(ids.into_iter().collect()))
}

async fn delete_object(
    State(state): State<Arc<ServerState>>,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store = state.store.lock().await;
    match store.object_by_uuid(&uuid) {
        Ok(object) => store.delete_object(object.id).map_err(api_error)?,
        Err(StoreError::NotFound(..)) => {}
        Err(e) => return Err(api_error(e)),
    }
    Ok(StatusCode::NO_CONTENT)
}

// ── Router ────────────────────────────────────────────────────────────────

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/group", get(list_groups))
        .route("/group", post(create_group))
        .route("/group/{name}", get(get_group))
        .route("/group/{name}", delete(delete_group))
        .route("/group/{name}/ids", get(get_group_ids))
        .route("/object", get(list_objects))
        .route("/object", post(create_object))
        .route("/object/{uuid}", get(get_object))
        .route("/object/{uuid}", delete(delete_object))
        .route("/object/{uuid}/ids", get(get_object_ids))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
