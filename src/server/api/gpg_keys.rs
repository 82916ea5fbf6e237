use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::dto::{CreateGpgKeyRequest, GroupQuery};
use crate::auth::Authenticated;
use crate::server::AppState;
use crate::server::response::{ApiResponse, ApiResult};

pub async fn create_gpg_key(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGpgKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    let key = state
        .gpg_keys
        .create_gpg_key(&ctx, &req.group_path, &req.ascii_armor)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::success(key)))
}

pub async fn list_gpg_keys(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Query(query): Query<GroupQuery>,
) -> ApiResult<impl IntoResponse> {
    let keys = state
        .gpg_keys
        .list_gpg_keys(&ctx, &query.group, query.include_inherited)
        .await?;
    Ok(ApiResponse::success(keys))
}

pub async fn get_gpg_key(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(state.gpg_keys.get_gpg_key(&ctx, &id).await?))
}

pub async fn delete_gpg_key(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.gpg_keys.delete_gpg_key(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
