use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::body_reader;
use super::dto::{CreateVersionMirrorRequest, ForceQuery, GroupQuery};
use crate::auth::Authenticated;
use crate::server::AppState;
use crate::server::response::{ApiResponse, ApiResult};
use crate::services::CreateProviderVersionMirrorInput;

#[derive(Deserialize)]
pub struct PlatformPath {
    pub id: String,
    pub os: String,
    pub arch: String,
}

pub async fn create_version_mirror(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateVersionMirrorRequest>,
) -> ApiResult<impl IntoResponse> {
    let mirror = state
        .mirrors
        .create_provider_version_mirror(
            &ctx,
            CreateProviderVersionMirrorInput {
                group_path: req.group_path,
                registry_hostname: req.hostname,
                registry_namespace: req.namespace,
                provider_type: req.provider_type,
                semantic_version: req.version,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::success(mirror)))
}

pub async fn list_version_mirrors(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Query(query): Query<GroupQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(
        state
            .mirrors
            .list_provider_version_mirrors(&ctx, &query.group)
            .await?,
    ))
}

pub async fn get_version_mirror(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(
        state
            .mirrors
            .get_provider_version_mirror_by_id(&ctx, &id)
            .await?,
    ))
}

pub async fn delete_version_mirror(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ForceQuery>,
) -> ApiResult<StatusCode> {
    state
        .mirrors
        .delete_provider_version_mirror(&ctx, &id, query.force)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_platform_mirrors(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(
        state
            .mirrors
            .list_provider_platform_mirrors(&ctx, &id)
            .await?,
    ))
}

pub async fn upload_package(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(path): Path<PlatformPath>,
    body: Body,
) -> ApiResult<impl IntoResponse> {
    let mut reader = body_reader(body);
    let platform = state
        .mirrors
        .upload_installation_package(&ctx, &path.id, &path.os, &path.arch, &mut reader)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::success(platform)))
}

/// Fetches the package from the upstream registry instead of the request body.
pub async fn pull_package(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(path): Path<PlatformPath>,
) -> ApiResult<impl IntoResponse> {
    let platform = state
        .mirrors
        .pull_installation_package(&ctx, &path.id, &path.os, &path.arch)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::success(platform)))
}

pub async fn get_platform_mirror(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(
        state.mirrors.get_provider_platform_mirror(&ctx, &id).await?,
    ))
}

pub async fn delete_platform_mirror(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .mirrors
        .delete_provider_platform_mirror(&ctx, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
