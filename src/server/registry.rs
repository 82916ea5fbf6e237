//! Provider Registry Protocol for providers hosted here. The registry
//! namespace is the provider's root group.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use super::response::ApiResult;
use crate::auth::Authenticated;
use crate::registry::dto::{PROVIDERS_SERVICE, PackageResponse, VersionsResponse};
use crate::server::AppState;

#[derive(Deserialize)]
pub struct ProviderPath {
    pub namespace: String,
    pub provider_type: String,
}

#[derive(Deserialize)]
pub struct PackagePath {
    pub namespace: String,
    pub provider_type: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

pub async fn discovery() -> Json<Value> {
    Json(json!({ PROVIDERS_SERVICE: "/v1/providers/" }))
}

pub fn registry_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{namespace}/{provider_type}/versions", get(versions))
        .route(
            "/{namespace}/{provider_type}/{version}/download/{os}/{arch}",
            get(download),
        )
}

async fn versions(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(path): Path<ProviderPath>,
) -> ApiResult<Json<VersionsResponse>> {
    let response = state
        .providers
        .registry_versions(&ctx, &path.namespace, &path.provider_type)
        .await?;
    Ok(Json(response))
}

async fn download(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(path): Path<PackagePath>,
) -> ApiResult<Json<PackageResponse>> {
    let response = state
        .providers
        .registry_package(
            &ctx,
            &path.namespace,
            &path.provider_type,
            &path.version,
            &path.os,
            &path.arch,
        )
        .await?;
    Ok(Json(response))
}
