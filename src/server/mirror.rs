//! Provider Network Mirror Protocol. Each root group serves its own mirror
//! under `/v1/provider-mirror/providers/<root group>/`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::response::{ApiError, ApiResult};
use crate::auth::Authenticated;
use crate::server::AppState;

const INDEX_FILE: &str = "index.json";

#[derive(Deserialize)]
pub struct MirrorPath {
    pub root_group: String,
    pub hostname: String,
    pub namespace: String,
    pub provider_type: String,
    /// `index.json` or `<version>.json`.
    pub file: String,
}

pub fn mirror_router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/{root_group}/{hostname}/{namespace}/{provider_type}/{file}",
        get(mirror_file),
    )
}

async fn mirror_file(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(path): Path<MirrorPath>,
) -> ApiResult<Response> {
    if path.file == INDEX_FILE {
        let versions = state
            .mirrors
            .get_available_provider_versions(
                &ctx,
                &path.root_group,
                &path.hostname,
                &path.namespace,
                &path.provider_type,
            )
            .await?;
        return Ok(Json(versions).into_response());
    }

    let version = path
        .file
        .strip_suffix(".json")
        .ok_or_else(|| ApiError::not_found(format!("{} not found", path.file)))?;

    let archives = state
        .mirrors
        .get_available_installation_packages(
            &ctx,
            &path.root_group,
            &path.hostname,
            &path.namespace,
            &path.provider_type,
            version,
        )
        .await?;
    Ok(Json(archives).into_response())
}
