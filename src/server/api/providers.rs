use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use super::body_reader;
use super::dto::{
    CreateProviderPlatformRequest, CreateProviderRequest, CreateProviderVersionRequest,
    ListProvidersQuery, UpdateProviderRequest,
};
use crate::auth::Authenticated;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse, ApiResult};
use crate::services::{
    CreateProviderInput, CreateProviderPlatformInput, CreateProviderVersionInput,
    UpdateProviderInput,
};

pub async fn create_provider(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProviderRequest>,
) -> ApiResult<impl IntoResponse> {
    let provider = state
        .providers
        .create_provider(
            &ctx,
            CreateProviderInput {
                group_path: req.group_path,
                name: req.name,
                private: req.private,
                repository_url: req.repository_url,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::success(provider)))
}

pub async fn list_providers(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListProvidersQuery>,
) -> ApiResult<impl IntoResponse> {
    let providers = match (query.group, query.ids) {
        (Some(group), None) => state.providers.list_providers(&ctx, &group).await?,
        (None, Some(ids)) => {
            let ids: Vec<String> = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect();
            state.providers.get_providers_by_ids(&ctx, &ids).await?
        }
        _ => return Err(ApiError::bad_request("Exactly one of 'group' or 'ids' is required")),
    };
    Ok(ApiResponse::success(providers))
}

pub async fn get_provider(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(
        state.providers.get_provider_by_id(&ctx, &id).await?,
    ))
}

pub async fn update_provider(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProviderRequest>,
) -> ApiResult<impl IntoResponse> {
    let provider = state
        .providers
        .update_provider(
            &ctx,
            UpdateProviderInput {
                id,
                private: req.private,
                repository_url: req.repository_url,
            },
        )
        .await?;
    Ok(ApiResponse::success(provider))
}

pub async fn delete_provider(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.providers.delete_provider(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_version(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
    Json(req): Json<CreateProviderVersionRequest>,
) -> ApiResult<impl IntoResponse> {
    let version = state
        .providers
        .create_provider_version(
            &ctx,
            CreateProviderVersionInput {
                provider_id,
                semantic_version: req.version,
                protocols: req.protocols,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::success(version)))
}

pub async fn list_versions(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(
        state
            .providers
            .list_provider_versions(&ctx, &provider_id)
            .await?,
    ))
}

pub async fn get_version(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(
        state.providers.get_provider_version(&ctx, &id).await?,
    ))
}

pub async fn delete_version(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.providers.delete_provider_version(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_readme(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<StatusCode> {
    let mut reader = body_reader(body);
    state
        .providers
        .upload_provider_version_readme(&ctx, &id, &mut reader)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_readme(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let reader = state
        .providers
        .get_provider_version_readme(&ctx, &id)
        .await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/markdown; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

pub async fn upload_sha256_sums(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<StatusCode> {
    let mut reader = body_reader(body);
    state
        .providers
        .upload_provider_version_sha256_sums(&ctx, &id, &mut reader)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_sha256_sums_signature(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<impl IntoResponse> {
    let mut reader = body_reader(body);
    let version = state
        .providers
        .upload_provider_version_sha256_sums_signature(&ctx, &id, &mut reader)
        .await?;
    Ok(ApiResponse::success(version))
}

pub async fn create_platform(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(version_id): Path<String>,
    Json(req): Json<CreateProviderPlatformRequest>,
) -> ApiResult<impl IntoResponse> {
    let platform = state
        .providers
        .create_provider_platform(
            &ctx,
            CreateProviderPlatformInput {
                provider_version_id: version_id,
                os: req.os,
                architecture: req.arch,
                sha_sum: req.shasum,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::success(platform)))
}

pub async fn list_platforms(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(version_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(
        state
            .providers
            .list_provider_platforms(&ctx, &version_id)
            .await?,
    ))
}

pub async fn get_platform(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(
        state.providers.get_provider_platform(&ctx, &id).await?,
    ))
}

pub async fn delete_platform(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.providers.delete_provider_platform(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_binary(
    Authenticated(ctx): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<StatusCode> {
    let mut reader = body_reader(body);
    state
        .providers
        .upload_provider_platform_binary(&ctx, &id, &mut reader)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
