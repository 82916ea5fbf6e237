use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use super::response::{ApiError, ApiResult};
use crate::objectstore::ObjectStoreError;
use crate::server::AppState;

#[derive(Deserialize)]
pub struct PresignedQuery {
    pub expires: i64,
    pub signature: String,
}

pub fn objects_router() -> Router<Arc<AppState>> {
    Router::new().route("/{*key}", get(download))
}

/// Serves a blob to anyone holding an unexpired presigned URL for it.
async fn download(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<PresignedQuery>,
) -> ApiResult<Response> {
    if !state
        .objects
        .verify_presigned(&key, query.expires, &query.signature)
    {
        return Err(ApiError {
            status: StatusCode::FORBIDDEN,
            message: "Invalid or expired object URL".to_string(),
        });
    }

    let reader = match state.objects.download(&key).await {
        Ok(reader) => reader,
        Err(ObjectStoreError::NotFound) => return Err(ApiError::not_found("Object not found")),
        Err(e) => return Err(crate::error::Error::from(e).into()),
    };

    let body = Body::from_stream(ReaderStream::new(reader));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header("X-Content-Type-Options", "nosniff")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}
