//! JSON management API. Handlers translate requests into service calls;
//! every permission decision happens in the services.

mod dto;
mod gpg_keys;
mod mirrors;
mod providers;

use std::sync::Arc;

use axum::body::Body;
use axum::{
    Router,
    routing::{get, post, put},
};
use futures_util::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::server::AppState;

/// Adapts a request body into a reader for the upload services.
fn body_reader(body: Body) -> impl AsyncRead + Send + Unpin {
    StreamReader::new(body.into_data_stream().map_err(std::io::Error::other))
}

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Provider routes
        .route(
            "/providers",
            post(providers::create_provider).get(providers::list_providers),
        )
        .route(
            "/providers/{id}",
            get(providers::get_provider)
                .patch(providers::update_provider)
                .delete(providers::delete_provider),
        )
        .route(
            "/providers/{id}/versions",
            post(providers::create_version).get(providers::list_versions),
        )
        .route(
            "/provider-versions/{id}",
            get(providers::get_version).delete(providers::delete_version),
        )
        .route(
            "/provider-versions/{id}/readme",
            put(providers::upload_readme).get(providers::get_readme),
        )
        .route(
            "/provider-versions/{id}/sha256sums",
            put(providers::upload_sha256_sums),
        )
        .route(
            "/provider-versions/{id}/sha256sums-signature",
            put(providers::upload_sha256_sums_signature),
        )
        .route(
            "/provider-versions/{id}/platforms",
            post(providers::create_platform).get(providers::list_platforms),
        )
        .route(
            "/provider-platforms/{id}",
            get(providers::get_platform).delete(providers::delete_platform),
        )
        .route(
            "/provider-platforms/{id}/binary",
            put(providers::upload_binary),
        )
        // GPG key routes
        .route(
            "/gpg-keys",
            post(gpg_keys::create_gpg_key).get(gpg_keys::list_gpg_keys),
        )
        .route(
            "/gpg-keys/{id}",
            get(gpg_keys::get_gpg_key).delete(gpg_keys::delete_gpg_key),
        )
        // Mirror routes
        .route(
            "/provider-version-mirrors",
            post(mirrors::create_version_mirror).get(mirrors::list_version_mirrors),
        )
        .route(
            "/provider-version-mirrors/{id}",
            get(mirrors::get_version_mirror).delete(mirrors::delete_version_mirror),
        )
        .route(
            "/provider-version-mirrors/{id}/platforms",
            get(mirrors::list_platform_mirrors),
        )
        .route(
            "/provider-version-mirrors/{id}/platforms/{os}/{arch}",
            put(mirrors::upload_package).post(mirrors::pull_package),
        )
        .route(
            "/provider-platform-mirrors/{id}",
            get(mirrors::get_platform_mirror).delete(mirrors::delete_platform_mirror),
        )
}
