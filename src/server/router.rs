use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::api::api_router;
use super::mirror::mirror_router;
use super::objects::objects_router;
use super::registry::{discovery, registry_router};
use crate::auth::TokenGenerator;
use crate::objectstore::ObjectStore;
use crate::registry::RegistryClient;
use crate::services::{
    GpgKeyService, LimitChecker, ProviderMirrorService, ProviderRegistryService, StoreLimitChecker,
};
use crate::store::SqliteStore;

pub struct AppState {
    pub store: SqliteStore,
    pub objects: Arc<dyn ObjectStore>,
    pub tokens: TokenGenerator,
    pub providers: ProviderRegistryService,
    pub mirrors: ProviderMirrorService,
    pub gpg_keys: GpgKeyService,
}

impl AppState {
    /// Wires the services over one store, object store and upstream client.
    #[must_use]
    pub fn new(
        store: SqliteStore,
        objects: Arc<dyn ObjectStore>,
        registry: RegistryClient,
    ) -> Self {
        let limits: Arc<dyn LimitChecker> = Arc::new(StoreLimitChecker);

        Self {
            providers: ProviderRegistryService::new(store.clone(), objects.clone(), limits.clone()),
            mirrors: ProviderMirrorService::new(
                store.clone(),
                objects.clone(),
                limits.clone(),
                registry,
            ),
            gpg_keys: GpgKeyService::new(store.clone(), limits),
            tokens: TokenGenerator::new(),
            objects,
            store,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/.well-known/terraform.json", get(discovery))
        .nest("/v1/providers", registry_router())
        .nest("/v1/provider-mirror/providers", mirror_router())
        .nest("/v1/objects", objects_router())
        .nest("/api/v1", api_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
