//! An in-process upstream registry serving the fixture release of
//! `hashicorp/example`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use super::{DARWIN_ARM64_ZIP, LINUX_AMD64_ZIP, SHA256SUMS, SHA256SUMS_SIG};

pub struct UpstreamConfig {
    /// Versions listed by the versions endpoint, each offered for
    /// linux/amd64 and darwin/arm64.
    pub versions: Vec<String>,
    pub warnings: Vec<String>,
    /// Armored keys returned as the package's signing keys.
    pub signing_keys: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            versions: vec!["1.0.0".to_string()],
            warnings: Vec::new(),
            signing_keys: vec![
                super::SIGNER1.to_string(),
                super::SIGNER3.to_string(),
                super::SIGNER2.to_string(),
            ],
        }
    }
}

pub struct FakeUpstream {
    /// `127.0.0.1:<port>`, usable as a registry hostname.
    pub hostname: String,
}

impl FakeUpstream {
    pub async fn start(config: UpstreamConfig) -> Self {
        let app = Router::new()
            .route("/.well-known/terraform.json", get(discovery))
            .route("/v1/providers/{namespace}/{provider_type}/versions", get(versions))
            .route(
                "/v1/providers/{namespace}/{provider_type}/{version}/download/{os}/{arch}",
                get(download),
            )
            .route("/files/{name}", get(file))
            .with_state(Arc::new(config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind upstream");
        let port = listener.local_addr().expect("local addr").port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve upstream");
        });

        Self {
            hostname: format!("127.0.0.1:{port}"),
        }
    }
}

async fn discovery() -> Json<serde_json::Value> {
    Json(json!({ "providers.v1": "/v1/providers/" }))
}

async fn versions(
    State(config): State<Arc<UpstreamConfig>>,
    Path((namespace, provider_type)): Path<(String, String)>,
) -> Response {
    if namespace != "hashicorp" || provider_type != "example" {
        return StatusCode::NOT_FOUND.into_response();
    }

    let versions: Vec<_> = config
        .versions
        .iter()
        .map(|v| {
            json!({
                "version": v,
                "protocols": ["6.0"],
                "platforms": [
                    { "os": "linux", "arch": "amd64" },
                    { "os": "darwin", "arch": "arm64" },
                ],
            })
        })
        .collect();
    Json(json!({ "versions": versions, "warnings": config.warnings })).into_response()
}

async fn download(
    State(config): State<Arc<UpstreamConfig>>,
    Path((namespace, provider_type, version, os, arch)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Response {
    if namespace != "hashicorp" || provider_type != "example" || !config.versions.contains(&version)
    {
        return StatusCode::NOT_FOUND.into_response();
    }

    let filename = format!("terraform-provider-example_{version}_{os}_{arch}.zip");
    let keys: Vec<_> = config
        .signing_keys
        .iter()
        .map(|armor| json!({ "ascii_armor": armor }))
        .collect();

    Json(json!({
        "protocols": ["6.0"],
        "os": os,
        "arch": arch,
        "filename": filename,
        "download_url": format!("/files/{filename}"),
        "shasums_url": "/files/SHA256SUMS",
        "shasums_signature_url": "/files/SHA256SUMS.sig",
        "shasum": "",
        "signing_keys": { "gpg_public_keys": keys },
    }))
    .into_response()
}

async fn file(Path(name): Path<String>) -> Response {
    let body: &'static [u8] = match name.as_str() {
        "SHA256SUMS" => SHA256SUMS,
        "SHA256SUMS.sig" => SHA256SUMS_SIG,
        "terraform-provider-example_1.0.0_linux_amd64.zip" => LINUX_AMD64_ZIP,
        "terraform-provider-example_1.0.0_darwin_arm64.zip" => DARWIN_ARM64_ZIP,
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    body.into_response()
}
