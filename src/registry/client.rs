use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::io::StreamReader;

use super::address::{ProviderAddress, normalize_hostname};
use super::dto::{PROVIDERS_SERVICE, PackageResponse, PlatformEntry, VersionEntry, VersionsResponse};
use crate::objectstore::ObjectReader;
use crate::verify::{ChecksumError, Checksums, verify_checksums};

/// Upper bound on error-body snippets kept from non-200 responses.
const ERROR_BODY_LIMIT: usize = 1024 * 1024;

/// Upper bound on SHA256SUMS and signature downloads.
const MANIFEST_LIMIT: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum RegistryClientError {
    #[error("service discovery for {host} failed: {reason}")]
    Discovery { host: String, reason: String },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("invalid response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("registry returned warnings: {}", .0.join("; "))]
    Warnings(Vec<String>),
    #[error("registry returned no versions")]
    NoVersions,
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
    #[error(transparent)]
    Checksums(#[from] ChecksumError),
}

impl RegistryClientError {
    /// True when the upstream answered 404 for the requested resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

type ClientResult<T> = Result<T, RegistryClientError>;

/// What a registry reports for one platform of one version.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub filename: String,
    pub download_url: String,
    pub shasums_url: String,
    pub shasums_signature_url: String,
    pub shasum: String,
    pub gpg_ascii_armors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    /// `https` in production. Tests point this at plain-HTTP upstreams.
    pub scheme: String,
    /// Bearer tokens keyed by normalized hostname.
    pub tokens: HashMap<String, String>,
    /// Bounds connecting and each read from an upstream socket.
    pub timeout: Duration,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            tokens: HashMap::new(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Client for the Provider Registry Protocol. Performs no retries; callers
/// decide whether a failed operation is worth repeating.
#[derive(Clone)]
pub struct RegistryClient {
    http: Client,
    scheme: String,
    tokens: HashMap<String, String>,
}

impl RegistryClient {
    pub fn new(config: RegistryClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()
            .map_err(|source| RegistryClientError::Http {
                url: String::new(),
                source,
            })?;

        let tokens = config
            .tokens
            .into_iter()
            .filter_map(|(host, token)| match normalize_hostname(&host) {
                Ok(host) => Some((host, token)),
                Err(e) => {
                    tracing::warn!("Ignoring upstream token: {e}");
                    None
                }
            })
            .collect();

        Ok(Self {
            http,
            scheme: config.scheme,
            tokens,
        })
    }

    /// Resolves the provider service base URL advertised by `hostname`.
    pub async fn discover(&self, hostname: &str) -> ClientResult<Url> {
        let base = Url::parse(&format!("{}://{hostname}/", self.scheme))
            .map_err(|_| RegistryClientError::InvalidUrl(hostname.to_string()))?;
        let discovery_url = base
            .join(".well-known/terraform.json")
            .map_err(|_| RegistryClientError::InvalidUrl(hostname.to_string()))?;

        let document: serde_json::Value =
            self.get_json(discovery_url).await.map_err(|e| RegistryClientError::Discovery {
                host: hostname.to_string(),
                reason: e.to_string(),
            })?;

        let service = document
            .get(PROVIDERS_SERVICE)
            .and_then(|v| v.as_str())
            .ok_or_else(|| RegistryClientError::Discovery {
                host: hostname.to_string(),
                reason: format!("host does not offer {PROVIDERS_SERVICE}"),
            })?;

        let mut service_url = base
            .join(service)
            .map_err(|_| RegistryClientError::InvalidUrl(service.to_string()))?;
        if !service_url.path().ends_with('/') {
            let path = format!("{}/", service_url.path());
            service_url.set_path(&path);
        }
        Ok(service_url)
    }

    pub async fn list_versions(&self, address: &ProviderAddress) -> ClientResult<Vec<VersionEntry>> {
        let service = self.discover(&address.hostname).await?;
        let url = join(
            &service,
            &format!("{}/{}/versions", address.namespace, address.provider_type),
        )?;

        let response: VersionsResponse = self.get_json(url).await?;
        if let Some(warnings) = response.warnings.filter(|w| !w.is_empty()) {
            return Err(RegistryClientError::Warnings(warnings));
        }
        if response.versions.is_empty() {
            return Err(RegistryClientError::NoVersions);
        }
        Ok(response.versions)
    }

    /// Returns the first platform listed for exactly `version`. Only one is
    /// needed since every platform shares the same SHA256SUMS manifest.
    #[must_use]
    pub fn get_platform_for_version<'a>(
        versions: &'a [VersionEntry],
        version: &str,
    ) -> Option<&'a PlatformEntry> {
        versions
            .iter()
            .find(|v| v.version == version)
            .and_then(|v| v.platforms.first())
    }

    pub async fn get_package_info(
        &self,
        address: &ProviderAddress,
        version: &str,
        os: &str,
        arch: &str,
    ) -> ClientResult<PackageInfo> {
        let service = self.discover(&address.hostname).await?;
        let url = join(
            &service,
            &format!(
                "{}/{}/{version}/download/{os}/{arch}",
                address.namespace, address.provider_type
            ),
        )?;

        let package: PackageResponse = self.get_json(url.clone()).await?;

        // Registries may return URLs relative to the endpoint.
        Ok(PackageInfo {
            filename: package.filename,
            download_url: join(&url, &package.download_url)?.to_string(),
            shasums_url: join(&url, &package.shasums_url)?.to_string(),
            shasums_signature_url: join(&url, &package.shasums_signature_url)?.to_string(),
            shasum: package.shasum,
            gpg_ascii_armors: package
                .signing_keys
                .gpg_public_keys
                .into_iter()
                .map(|k| k.ascii_armor)
                .collect(),
        })
    }

    /// Streams a release archive. The body is not buffered.
    pub async fn download_package(&self, download_url: &str) -> ClientResult<ObjectReader> {
        let url = Url::parse(download_url)
            .map_err(|_| RegistryClientError::InvalidUrl(download_url.to_string()))?;
        let response = self.send(url).await?;

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }

    /// Downloads SHA256SUMS and its signature and verifies them against the
    /// package's signing keys.
    pub async fn get_checksums(&self, info: &PackageInfo) -> ClientResult<Checksums> {
        let sums = self.get_bytes(&info.shasums_url, MANIFEST_LIMIT).await?;
        let signature = self
            .get_bytes(&info.shasums_signature_url, MANIFEST_LIMIT)
            .await?;

        Ok(verify_checksums(
            Cursor::new(sums),
            &signature,
            &info.gpg_ascii_armors,
        )?)
    }

    fn token_for(&self, url: &Url) -> Option<&str> {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => return None,
        };
        let host = normalize_hostname(&host).ok()?;
        self.tokens.get(&host).map(String::as_str)
    }

    async fn send(&self, url: Url) -> ClientResult<Response> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = self.token_for(&url) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|source| RegistryClientError::Http {
                url: url.to_string(),
                source,
            })?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = read_limited(response, ERROR_BODY_LIMIT)
                .await
                .map(|(bytes, _)| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default();
            return Err(RegistryClientError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ClientResult<T> {
        let response = self.send(url.clone()).await?;
        response
            .json()
            .await
            .map_err(|e| RegistryClientError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn get_bytes(&self, raw_url: &str, limit: usize) -> ClientResult<Bytes> {
        let url =
            Url::parse(raw_url).map_err(|_| RegistryClientError::InvalidUrl(raw_url.to_string()))?;
        let response = self.send(url.clone()).await?;

        let (bytes, truncated) =
            read_limited(response, limit)
                .await
                .map_err(|source| RegistryClientError::Http {
                    url: url.to_string(),
                    source,
                })?;
        if truncated {
            return Err(RegistryClientError::TooLarge {
                url: url.to_string(),
                limit,
            });
        }
        Ok(bytes)
    }
}

fn join(base: &Url, path: &str) -> ClientResult<Url> {
    base.join(path)
        .map_err(|_| RegistryClientError::InvalidUrl(path.to_string()))
}

/// Reads at most `limit` bytes of the body. The flag is set when more data
/// was available.
async fn read_limited(
    mut response: Response,
    limit: usize,
) -> Result<(Bytes, bool), reqwest::Error> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = limit - buf.len();
        if chunk.len() > remaining {
            buf.extend_from_slice(&chunk[..remaining]);
            return Ok((buf.freeze(), true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf.freeze(), false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: &str, platforms: &[(&str, &str)]) -> VersionEntry {
        VersionEntry {
            version: version.to_string(),
            protocols: vec!["5.0".to_string()],
            platforms: platforms
                .iter()
                .map(|(os, arch)| PlatformEntry {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_platform_for_version_is_first_listed() {
        let versions = vec![
            entry("1.0.0", &[("linux", "amd64")]),
            entry("2.0.0", &[("darwin", "arm64"), ("linux", "amd64")]),
        ];

        let platform = RegistryClient::get_platform_for_version(&versions, "2.0.0").unwrap();
        assert_eq!(platform.os, "darwin");
        assert_eq!(platform.arch, "arm64");
    }

    #[test]
    fn test_platform_for_version_requires_exact_string() {
        let versions = vec![entry("1.0.0", &[("linux", "amd64")])];
        assert!(RegistryClient::get_platform_for_version(&versions, "1.0").is_none());
        assert!(RegistryClient::get_platform_for_version(&versions, "v1.0.0").is_none());
    }

    #[test]
    fn test_tokens_match_normalized_hosts() {
        let client = RegistryClient::new(RegistryClientConfig {
            tokens: HashMap::from([("Registry.Example.com:443".to_string(), "t0k".to_string())]),
            ..Default::default()
        })
        .unwrap();

        let url = Url::parse("https://registry.example.com/v1/providers/").unwrap();
        assert_eq!(client.token_for(&url), Some("t0k"));

        let other = Url::parse("https://downloads.example.com/archive.zip").unwrap();
        assert_eq!(client.token_for(&other), None);
    }

    #[test]
    fn test_not_found_status() {
        let err = RegistryClientError::Status {
            url: "https://x".to_string(),
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };
        assert!(err.is_not_found());
        assert!(!RegistryClientError::NoVersions.is_not_found());
    }

    #[tokio::test]
    async fn test_stalled_upstream_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accepts connections and never answers.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = RegistryClient::new(RegistryClientConfig {
            scheme: "http".to_string(),
            timeout: Duration::from_millis(200),
            ..RegistryClientConfig::default()
        })
        .unwrap();
        let address = ProviderAddress::new(&format!("127.0.0.1:{port}"), "acme", "widget").unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), client.list_versions(&address))
            .await
            .expect("client should give up on its own");
        assert!(matches!(result, Err(RegistryClientError::Discovery { .. })));
    }
}
