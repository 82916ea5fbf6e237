//! Blob storage for registry and mirror artifacts.

mod filesystem;

pub use filesystem::FilesystemObjectStore;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::error::Error;

pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found")]
    NotFound,
    #[error("invalid object key '{0}'")]
    InvalidKey(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to sign object URL: {0}")]
    Signing(String),
}

impl From<ObjectStoreError> for Error {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound => Error::not_found("object not found"),
            ObjectStoreError::InvalidKey(key) => {
                Error::internal(format!("invalid object key '{key}'"))
            }
            ObjectStoreError::Io(e) => Error::Io(e),
            ObjectStoreError::Signing(message) => Error::internal(message),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Streams `reader` to `key`, replacing any existing object. Returns the
    /// number of bytes written.
    async fn upload(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, ObjectStoreError>;

    async fn download(&self, key: &str) -> Result<ObjectReader, ObjectStoreError>;

    /// Returns false when nothing was stored under `key`.
    async fn delete(&self, key: &str) -> Result<bool, ObjectStoreError>;

    /// A time-limited URL from which a client can fetch the object directly.
    fn presigned_url(&self, key: &str) -> Result<String, ObjectStoreError>;

    /// Whether `signature` was issued by [`ObjectStore::presigned_url`] for
    /// `key` and `expires` has not passed.
    fn verify_presigned(&self, key: &str, expires: i64, signature: &str) -> bool;
}

/// Object keys. Every key is derived from immutable row ids.
pub mod keys {
    fn version_prefix(provider_id: &str, version_id: &str) -> String {
        format!("registry/providers/{provider_id}/{version_id}")
    }

    #[must_use]
    pub fn provider_readme(provider_id: &str, version_id: &str) -> String {
        format!("{}/README", version_prefix(provider_id, version_id))
    }

    #[must_use]
    pub fn provider_sha_sums(provider_id: &str, version_id: &str) -> String {
        format!("{}/SHA256SUMS", version_prefix(provider_id, version_id))
    }

    #[must_use]
    pub fn provider_sha_sums_signature(provider_id: &str, version_id: &str) -> String {
        format!("{}/SHA256SUMS.sig", version_prefix(provider_id, version_id))
    }

    #[must_use]
    pub fn provider_platform_binary(provider_id: &str, version_id: &str, platform_id: &str) -> String {
        format!(
            "{}/platforms/{platform_id}/binary",
            version_prefix(provider_id, version_id)
        )
    }

    #[must_use]
    pub fn mirror_platform_package(platform_mirror_id: &str) -> String {
        format!("mirror/providers/{platform_mirror_id}")
    }

}
