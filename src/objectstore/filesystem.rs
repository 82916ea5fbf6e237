use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader};
use uuid::Uuid;

use super::{ObjectReader, ObjectStore, ObjectStoreError};

type HmacSha256 = Hmac<Sha256>;

impl ObjectStoreError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// Stores objects under `<data_dir>/objects` and hands out URLs served by
/// the `/v1/objects` route, signed with a shared secret.
pub struct FilesystemObjectStore {
    base_path: PathBuf,
    public_base_url: String,
    signing_secret: String,
    url_ttl: Duration,
}

impl FilesystemObjectStore {
    pub fn new(
        data_dir: &Path,
        public_base_url: impl Into<String>,
        signing_secret: impl Into<String>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            base_path: data_dir.join("objects"),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            signing_secret: signing_secret.into(),
            url_ttl,
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.base_path.join("data").join(key))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }

    /// MAC over `<key>\n<expires>`. Keys never contain a newline.
    fn mac(&self, key: &str, expires: i64) -> Result<HmacSha256, ObjectStoreError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|e| ObjectStoreError::Signing(e.to_string()))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    fn sign(&self, key: &str, expires: i64) -> Result<String, ObjectStoreError> {
        Ok(hex::encode(self.mac(key, expires)?.finalize().into_bytes()))
    }

    async fn write_temp(
        &self,
        temp_path: &Path,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, ObjectStoreError> {
        let mut temp_file = File::create(temp_path).await?;
        let written = tokio::io::copy(reader, &mut temp_file).await?;
        temp_file.flush().await?;
        temp_file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn upload(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, ObjectStoreError> {
        let final_path = self.object_path(key)?;

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let written = match self.write_temp(&temp_path, reader).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&temp_path, &final_path).await?;

        Ok(written)
    }

    async fn download(&self, key: &str) -> Result<ObjectReader, ObjectStoreError> {
        let path = self.object_path(key)?;
        let file = File::open(&path).await.map_err(ObjectStoreError::from_io)?;
        Ok(Box::new(BufReader::new(file)))
    }

    async fn delete(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ObjectStoreError::Io(e)),
        }
    }

    fn presigned_url(&self, key: &str) -> Result<String, ObjectStoreError> {
        validate_key(key)?;
        let ttl = i64::try_from(self.url_ttl.as_secs()).unwrap_or(i64::MAX / 2);
        let expires = Utc::now().timestamp().saturating_add(ttl);
        Ok(format!(
            "{}/v1/objects/{key}?expires={expires}&signature={}",
            self.public_base_url,
            self.sign(key, expires)?
        ))
    }

    fn verify_presigned(&self, key: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        self.mac(key, expires)
            .is_ok_and(|mac| mac.verify_slice(&signature).is_ok())
    }
}

/// Keys are `/`-separated segments of `[A-Za-z0-9._-]`, never `.` or `..`.
fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let valid = !key.is_empty()
        && key.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        });

    if valid {
        Ok(())
    } else {
        Err(ObjectStoreError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn store(dir: &TempDir) -> FilesystemObjectStore {
        FilesystemObjectStore::new(
            dir.path(),
            "http://registry.test/",
            "s3cret",
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let mut data: &[u8] = b"provider bytes";
        let written = store.upload("mirror/providers/abc", &mut data).await.unwrap();
        assert_eq!(written, 14);

        let mut reader = store.download("mirror/providers/abc").await.unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"provider bytes");
    }

    #[tokio::test]
    async fn test_not_found_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        assert!(matches!(
            store.download("mirror/providers/missing").await,
            Err(ObjectStoreError::NotFound)
        ));

        let mut data: &[u8] = b"x";
        store.upload("mirror/providers/abc", &mut data).await.unwrap();
        assert!(store.delete("mirror/providers/abc").await.unwrap());
        assert!(!store.delete("mirror/providers/abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        for key in ["", "../etc/passwd", "a//b", "a/./b", "a/b c"] {
            let mut data: &[u8] = b"x";
            assert!(
                matches!(
                    store.upload(key, &mut data).await,
                    Err(ObjectStoreError::InvalidKey(_))
                ),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn test_presigned_url_verifies() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let url = store.presigned_url("registry/providers/p/v/README").unwrap();
        assert!(url.starts_with("http://registry.test/v1/objects/registry/providers/p/v/README?"));

        let query = url.split_once('?').unwrap().1;
        let mut expires = 0;
        let mut signature = "";
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = v.parse().unwrap(),
                ("signature", v) => signature = v,
                _ => {}
            }
        }

        assert!(store.verify_presigned("registry/providers/p/v/README", expires, signature));
        assert!(!store.verify_presigned("registry/providers/p/v/SHA256SUMS", expires, signature));
        assert!(!store.verify_presigned("registry/providers/p/v/README", expires + 1, signature));
        assert!(!store.verify_presigned("registry/providers/p/v/README", expires, "not-hex"));

        let stale = store.sign("registry/providers/p/v/README", 1).unwrap();
        assert!(!store.verify_presigned("registry/providers/p/v/README", 1, &stale));
    }

    #[test]
    fn test_signature_binds_key_and_expiry_boundary() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        // Both expiries lie far in the future; only the split point differs.
        let key = "registry/providers/p/v/f1";
        let expires = 99_999_999_999;
        let signature = store.sign(key, expires).unwrap();
        assert!(store.verify_presigned(key, expires, &signature));

        let shifted_key = format!("{key}9");
        assert!(!store.verify_presigned(&shifted_key, 9_999_999_999, &signature));
    }

    #[test]
    fn test_signatures_depend_on_secret() {
        let temp_dir = TempDir::new().unwrap();
        let other = FilesystemObjectStore::new(
            temp_dir.path(),
            "http://registry.test/",
            "another-secret",
            Duration::from_secs(300),
        );

        let signature = store(&temp_dir).sign("mirror/providers/m", 99_999_999_999).unwrap();
        assert!(!other.verify_presigned("mirror/providers/m", 99_999_999_999, &signature));
    }
}
