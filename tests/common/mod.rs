#![allow(dead_code)]

pub mod upstream;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cairn::auth::{TokenGenerator, TokenSubject, issue_token};
use cairn::context::RequestContext;
use cairn::objectstore::{FilesystemObjectStore, ObjectReader, ObjectStore, ObjectStoreError};
use cairn::registry::{RegistryClient, RegistryClientConfig};
use cairn::server::AppState;
use cairn::store::{SqliteStore, activity, grants, groups, resource_limits, tokens, users};
use cairn::types::{
    ActivityEvent, Caller, Group, GroupGrant, LimitName, Permission, User, UserCaller,
};
use chrono::Utc;
use tempfile::TempDir;
use tokio::io::AsyncRead;
use uuid::Uuid;

pub const SIGNER1: &str = include_str!("../fixtures/signer1.asc");
pub const SIGNER2: &str = include_str!("../fixtures/signer2.asc");
pub const SIGNER3: &str = include_str!("../fixtures/signer3.asc");
pub const SHA256SUMS: &[u8] = include_bytes!("../fixtures/SHA256SUMS");
pub const SHA256SUMS_SIG: &[u8] = include_bytes!("../fixtures/SHA256SUMS.sig");
pub const SHA256SUMS_SIG_ASC: &[u8] = include_bytes!("../fixtures/SHA256SUMS.sig.asc");

/// Archive bodies whose digests SHA256SUMS lists.
pub const LINUX_AMD64_ZIP: &[u8] = b"linux amd64 provider archive\n";
pub const DARWIN_ARM64_ZIP: &[u8] = b"darwin arm64 provider archive\n";

pub const PUBLIC_BASE_URL: &str = "http://registry.test";

/// A fully wired application over a throwaway data directory.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: SqliteStore,
    pub state: Arc<AppState>,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_registry(RegistryClientConfig::default()).await
    }

    /// Upstream discovery over plain HTTP, for fake registries bound to
    /// `127.0.0.1`.
    pub async fn with_http_upstream() -> Self {
        Self::with_registry(http_upstream()).await
    }

    /// Like [`TestEnv::with_http_upstream`], but every object write fails.
    pub async fn with_failing_objects() -> Self {
        let objects: Arc<dyn ObjectStore> = Arc::new(FailingObjectStore);
        Self::build(http_upstream(), Some(objects)).await
    }

    pub async fn with_registry(config: RegistryClientConfig) -> Self {
        Self::build(config, None).await
    }

    async fn build(config: RegistryClientConfig, objects: Option<Arc<dyn ObjectStore>>) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = SqliteStore::new(temp_dir.path().join("cairn.db")).expect("open store");
        store.initialize().await.expect("initialize store");

        let objects: Arc<dyn ObjectStore> = objects.unwrap_or_else(|| {
            Arc::new(FilesystemObjectStore::new(
                temp_dir.path(),
                PUBLIC_BASE_URL,
                "test-signing-secret",
                Duration::from_secs(300),
            ))
        });
        let registry = RegistryClient::new(config).expect("registry client");
        let state = Arc::new(AppState::new(store.clone(), objects, registry));

        Self {
            temp_dir,
            store,
            state,
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub async fn group(&self, name: &str, parent: Option<&Group>) -> Group {
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            parent_id: parent.map(|p| p.id.clone()),
            full_path: match parent {
                Some(p) => format!("{}/{name}", p.full_path),
                None => name.to_string(),
            },
            created_at: Utc::now(),
        };
        let tx = self.store.begin().await.unwrap();
        groups::insert(&tx, &group).unwrap();
        tx.commit().unwrap();
        group
    }

    pub async fn user(&self, username: &str, admin: bool) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            admin,
            created_at: Utc::now(),
        };
        let tx = self.store.begin().await.unwrap();
        users::insert(&tx, &user).unwrap();
        tx.commit().unwrap();
        user
    }

    pub async fn grant(&self, user: &User, group: &Group, permissions: &[&str]) {
        let now = Utc::now();
        let tx = self.store.begin().await.unwrap();
        grants::upsert(
            &tx,
            &GroupGrant {
                subject_id: user.id.clone(),
                group_id: group.id.clone(),
                allow_bits: Permission::parse_many(permissions).unwrap(),
                deny_bits: Permission::default(),
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        tx.commit().unwrap();
    }

    /// Issues an API token for `user` and returns the raw value.
    pub async fn token(&self, user: &User) -> String {
        let (token, raw) =
            issue_token(&TokenGenerator::new(), TokenSubject::User(&user.id), None).unwrap();
        let tx = self.store.begin().await.unwrap();
        tokens::insert(&tx, &token).unwrap();
        tx.commit().unwrap();
        raw
    }

    pub async fn set_limit(&self, name: LimitName, value: i64) {
        let tx = self.store.begin().await.unwrap();
        resource_limits::set(&tx, name, value).unwrap();
        tx.commit().unwrap();
    }

    /// Number of files below `<data_dir>/objects/data`.
    pub fn stored_object_count(&self) -> usize {
        fn walk(dir: &Path) -> usize {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return 0;
            };
            entries
                .flatten()
                .map(|e| {
                    let path = e.path();
                    if path.is_dir() { walk(&path) } else { 1 }
                })
                .sum()
        }
        walk(&self.data_dir().join("objects").join("data"))
    }

    /// Activity events recorded for `group` so far.
    pub async fn activity(&self, group: &Group) -> Vec<ActivityEvent> {
        let tx = self.store.read().await.unwrap();
        activity::list_by_group(&tx, &group.id).unwrap()
    }
}

fn http_upstream() -> RegistryClientConfig {
    RegistryClientConfig {
        scheme: "http".to_string(),
        timeout: Duration::from_secs(5),
        ..RegistryClientConfig::default()
    }
}

/// An object store that refuses every write.
pub struct FailingObjectStore;

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn upload(
        &self,
        _key: &str,
        _reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, ObjectStoreError> {
        Err(ObjectStoreError::Io(std::io::Error::other("no space left on device")))
    }

    async fn download(&self, _key: &str) -> Result<ObjectReader, ObjectStoreError> {
        Err(ObjectStoreError::NotFound)
    }

    async fn delete(&self, _key: &str) -> Result<bool, ObjectStoreError> {
        Ok(false)
    }

    fn presigned_url(&self, key: &str) -> Result<String, ObjectStoreError> {
        Ok(format!("{PUBLIC_BASE_URL}/v1/objects/{key}"))
    }

    fn verify_presigned(&self, _key: &str, _expires: i64, _signature: &str) -> bool {
        false
    }
}

pub fn ctx_for(user: &User) -> RequestContext {
    RequestContext::new(Caller::User(UserCaller { user: user.clone() }))
}

pub fn admin_ctx() -> RequestContext {
    RequestContext::system()
}
