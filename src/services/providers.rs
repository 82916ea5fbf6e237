use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use super::access::{self, require_group_permission, require_provider_visible};
use super::activity::{self, Target};
use super::limits::LimitChecker;
use super::spool::{MAX_PACKAGE_SIZE, spool_and_hash};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::objectstore::{ObjectReader, ObjectStore, keys};
use crate::registry::dto::{
    GpgPublicKey, PackageResponse, PlatformEntry, SigningKeys, VersionEntry, VersionsResponse,
};
use crate::registry::{canonical_filename, validate_provider_part};
use crate::store::{SqliteStore, gpg_keys, groups, provider_platforms, provider_versions, providers};
use crate::types::version::{highest, parse_version, supersedes};
use crate::types::{
    ActivityAction, ActivityTarget, Caller, LimitName, Permission, Provider, ProviderPlatform,
    ProviderVersion,
};
use crate::verify::{format_key_id, signature_issuer_key_id};

/// Detached signatures are a few hundred bytes; anything near this is bogus.
const SIGNATURE_LIMIT: u64 = 64 * 1024;

/// Ceiling on README and SHA256SUMS uploads.
const MAX_DOCUMENT_SIZE: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CreateProviderInput {
    pub group_path: String,
    pub name: String,
    pub private: bool,
    pub repository_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProviderInput {
    pub id: String,
    pub private: Option<bool>,
    pub repository_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateProviderVersionInput {
    pub provider_id: String,
    pub semantic_version: String,
    pub protocols: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CreateProviderPlatformInput {
    pub provider_version_id: String,
    pub os: String,
    pub architecture: String,
    /// Lowercase or uppercase hex SHA-256 of the release archive.
    pub sha_sum: String,
}

#[derive(Debug, Clone, Copy)]
enum VersionArtifact {
    Readme,
    ShaSums,
}

impl VersionArtifact {
    fn name(self) -> &'static str {
        match self {
            VersionArtifact::Readme => "README",
            VersionArtifact::ShaSums => "SHA256SUMS",
        }
    }

    fn key(self, provider_id: &str, version_id: &str) -> String {
        match self {
            VersionArtifact::Readme => keys::provider_readme(provider_id, version_id),
            VersionArtifact::ShaSums => keys::provider_sha_sums(provider_id, version_id),
        }
    }
}

/// Owns providers hosted by this registry, their versions and platforms,
/// and the artifacts uploaded for them.
pub struct ProviderRegistryService {
    store: SqliteStore,
    objects: Arc<dyn ObjectStore>,
    limits: Arc<dyn LimitChecker>,
}

impl ProviderRegistryService {
    pub fn new(
        store: SqliteStore,
        objects: Arc<dyn ObjectStore>,
        limits: Arc<dyn LimitChecker>,
    ) -> Self {
        Self {
            store,
            objects,
            limits,
        }
    }

    // Providers

    pub async fn create_provider(
        &self,
        ctx: &RequestContext,
        input: CreateProviderInput,
    ) -> Result<Provider> {
        let caller = ctx.caller()?;
        let name = validate_provider_part("name", &input.name)?;

        let tx = self.store.begin().await?;
        let group = access::group_by_path(&tx, &input.group_path)?;
        require_group_permission(&tx, caller, &group.id, Permission::PROVIDER_WRITE)?;

        let root = groups::root_of(&tx, &group.id)?
            .ok_or_else(|| Error::internal(format!("root group of {} vanished", group.id)))?;

        let now = Utc::now();
        let provider = Provider {
            id: Uuid::new_v4().to_string(),
            name,
            group_id: group.id.clone(),
            root_group_id: root.id,
            private: input.private,
            repository_url: input.repository_url,
            created_by: caller.subject(),
            created_at: now,
            updated_at: now,
        };
        providers::insert(&tx, &provider)?;

        let count = providers::count_by_group(&tx, &group.id)?;
        self.limits
            .check_limit(&tx, LimitName::ProvidersPerGroup, count)?;

        activity::record(
            &tx,
            caller,
            ActivityAction::Create,
            provider_target(&provider),
            Some(json!({ "name": provider.name })),
        )?;
        tx.commit()?;

        tracing::info!("Created provider {} in {}", provider.name, group.full_path);
        Ok(provider)
    }

    pub async fn get_provider_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Provider> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let provider = provider_or_not_found(&tx, id)?;
        require_provider_visible(&tx, caller, &provider)?;
        Ok(provider)
    }

    /// Looks a provider up by its registry address, `<root group>/<name>`.
    pub async fn get_provider_by_address(
        &self,
        ctx: &RequestContext,
        root_group: &str,
        name: &str,
    ) -> Result<Provider> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let provider = provider_by_address(&tx, root_group, name)?;
        require_provider_visible(&tx, caller, &provider)?;
        Ok(provider)
    }

    /// Every returned row is checked individually; one invisible provider
    /// fails the whole call.
    pub async fn get_providers_by_ids(
        &self,
        ctx: &RequestContext,
        ids: &[String],
    ) -> Result<Vec<Provider>> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let found = providers::get_many(&tx, ids)?;
        for provider in &found {
            require_provider_visible(&tx, caller, provider)?;
        }
        Ok(found)
    }

    /// Lists a group's providers. Callers without `provider:read` on the
    /// group see only the public ones.
    pub async fn list_providers(
        &self,
        ctx: &RequestContext,
        group_path: &str,
    ) -> Result<Vec<Provider>> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let group = access::group_by_path(&tx, group_path)?;
        let can_read_private =
            access::check_group_permission(&tx, caller, &group.id, Permission::PROVIDER_READ)?;

        let mut found = providers::list_by_group(&tx, &group.id)?;
        if !can_read_private {
            found.retain(|p| !p.private);
        }
        Ok(found)
    }

    pub async fn update_provider(
        &self,
        ctx: &RequestContext,
        input: UpdateProviderInput,
    ) -> Result<Provider> {
        let caller = ctx.caller()?;
        let tx = self.store.begin().await?;
        let mut provider = provider_or_not_found(&tx, &input.id)?;
        require_group_permission(&tx, caller, &provider.group_id, Permission::PROVIDER_WRITE)?;

        if let Some(private) = input.private {
            provider.private = private;
        }
        if let Some(url) = input.repository_url {
            provider.repository_url = if url.is_empty() { None } else { Some(url) };
        }
        provider.updated_at = Utc::now();
        providers::update(&tx, &provider)?;

        activity::record(
            &tx,
            caller,
            ActivityAction::Update,
            provider_target(&provider),
            None,
        )?;
        tx.commit()?;
        Ok(provider)
    }

    /// Deletes the provider with all its versions and platforms, then removes
    /// their stored artifacts.
    pub async fn delete_provider(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        let caller = ctx.caller()?;
        let tx = self.store.begin().await?;
        let provider = provider_or_not_found(&tx, id)?;
        require_group_permission(&tx, caller, &provider.group_id, Permission::PROVIDER_WRITE)?;

        let mut object_keys = Vec::new();
        for version in provider_versions::list_by_provider(&tx, &provider.id)? {
            object_keys.extend(artifact_keys(&tx, &provider, &version)?);
        }

        providers::delete(&tx, &provider.id)?;
        activity::record(
            &tx,
            caller,
            ActivityAction::Delete,
            provider_target(&provider),
            Some(json!({ "name": provider.name })),
        )?;
        tx.commit()?;

        self.remove_objects(object_keys).await;
        Ok(())
    }

    // Versions

    /// Creates a version and moves the latest flag to it when it has higher
    /// semver precedence than the current latest.
    pub async fn create_provider_version(
        &self,
        ctx: &RequestContext,
        input: CreateProviderVersionInput,
    ) -> Result<ProviderVersion> {
        let caller = ctx.caller()?;
        let parsed = parse_version(&input.semantic_version)?;
        let semantic_version = parsed.to_string();

        let tx = self.store.begin().await?;
        let provider = provider_or_not_found(&tx, &input.provider_id)?;
        require_group_permission(&tx, caller, &provider.group_id, Permission::PROVIDER_WRITE)?;

        let current = provider_versions::get_latest(&tx, &provider.id)?;
        let latest = match &current {
            None => true,
            Some(current) => supersedes(&parsed, &parse_version(&current.semantic_version)?),
        };
        if latest {
            if let Some(current) = &current {
                provider_versions::set_latest(&tx, &current.id, false)?;
            }
        }

        let now = Utc::now();
        let version = ProviderVersion {
            id: Uuid::new_v4().to_string(),
            provider_id: provider.id.clone(),
            semantic_version,
            protocols: input.protocols,
            latest,
            readme_uploaded: false,
            sha_sums_uploaded: false,
            sha_sums_sig_uploaded: false,
            gpg_key_id: None,
            gpg_ascii_armor: None,
            created_by: caller.subject(),
            created_at: now,
            updated_at: now,
        };
        provider_versions::insert(&tx, &version)?;

        let count = provider_versions::count_by_provider(&tx, &provider.id)?;
        self.limits
            .check_limit(&tx, LimitName::VersionsPerProvider, count)?;

        activity::record(
            &tx,
            caller,
            ActivityAction::Create,
            version_target(&provider, &version),
            Some(json!({ "version": version.semantic_version, "latest": latest })),
        )?;
        tx.commit()?;
        Ok(version)
    }

    pub async fn get_provider_version(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<ProviderVersion> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let (provider, version) = version_with_provider(&tx, id)?;
        require_provider_visible(&tx, caller, &provider)?;
        Ok(version)
    }

    pub async fn list_provider_versions(
        &self,
        ctx: &RequestContext,
        provider_id: &str,
    ) -> Result<Vec<ProviderVersion>> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let provider = provider_or_not_found(&tx, provider_id)?;
        require_provider_visible(&tx, caller, &provider)?;
        provider_versions::list_by_provider(&tx, &provider.id)
    }

    /// Deletes a version. If it was the latest, the highest remaining version
    /// is promoted in the same transaction.
    pub async fn delete_provider_version(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        let caller = ctx.caller()?;
        let tx = self.store.begin().await?;
        let (provider, version) = version_with_provider(&tx, id)?;
        require_group_permission(&tx, caller, &provider.group_id, Permission::PROVIDER_WRITE)?;

        let object_keys = artifact_keys(&tx, &provider, &version)?;
        provider_versions::delete(&tx, &version.id)?;

        let promoted = if version.latest {
            promote_latest(&tx, &provider.id)?
        } else {
            None
        };

        activity::record(
            &tx,
            caller,
            ActivityAction::Delete,
            version_target(&provider, &version),
            Some(json!({
                "version": version.semantic_version,
                "promoted": promoted.as_ref().map(|v| v.semantic_version.clone()),
            })),
        )?;
        tx.commit()?;

        self.remove_objects(object_keys).await;
        Ok(())
    }

    // Platforms

    pub async fn create_provider_platform(
        &self,
        ctx: &RequestContext,
        input: CreateProviderPlatformInput,
    ) -> Result<ProviderPlatform> {
        let caller = ctx.caller()?;
        let os = validate_provider_part("os", &input.os)?;
        let architecture = validate_provider_part("architecture", &input.architecture)?;
        let sha_sum = input.sha_sum.trim().to_ascii_lowercase();
        let mut digest = [0u8; 32];
        hex::decode_to_slice(&sha_sum, &mut digest)
            .map_err(|e| Error::invalid(format!("invalid sha256 checksum '{}': {e}", input.sha_sum)))?;

        let tx = self.store.begin().await?;
        let (provider, version) = version_with_provider(&tx, &input.provider_version_id)?;
        require_group_permission(&tx, caller, &provider.group_id, Permission::PROVIDER_WRITE)?;

        let platform = ProviderPlatform {
            id: Uuid::new_v4().to_string(),
            provider_version_id: version.id.clone(),
            filename: canonical_filename(&provider.name, &version.semantic_version, &os, &architecture),
            os,
            architecture,
            sha_sum,
            binary_uploaded: false,
            created_by: caller.subject(),
            created_at: Utc::now(),
        };
        provider_platforms::insert(&tx, &platform)?;

        let count = provider_platforms::count_by_version(&tx, &version.id)?;
        self.limits
            .check_limit(&tx, LimitName::PlatformsPerProviderVersion, count)?;

        activity::record(
            &tx,
            caller,
            ActivityAction::Create,
            Target {
                kind: ActivityTarget::ProviderPlatform,
                id: &platform.id,
                group_id: &provider.group_id,
            },
            Some(json!({ "os": platform.os, "arch": platform.architecture })),
        )?;
        tx.commit()?;
        Ok(platform)
    }

    pub async fn get_provider_platform(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<ProviderPlatform> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let (provider, _, platform) = platform_with_parents(&tx, id)?;
        require_provider_visible(&tx, caller, &provider)?;
        Ok(platform)
    }

    pub async fn list_provider_platforms(
        &self,
        ctx: &RequestContext,
        provider_version_id: &str,
    ) -> Result<Vec<ProviderPlatform>> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let (provider, version) = version_with_provider(&tx, provider_version_id)?;
        require_provider_visible(&tx, caller, &provider)?;
        provider_platforms::list_by_version(&tx, &version.id)
    }

    pub async fn delete_provider_platform(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        let caller = ctx.caller()?;
        let tx = self.store.begin().await?;
        let (provider, version, platform) = platform_with_parents(&tx, id)?;
        require_group_permission(&tx, caller, &provider.group_id, Permission::PROVIDER_WRITE)?;

        provider_platforms::delete(&tx, &platform.id)?;
        activity::record(
            &tx,
            caller,
            ActivityAction::Delete,
            Target {
                kind: ActivityTarget::ProviderPlatform,
                id: &platform.id,
                group_id: &provider.group_id,
            },
            Some(json!({ "os": platform.os, "arch": platform.architecture })),
        )?;
        tx.commit()?;

        if platform.binary_uploaded {
            let key = keys::provider_platform_binary(&provider.id, &version.id, &platform.id);
            self.remove_objects(vec![key]).await;
        }
        Ok(())
    }

    // Uploads. Each drains the body into a temp file before opening the
    // write transaction, then flips its latch, writes the object and commits.
    // A failed object write rolls the latch back.

    pub async fn upload_provider_platform_binary(
        &self,
        ctx: &RequestContext,
        platform_id: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        let caller = ctx.caller()?;
        {
            let tx = self.store.read().await?;
            writable_platform(&tx, caller, platform_id)?;
        }

        let mut spooled = ctx
            .run(spool_and_hash(reader, MAX_PACKAGE_SIZE, "provider binary"))
            .await?;

        let tx = self.store.begin().await?;
        let (provider, version, platform) = writable_platform(&tx, caller, platform_id)?;
        provider_platforms::mark_binary_uploaded(&tx, &platform.id)?;

        activity::record(
            &tx,
            caller,
            ActivityAction::Upload,
            Target {
                kind: ActivityTarget::ProviderPlatform,
                id: &platform.id,
                group_id: &provider.group_id,
            },
            Some(json!({
                "artifact": "binary",
                "filename": platform.filename,
                "size": spooled.size,
            })),
        )?;

        let key = keys::provider_platform_binary(&provider.id, &version.id, &platform.id);
        self.put_object(ctx, &key, &mut spooled.file).await?;
        tx.commit()
    }

    pub async fn upload_provider_version_readme(
        &self,
        ctx: &RequestContext,
        version_id: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        self.upload_version_artifact(ctx, version_id, VersionArtifact::Readme, reader)
            .await
    }

    pub async fn upload_provider_version_sha256_sums(
        &self,
        ctx: &RequestContext,
        version_id: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        self.upload_version_artifact(ctx, version_id, VersionArtifact::ShaSums, reader)
            .await
    }

    /// Binds the version to the stored GPG key that issued the signature.
    /// The key is looked up by 64-bit key id on the provider's group and its
    /// ancestors; its id and armor are copied onto the version.
    pub async fn upload_provider_version_sha256_sums_signature(
        &self,
        ctx: &RequestContext,
        version_id: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<ProviderVersion> {
        let caller = ctx.caller()?;
        let signature = ctx.run(read_bounded(reader, SIGNATURE_LIMIT)).await?;

        let tx = self.store.begin().await?;
        let (provider, mut version) = version_with_provider(&tx, version_id)?;
        require_group_permission(&tx, caller, &provider.group_id, Permission::PROVIDER_WRITE)?;

        if version.sha_sums_sig_uploaded {
            return Err(Error::conflict(format!(
                "SHA256SUMS signature already uploaded for version {}",
                version.semantic_version
            )));
        }

        let key_id = signature_issuer_key_id(&signature)
            .map_err(|e| Error::invalid(format!("invalid SHA256SUMS signature: {e}")))?;
        let trusted = gpg_keys::list_inherited(&tx, &provider.group_id, Some(key_id))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::invalid(format!(
                    "no trusted key with id {} found for this provider's group",
                    format_key_id(key_id)
                ))
            })?;

        version.gpg_key_id = Some(trusted.gpg_key_id);
        version.gpg_ascii_armor = Some(trusted.ascii_armor);
        version.sha_sums_sig_uploaded = true;
        version.updated_at = Utc::now();
        provider_versions::update(&tx, &version)?;

        activity::record(
            &tx,
            caller,
            ActivityAction::Upload,
            version_target(&provider, &version),
            Some(json!({
                "artifact": "SHA256SUMS.sig",
                "gpg_key_id": format_key_id(trusted.gpg_key_id),
            })),
        )?;

        let key = keys::provider_sha_sums_signature(&provider.id, &version.id);
        self.put_object(ctx, &key, &mut signature.as_slice()).await?;
        tx.commit()?;
        Ok(version)
    }

    pub async fn get_provider_version_readme(
        &self,
        ctx: &RequestContext,
        version_id: &str,
    ) -> Result<ObjectReader> {
        let caller = ctx.caller()?;
        let (provider, version) = {
            let tx = self.store.read().await?;
            let (provider, version) = version_with_provider(&tx, version_id)?;
            require_provider_visible(&tx, caller, &provider)?;
            (provider, version)
        };

        if !version.readme_uploaded {
            return Err(Error::not_found(format!(
                "no README uploaded for version {}",
                version.semantic_version
            )));
        }

        let key = keys::provider_readme(&provider.id, &version.id);
        ctx.run(async { Ok(self.objects.download(&key).await?) })
            .await
    }

    // Provider Registry Protocol (server role)

    /// Versions with both checksum artifacts uploaded, each listing the
    /// platforms whose binaries are uploaded.
    pub async fn registry_versions(
        &self,
        ctx: &RequestContext,
        root_group: &str,
        name: &str,
    ) -> Result<VersionsResponse> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let provider = provider_by_address(&tx, root_group, name)?;
        require_provider_visible(&tx, caller, &provider)?;

        let mut versions = Vec::new();
        for version in provider_versions::list_by_provider(&tx, &provider.id)? {
            if !(version.sha_sums_uploaded && version.sha_sums_sig_uploaded) {
                continue;
            }
            let platforms = provider_platforms::list_by_version(&tx, &version.id)?
                .into_iter()
                .filter(|p| p.binary_uploaded)
                .map(|p| PlatformEntry {
                    os: p.os,
                    arch: p.architecture,
                })
                .collect();
            versions.push(VersionEntry {
                version: version.semantic_version,
                protocols: version.protocols,
                platforms,
            });
        }

        Ok(VersionsResponse {
            versions,
            warnings: None,
        })
    }

    pub async fn registry_package(
        &self,
        ctx: &RequestContext,
        root_group: &str,
        name: &str,
        semantic_version: &str,
        os: &str,
        arch: &str,
    ) -> Result<PackageResponse> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let provider = provider_by_address(&tx, root_group, name)?;
        require_provider_visible(&tx, caller, &provider)?;

        let normalized = parse_version(semantic_version)?.to_string();
        let version = provider_versions::get_by_semver(&tx, &provider.id, &normalized)?
            .filter(|v| v.sha_sums_uploaded && v.sha_sums_sig_uploaded)
            .ok_or_else(|| Error::not_found(format!("version {semantic_version} not found")))?;
        let platform = provider_platforms::get_by_os_arch(&tx, &version.id, os, arch)?
            .filter(|p| p.binary_uploaded)
            .ok_or_else(|| {
                Error::not_found(format!("no package for {os}_{arch} in version {semantic_version}"))
            })?;

        let signing_keys = match (version.gpg_key_id, &version.gpg_ascii_armor) {
            (Some(key_id), Some(armor)) => vec![GpgPublicKey {
                key_id: format_key_id(key_id),
                ascii_armor: armor.clone(),
            }],
            _ => Vec::new(),
        };

        Ok(PackageResponse {
            protocols: version.protocols.clone(),
            os: platform.os.clone(),
            arch: platform.architecture.clone(),
            download_url: self.objects.presigned_url(&keys::provider_platform_binary(
                &provider.id,
                &version.id,
                &platform.id,
            ))?,
            shasums_url: self
                .objects
                .presigned_url(&keys::provider_sha_sums(&provider.id, &version.id))?,
            shasums_signature_url: self
                .objects
                .presigned_url(&keys::provider_sha_sums_signature(&provider.id, &version.id))?,
            filename: platform.filename,
            shasum: platform.sha_sum,
            signing_keys: SigningKeys {
                gpg_public_keys: signing_keys,
            },
        })
    }

    async fn upload_version_artifact(
        &self,
        ctx: &RequestContext,
        version_id: &str,
        artifact: VersionArtifact,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        let caller = ctx.caller()?;
        {
            let tx = self.store.read().await?;
            writable_version(&tx, caller, version_id, artifact)?;
        }

        let mut spooled = ctx
            .run(spool_and_hash(reader, MAX_DOCUMENT_SIZE, artifact.name()))
            .await?;

        let tx = self.store.begin().await?;
        let (provider, mut version) = writable_version(&tx, caller, version_id, artifact)?;
        match artifact {
            VersionArtifact::Readme => version.readme_uploaded = true,
            VersionArtifact::ShaSums => version.sha_sums_uploaded = true,
        }
        version.updated_at = Utc::now();
        provider_versions::update(&tx, &version)?;

        activity::record(
            &tx,
            caller,
            ActivityAction::Upload,
            version_target(&provider, &version),
            Some(json!({ "artifact": artifact.name(), "size": spooled.size })),
        )?;

        self.put_object(ctx, &artifact.key(&provider.id, &version.id), &mut spooled.file)
            .await?;
        tx.commit()
    }

    async fn put_object(
        &self,
        ctx: &RequestContext,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        ctx.run(async {
            self.objects.upload(key, reader).await?;
            Ok(())
        })
        .await
    }

    async fn remove_objects(&self, object_keys: Vec<String>) {
        for key in object_keys {
            if let Err(e) = self.objects.delete(&key).await {
                tracing::warn!("Failed to delete object {key}: {e}");
            }
        }
    }
}

fn provider_target(provider: &Provider) -> Target<'_> {
    Target {
        kind: ActivityTarget::Provider,
        id: &provider.id,
        group_id: &provider.group_id,
    }
}

fn version_target<'a>(provider: &'a Provider, version: &'a ProviderVersion) -> Target<'a> {
    Target {
        kind: ActivityTarget::ProviderVersion,
        id: &version.id,
        group_id: &provider.group_id,
    }
}

fn provider_or_not_found(conn: &Connection, id: &str) -> Result<Provider> {
    providers::get(conn, id)?.ok_or_else(|| Error::not_found(format!("provider {id} not found")))
}

fn provider_by_address(conn: &Connection, root_group: &str, name: &str) -> Result<Provider> {
    let not_found = || Error::not_found(format!("provider {root_group}/{name} not found"));
    let root = groups::get_by_path(conn, root_group)?
        .filter(|g| g.is_root())
        .ok_or_else(not_found)?;
    providers::get_by_root_group_and_name(conn, &root.id, &name.to_ascii_lowercase())?
        .ok_or_else(not_found)
}

fn version_with_provider(conn: &Connection, version_id: &str) -> Result<(Provider, ProviderVersion)> {
    let version = provider_versions::get(conn, version_id)?
        .ok_or_else(|| Error::not_found(format!("provider version {version_id} not found")))?;
    let provider = providers::get(conn, &version.provider_id)?.ok_or_else(|| {
        Error::internal(format!("provider of version {version_id} vanished"))
    })?;
    Ok((provider, version))
}

/// Loads a version for an artifact upload, rejecting it when the caller may
/// not write or the artifact is already uploaded.
fn writable_version(
    conn: &Connection,
    caller: &Caller,
    version_id: &str,
    artifact: VersionArtifact,
) -> Result<(Provider, ProviderVersion)> {
    let (provider, version) = version_with_provider(conn, version_id)?;
    require_group_permission(conn, caller, &provider.group_id, Permission::PROVIDER_WRITE)?;

    let uploaded = match artifact {
        VersionArtifact::Readme => version.readme_uploaded,
        VersionArtifact::ShaSums => version.sha_sums_uploaded,
    };
    if uploaded {
        return Err(Error::conflict(format!(
            "{} already uploaded for version {}",
            artifact.name(),
            version.semantic_version
        )));
    }
    Ok((provider, version))
}

fn writable_platform(
    conn: &Connection,
    caller: &Caller,
    platform_id: &str,
) -> Result<(Provider, ProviderVersion, ProviderPlatform)> {
    let (provider, version, platform) = platform_with_parents(conn, platform_id)?;
    require_group_permission(conn, caller, &provider.group_id, Permission::PROVIDER_WRITE)?;
    if platform.binary_uploaded {
        return Err(Error::conflict(format!(
            "binary already uploaded for {}",
            platform.filename
        )));
    }
    Ok((provider, version, platform))
}

fn platform_with_parents(
    conn: &Connection,
    platform_id: &str,
) -> Result<(Provider, ProviderVersion, ProviderPlatform)> {
    let platform = provider_platforms::get(conn, platform_id)?
        .ok_or_else(|| Error::not_found(format!("provider platform {platform_id} not found")))?;
    let (provider, version) = version_with_provider(conn, &platform.provider_version_id)?;
    Ok((provider, version, platform))
}

/// Marks the highest remaining version as latest, if any remain.
fn promote_latest(conn: &Connection, provider_id: &str) -> Result<Option<ProviderVersion>> {
    let remaining = provider_versions::list_by_provider(conn, provider_id)?;
    let parsed: Vec<_> = remaining
        .iter()
        .filter_map(|v| match parse_version(&v.semantic_version) {
            Ok(semver) => Some((semver, v)),
            Err(e) => {
                tracing::warn!("Skipping unparseable version {}: {e}", v.id);
                None
            }
        })
        .collect();

    let Some(next) = highest(parsed.iter().map(|(semver, v)| (semver, *v))) else {
        return Ok(None);
    };
    provider_versions::set_latest(conn, &next.id, true)?;

    let mut promoted = next.clone();
    promoted.latest = true;
    Ok(Some(promoted))
}

fn artifact_keys(
    conn: &Connection,
    provider: &Provider,
    version: &ProviderVersion,
) -> Result<Vec<String>> {
    let mut object_keys = Vec::new();
    if version.readme_uploaded {
        object_keys.push(keys::provider_readme(&provider.id, &version.id));
    }
    if version.sha_sums_uploaded {
        object_keys.push(keys::provider_sha_sums(&provider.id, &version.id));
    }
    if version.sha_sums_sig_uploaded {
        object_keys.push(keys::provider_sha_sums_signature(&provider.id, &version.id));
    }
    for platform in provider_platforms::list_by_version(conn, &version.id)? {
        if platform.binary_uploaded {
            object_keys.push(keys::provider_platform_binary(
                &provider.id,
                &version.id,
                &platform.id,
            ));
        }
    }
    Ok(object_keys)
}

async fn read_bounded(reader: &mut (dyn AsyncRead + Send + Unpin), limit: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(limit + 1).read_to_end(&mut buf).await?;
    if buf.len() as u64 > limit {
        return Err(Error::invalid(format!("upload exceeds {limit} bytes")));
    }
    Ok(buf)
}
