use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use tokio::io::AsyncRead;
use uuid::Uuid;

use super::access::{self, require_group_permission};
use super::activity::{self, Target};
use super::limits::LimitChecker;
use super::spool::{MAX_PACKAGE_SIZE, spool_and_hash};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::objectstore::{ObjectReader, ObjectStore, keys};
use crate::registry::dto::{MirrorArchive, MirrorArchivesResponse, MirrorVersion, MirrorVersionsResponse};
use crate::registry::{
    ProviderAddress, RegistryClient, RegistryClientError, canonical_filename, validate_provider_part,
};
use crate::store::version_mirrors::MirrorAddress;
use crate::store::{SqliteStore, platform_mirrors, version_mirrors};
use crate::types::version::parse_version;
use crate::types::{
    ActivityAction, ActivityTarget, Caller, LimitName, Permission, ProviderPlatformMirror,
    ProviderVersionMirror,
};
use crate::verify::Checksums;

const HASH_SCHEME: &str = "zh:";

#[derive(Debug, Clone)]
pub struct CreateProviderVersionMirrorInput {
    pub group_path: String,
    pub registry_hostname: String,
    pub registry_namespace: String,
    pub provider_type: String,
    pub semantic_version: String,
}

/// Caches upstream providers per root group and serves them over the
/// Provider Network Mirror Protocol.
pub struct ProviderMirrorService {
    store: SqliteStore,
    objects: Arc<dyn ObjectStore>,
    limits: Arc<dyn LimitChecker>,
    registry: RegistryClient,
}

impl ProviderMirrorService {
    pub fn new(
        store: SqliteStore,
        objects: Arc<dyn ObjectStore>,
        limits: Arc<dyn LimitChecker>,
        registry: RegistryClient,
    ) -> Self {
        Self {
            store,
            objects,
            limits,
            registry,
        }
    }

    /// Records a mirror of one upstream provider version together with every
    /// digest its signed SHA256SUMS manifest lists. No packages are fetched.
    pub async fn create_provider_version_mirror(
        &self,
        ctx: &RequestContext,
        input: CreateProviderVersionMirrorInput,
    ) -> Result<ProviderVersionMirror> {
        let caller = ctx.caller()?;

        let group = {
            let tx = self.store.read().await?;
            let group = access::group_by_path(&tx, &input.group_path)?;
            require_group_permission(&tx, caller, &group.id, Permission::MIRROR_WRITE)?;
            if !group.is_root() {
                return Err(Error::invalid(format!(
                    "provider mirrors can only be created in a root group, '{}' is not one",
                    group.full_path
                )));
            }
            group
        };

        let address = ProviderAddress::new(
            &input.registry_hostname,
            &input.registry_namespace,
            &input.provider_type,
        )?;
        let version = parse_version(&input.semantic_version)?.to_string();

        {
            let tx = self.store.read().await?;
            if version_mirrors::get_by_address(&tx, mirror_address(&group.id, &address), &version)?
                .is_some()
            {
                return Err(duplicate_mirror(&address, &version));
            }
        }

        let versions = ctx
            .run(async {
                self.registry
                    .list_versions(&address)
                    .await
                    .map_err(|e| upstream_error(e, &address, &version))
            })
            .await?;
        let platform = RegistryClient::get_platform_for_version(&versions, &version)
            .ok_or_else(|| {
                Error::invalid(format!(
                    "version {version} of {address} is not available for any platform"
                ))
            })?
            .clone();

        let digests = ctx
            .run(async {
                self.fetch_checksums(&address, &version, &platform.os, &platform.arch)
                    .await
                    .map_err(|e| upstream_error(e, &address, &version))
            })
            .await?;

        let mirror = ProviderVersionMirror {
            id: Uuid::new_v4().to_string(),
            group_id: group.id.clone(),
            registry_hostname: address.hostname.clone(),
            registry_namespace: address.namespace.clone(),
            provider_type: address.provider_type.clone(),
            semantic_version: version,
            digests,
            created_by: caller.subject(),
            created_at: Utc::now(),
        };

        let tx = self.store.begin().await?;
        version_mirrors::insert(&tx, &mirror)?;

        let count = version_mirrors::count_by_group(&tx, &group.id)?;
        self.limits
            .check_limit(&tx, LimitName::VersionMirrorsPerRootGroup, count)?;

        activity::record(
            &tx,
            caller,
            ActivityAction::Create,
            version_mirror_target(&mirror),
            Some(json!({
                "address": address.to_string(),
                "version": mirror.semantic_version,
            })),
        )?;
        tx.commit()?;

        tracing::info!(
            "Created mirror of {address} {} in {}",
            mirror.semantic_version,
            group.full_path
        );
        Ok(mirror)
    }

    pub async fn get_provider_version_mirror_by_id(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<ProviderVersionMirror> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let mirror = version_mirror_or_not_found(&tx, id)?;
        require_group_permission(&tx, caller, &mirror.group_id, Permission::MIRROR_READ)?;
        Ok(mirror)
    }

    pub async fn list_provider_version_mirrors(
        &self,
        ctx: &RequestContext,
        group_path: &str,
    ) -> Result<Vec<ProviderVersionMirror>> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let group = access::root_group_by_path(&tx, group_path)?;
        require_group_permission(&tx, caller, &group.id, Permission::MIRROR_READ)?;
        version_mirrors::list_by_group(&tx, &group.id)
    }

    /// Refuses while platform mirrors remain unless `force` is set. Forced
    /// deletes drop the platform rows with the mirror but leave their
    /// packages in the object store.
    pub async fn delete_provider_version_mirror(
        &self,
        ctx: &RequestContext,
        id: &str,
        force: bool,
    ) -> Result<()> {
        let caller = ctx.caller()?;
        let tx = self.store.begin().await?;
        let mirror = version_mirror_or_not_found(&tx, id)?;
        require_group_permission(&tx, caller, &mirror.group_id, Permission::MIRROR_WRITE)?;

        let platforms = platform_mirrors::count_by_version_mirror(&tx, &mirror.id)?;
        if platforms > 0 && !force {
            return Err(Error::conflict(format!(
                "mirror of {} has {platforms} platform mirror(s); delete them first or force",
                mirror.semantic_version
            )));
        }

        version_mirrors::delete(&tx, &mirror.id)?;
        activity::record(
            &tx,
            caller,
            ActivityAction::Delete,
            version_mirror_target(&mirror),
            Some(json!({ "version": mirror.semantic_version, "force": force })),
        )?;
        tx.commit()
    }

    /// Accepts an installation package only if its SHA-256 matches the digest
    /// recorded for its canonical filename.
    pub async fn upload_installation_package(
        &self,
        ctx: &RequestContext,
        version_mirror_id: &str,
        os: &str,
        arch: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<ProviderPlatformMirror> {
        let caller = ctx.caller()?;
        let os = validate_provider_part("os", os)?;
        let arch = validate_provider_part("arch", arch)?;

        let (mirror, expected) = {
            let tx = self.store.read().await?;
            let mirror = self.writable_mirror(&tx, caller, version_mirror_id, &os, &arch)?;
            let filename = mirror_filename(&mirror, &os, &arch);
            let expected = *mirror.digests.get(&filename).ok_or_else(|| {
                Error::invalid(format!(
                    "{filename} is not listed in the SHA256SUMS of this mirror"
                ))
            })?;
            (mirror, expected)
        };

        let mut spooled = ctx
            .run(spool_and_hash(reader, MAX_PACKAGE_SIZE, "installation package"))
            .await?;
        let digest = spooled.digest;
        if digest != expected {
            return Err(Error::invalid(format!(
                "checksum mismatch for {}: expected {}, got {}",
                mirror_filename(&mirror, &os, &arch),
                hex::encode(expected),
                hex::encode(digest)
            )));
        }

        let platform = ProviderPlatformMirror {
            id: Uuid::new_v4().to_string(),
            version_mirror_id: mirror.id.clone(),
            os,
            architecture: arch,
            created_by: caller.subject(),
            created_at: Utc::now(),
        };

        let tx = self.store.begin().await?;
        platform_mirrors::insert(&tx, &platform)?;

        let count = platform_mirrors::count_by_version_mirror(&tx, &mirror.id)?;
        self.limits
            .check_limit(&tx, LimitName::PlatformMirrorsPerVersionMirror, count)?;

        activity::record(
            &tx,
            caller,
            ActivityAction::Upload,
            Target {
                kind: ActivityTarget::ProviderPlatformMirror,
                id: &platform.id,
                group_id: &mirror.group_id,
            },
            Some(json!({ "os": platform.os, "arch": platform.architecture })),
        )?;

        let key = keys::mirror_platform_package(&platform.id);
        ctx.run(async {
            self.objects.upload(&key, &mut spooled.file).await?;
            Ok(())
        })
        .await?;
        tx.commit()?;

        tracing::info!(
            "Mirrored {}_{} of {}/{}/{} {}",
            platform.os,
            platform.architecture,
            mirror.registry_hostname,
            mirror.registry_namespace,
            mirror.provider_type,
            mirror.semantic_version
        );
        Ok(platform)
    }

    /// Downloads a package from the upstream registry and stores it through
    /// [`Self::upload_installation_package`].
    pub async fn pull_installation_package(
        &self,
        ctx: &RequestContext,
        version_mirror_id: &str,
        os: &str,
        arch: &str,
    ) -> Result<ProviderPlatformMirror> {
        let caller = ctx.caller()?;
        let os = validate_provider_part("os", os)?;
        let arch = validate_provider_part("arch", arch)?;

        let mirror = {
            let tx = self.store.read().await?;
            self.writable_mirror(&tx, caller, version_mirror_id, &os, &arch)?
        };
        let address = ProviderAddress::new(
            &mirror.registry_hostname,
            &mirror.registry_namespace,
            &mirror.provider_type,
        )?;
        let version = mirror.semantic_version.clone();

        let mut package = ctx
            .run(async {
                self.fetch_package(&address, &version, &os, &arch)
                    .await
                    .map_err(|e| upstream_error(e, &address, &version))
            })
            .await?;

        self.upload_installation_package(ctx, &mirror.id, &os, &arch, &mut package)
            .await
    }

    pub async fn get_provider_platform_mirror(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<ProviderPlatformMirror> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let (mirror, platform) = platform_with_mirror(&tx, id)?;
        require_group_permission(&tx, caller, &mirror.group_id, Permission::MIRROR_READ)?;
        Ok(platform)
    }

    pub async fn list_provider_platform_mirrors(
        &self,
        ctx: &RequestContext,
        version_mirror_id: &str,
    ) -> Result<Vec<ProviderPlatformMirror>> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let mirror = version_mirror_or_not_found(&tx, version_mirror_id)?;
        require_group_permission(&tx, caller, &mirror.group_id, Permission::MIRROR_READ)?;
        platform_mirrors::list_by_version_mirror(&tx, &mirror.id)
    }

    pub async fn delete_provider_platform_mirror(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        let caller = ctx.caller()?;
        let tx = self.store.begin().await?;
        let (mirror, platform) = platform_with_mirror(&tx, id)?;
        require_group_permission(&tx, caller, &mirror.group_id, Permission::MIRROR_WRITE)?;

        platform_mirrors::delete(&tx, &platform.id)?;
        activity::record(
            &tx,
            caller,
            ActivityAction::Delete,
            Target {
                kind: ActivityTarget::ProviderPlatformMirror,
                id: &platform.id,
                group_id: &mirror.group_id,
            },
            Some(json!({ "os": platform.os, "arch": platform.architecture })),
        )?;
        tx.commit()?;

        let key = keys::mirror_platform_package(&platform.id);
        if let Err(e) = self.objects.delete(&key).await {
            tracing::warn!("Failed to delete object {key}: {e}");
        }
        Ok(())
    }

    // Provider Network Mirror Protocol

    /// `index.json`: versions of the provider with at least one package.
    pub async fn get_available_provider_versions(
        &self,
        ctx: &RequestContext,
        root_group: &str,
        hostname: &str,
        namespace: &str,
        provider_type: &str,
    ) -> Result<MirrorVersionsResponse> {
        let caller = ctx.caller()?;
        let address = ProviderAddress::new(hostname, namespace, provider_type)?;

        let tx = self.store.read().await?;
        let group = access::root_group_by_path(&tx, root_group)?;
        require_group_permission(&tx, caller, &group.id, Permission::MIRROR_READ)?;

        let mirrors = version_mirrors::list_populated(&tx, mirror_address(&group.id, &address))?;
        if mirrors.is_empty() {
            return Err(Error::not_found(format!("no mirrored versions of {address}")));
        }

        Ok(MirrorVersionsResponse {
            versions: mirrors
                .into_iter()
                .map(|m| (m.semantic_version, MirrorVersion::default()))
                .collect(),
        })
    }

    /// `<version>.json`: every mirrored package of one version.
    pub async fn get_available_installation_packages(
        &self,
        ctx: &RequestContext,
        root_group: &str,
        hostname: &str,
        namespace: &str,
        provider_type: &str,
        semantic_version: &str,
    ) -> Result<MirrorArchivesResponse> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let (mirror, platforms) = mirrored_platforms(
            &tx,
            caller,
            root_group,
            hostname,
            namespace,
            provider_type,
            semantic_version,
        )?;
        if platforms.is_empty() {
            return Err(Error::not_found(format!(
                "no packages mirrored for version {semantic_version}"
            )));
        }

        let mut archives = BTreeMap::new();
        for platform in &platforms {
            archives.insert(
                format!("{}_{}", platform.os, platform.architecture),
                self.archive(&mirror, platform)?,
            );
        }
        Ok(MirrorArchivesResponse { archives })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn get_installation_package(
        &self,
        ctx: &RequestContext,
        root_group: &str,
        hostname: &str,
        namespace: &str,
        provider_type: &str,
        semantic_version: &str,
        os: &str,
        arch: &str,
    ) -> Result<MirrorArchive> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let (mirror, platforms) = mirrored_platforms(
            &tx,
            caller,
            root_group,
            hostname,
            namespace,
            provider_type,
            semantic_version,
        )?;
        let platform = platforms
            .iter()
            .find(|p| p.os == os && p.architecture == arch)
            .ok_or_else(|| {
                Error::not_found(format!(
                    "no package mirrored for {os}_{arch} in version {semantic_version}"
                ))
            })?;
        self.archive(&mirror, platform)
    }

    async fn fetch_checksums(
        &self,
        address: &ProviderAddress,
        version: &str,
        os: &str,
        arch: &str,
    ) -> std::result::Result<Checksums, RegistryClientError> {
        let info = self
            .registry
            .get_package_info(address, version, os, arch)
            .await?;
        self.registry.get_checksums(&info).await
    }

    async fn fetch_package(
        &self,
        address: &ProviderAddress,
        version: &str,
        os: &str,
        arch: &str,
    ) -> std::result::Result<ObjectReader, RegistryClientError> {
        let info = self
            .registry
            .get_package_info(address, version, os, arch)
            .await?;
        self.registry.download_package(&info.download_url).await
    }

    fn archive(
        &self,
        mirror: &ProviderVersionMirror,
        platform: &ProviderPlatformMirror,
    ) -> Result<MirrorArchive> {
        let filename = mirror_filename(mirror, &platform.os, &platform.architecture);
        let digest = mirror.digests.get(&filename).ok_or_else(|| {
            Error::internal(format!("mirror {} has no digest for {filename}", mirror.id))
        })?;

        Ok(MirrorArchive {
            url: self
                .objects
                .presigned_url(&keys::mirror_platform_package(&platform.id))?,
            hashes: vec![format!("{HASH_SCHEME}{}", hex::encode(digest))],
        })
    }

    /// Loads a version mirror for a package write and rejects the write early
    /// when the platform is already mirrored.
    fn writable_mirror(
        &self,
        conn: &Connection,
        caller: &Caller,
        version_mirror_id: &str,
        os: &str,
        arch: &str,
    ) -> Result<ProviderVersionMirror> {
        let mirror = version_mirror_or_not_found(conn, version_mirror_id)?;
        require_group_permission(conn, caller, &mirror.group_id, Permission::MIRROR_WRITE)?;
        if platform_mirrors::get_by_os_arch(conn, &mirror.id, os, arch)?.is_some() {
            return Err(Error::conflict(format!(
                "platform {os}_{arch} is already mirrored for version {}",
                mirror.semantic_version
            )));
        }
        Ok(mirror)
    }
}

fn mirror_address<'a>(group_id: &'a str, address: &'a ProviderAddress) -> MirrorAddress<'a> {
    MirrorAddress {
        group_id,
        hostname: &address.hostname,
        namespace: &address.namespace,
        provider_type: &address.provider_type,
    }
}

fn mirror_filename(mirror: &ProviderVersionMirror, os: &str, arch: &str) -> String {
    canonical_filename(&mirror.provider_type, &mirror.semantic_version, os, arch)
}

fn version_mirror_target(mirror: &ProviderVersionMirror) -> Target<'_> {
    Target {
        kind: ActivityTarget::ProviderVersionMirror,
        id: &mirror.id,
        group_id: &mirror.group_id,
    }
}

fn duplicate_mirror(address: &ProviderAddress, version: &str) -> Error {
    Error::conflict(format!("{address} {version} is already mirrored in this group"))
}

fn version_mirror_or_not_found(conn: &Connection, id: &str) -> Result<ProviderVersionMirror> {
    version_mirrors::get(conn, id)?
        .ok_or_else(|| Error::not_found(format!("provider version mirror {id} not found")))
}

fn platform_with_mirror(
    conn: &Connection,
    id: &str,
) -> Result<(ProviderVersionMirror, ProviderPlatformMirror)> {
    let platform = platform_mirrors::get(conn, id)?
        .ok_or_else(|| Error::not_found(format!("provider platform mirror {id} not found")))?;
    let mirror = version_mirrors::get(conn, &platform.version_mirror_id)?.ok_or_else(|| {
        Error::internal(format!("version mirror of platform mirror {id} vanished"))
    })?;
    Ok((mirror, platform))
}

#[allow(clippy::too_many_arguments)]
fn mirrored_platforms(
    conn: &Connection,
    caller: &Caller,
    root_group: &str,
    hostname: &str,
    namespace: &str,
    provider_type: &str,
    semantic_version: &str,
) -> Result<(ProviderVersionMirror, Vec<ProviderPlatformMirror>)> {
    let address = ProviderAddress::new(hostname, namespace, provider_type)?;
    let version = parse_version(semantic_version)?.to_string();

    let group = access::root_group_by_path(conn, root_group)?;
    require_group_permission(conn, caller, &group.id, Permission::MIRROR_READ)?;

    let mirror = version_mirrors::get_by_address(conn, mirror_address(&group.id, &address), &version)?
        .ok_or_else(|| Error::not_found(format!("{address} {version} is not mirrored")))?;
    let platforms = platform_mirrors::list_by_version_mirror(conn, &mirror.id)?;
    Ok((mirror, platforms))
}

/// Maps an upstream failure to an error kind, logging the full context.
fn upstream_error(err: RegistryClientError, address: &ProviderAddress, version: &str) -> Error {
    tracing::warn!(
        "Upstream registry {} failed for {address} {version}: {err}",
        address.hostname
    );

    if err.is_not_found() {
        return Error::not_found(format!(
            "{address} {version} was not found on the upstream registry"
        ));
    }
    match err {
        RegistryClientError::Checksums(_)
        | RegistryClientError::Warnings(_)
        | RegistryClientError::NoVersions
        | RegistryClientError::Discovery { .. }
        | RegistryClientError::Decode { .. }
        | RegistryClientError::TooLarge { .. }
        | RegistryClientError::InvalidUrl(_) => {
            Error::invalid(format!("upstream registry error for {address} {version}: {err}"))
        }
        RegistryClientError::Http { .. } | RegistryClientError::Status { .. } => Error::upstream(
            format!("upstream registry request failed for {address} {version}: {err}"),
        ),
    }
}
