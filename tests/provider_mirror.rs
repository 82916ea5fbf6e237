mod common;

use cairn::context::RequestContext;
use cairn::error::ErrorKind;
use cairn::services::{CreateProviderVersionMirrorInput, ProviderMirrorService};
use cairn::types::{ActivityAction, LimitName, ProviderVersionMirror};
use common::upstream::{FakeUpstream, UpstreamConfig};
use common::*;

const LINUX_DIGEST: &str = "e95953501c9452333db97c1fe109e989498680c38b3b747a923d63d8a63daa3c";

fn mirror_input(group: &str, hostname: &str, version: &str) -> CreateProviderVersionMirrorInput {
    CreateProviderVersionMirrorInput {
        group_path: group.to_string(),
        registry_hostname: hostname.to_string(),
        registry_namespace: "hashicorp".to_string(),
        provider_type: "example".to_string(),
        semantic_version: version.to_string(),
    }
}

async fn mirror(
    svc: &ProviderMirrorService,
    ctx: &RequestContext,
    upstream: &FakeUpstream,
) -> ProviderVersionMirror {
    svc.create_provider_version_mirror(ctx, mirror_input("acme", &upstream.hostname, "1.0.0"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_mirrors_require_root_group() {
    // The hostname never resolves; the group check must fail first.
    let env = TestEnv::new().await;
    let acme = env.group("acme", None).await;
    env.group("platform", Some(&acme)).await;

    let err = env
        .state
        .mirrors
        .create_provider_version_mirror(
            &admin_ctx(),
            mirror_input("acme/platform", "registry.invalid", "1.0.0"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(err.to_string().contains("root group"));
}

#[tokio::test]
async fn test_create_records_every_digest() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;

    let m = mirror(&env.state.mirrors, &admin_ctx(), &upstream).await;

    assert_eq!(m.registry_hostname, upstream.hostname);
    assert_eq!(m.semantic_version, "1.0.0");
    assert_eq!(m.digests.len(), 2);
    assert_eq!(
        hex::encode(m.digests["terraform-provider-example_1.0.0_linux_amd64.zip"]),
        LINUX_DIGEST
    );
    assert!(m.digests.contains_key("terraform-provider-example_1.0.0_darwin_arm64.zip"));
}

#[tokio::test]
async fn test_duplicate_mirror_conflicts() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();

    mirror(svc, &ctx, &upstream).await;
    let err = svc
        .create_provider_version_mirror(&ctx, mirror_input("acme", &upstream.hostname, "1.0.0"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_unlisted_version_is_invalid() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;

    let err = env
        .state
        .mirrors
        .create_provider_version_mirror(
            &admin_ctx(),
            mirror_input("acme", &upstream.hostname, "9.9.9"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test]
async fn test_malformed_input_is_invalid() {
    let env = TestEnv::new().await;
    env.group("acme", None).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();

    let mut input = mirror_input("acme", "registry.terraform.io", "1.0");
    let err = svc
        .create_provider_version_mirror(&ctx, input.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    input.semantic_version = "1.0.0".to_string();
    input.provider_type = "bad_type".to_string();
    let err = svc
        .create_provider_version_mirror(&ctx, input)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test]
async fn test_upstream_warnings_are_rejected() {
    let upstream = FakeUpstream::start(UpstreamConfig {
        warnings: vec!["this provider has moved".to_string()],
        ..UpstreamConfig::default()
    })
    .await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;

    let err = env
        .state
        .mirrors
        .create_provider_version_mirror(
            &admin_ctx(),
            mirror_input("acme", &upstream.hostname, "1.0.0"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test]
async fn test_untrusted_signature_is_rejected() {
    let upstream = FakeUpstream::start(UpstreamConfig {
        signing_keys: vec![SIGNER1.to_string(), SIGNER3.to_string()],
        ..UpstreamConfig::default()
    })
    .await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;

    let err = env
        .state
        .mirrors
        .create_provider_version_mirror(
            &admin_ctx(),
            mirror_input("acme", &upstream.hostname, "1.0.0"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(env
        .state
        .mirrors
        .list_provider_version_mirrors(&admin_ctx(), "acme")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unknown_upstream_provider_is_not_found() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;

    let mut input = mirror_input("acme", &upstream.hostname, "1.0.0");
    input.provider_type = "missing".to_string();
    let err = env
        .state
        .mirrors
        .create_provider_version_mirror(&admin_ctx(), input)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_checksum_mismatch_commits_nothing() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();
    let m = mirror(svc, &ctx, &upstream).await;

    // The darwin archive under the linux name.
    let mut body = DARWIN_ARM64_ZIP;
    let err = svc
        .upload_installation_package(&ctx, &m.id, "linux", "amd64", &mut body)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(err.to_string().contains("checksum mismatch"));

    assert!(svc
        .list_provider_platform_mirrors(&ctx, &m.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(env.stored_object_count(), 0);

    // The right bytes are still accepted afterwards.
    let mut body = LINUX_AMD64_ZIP;
    svc.upload_installation_package(&ctx, &m.id, "linux", "amd64", &mut body)
        .await
        .unwrap();
    assert_eq!(env.stored_object_count(), 1);
}

#[tokio::test]
async fn test_failed_object_write_records_no_platform_mirror() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_failing_objects().await;
    let acme = env.group("acme", None).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();
    let m = mirror(svc, &ctx, &upstream).await;

    let mut body = LINUX_AMD64_ZIP;
    let err = svc
        .upload_installation_package(&ctx, &m.id, "linux", "amd64", &mut body)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    assert!(svc
        .list_provider_platform_mirrors(&ctx, &m.id)
        .await
        .unwrap()
        .is_empty());
    assert!(
        env.activity(&acme)
            .await
            .iter()
            .all(|e| e.action != ActivityAction::Upload)
    );

    // No row was left behind to turn a retry into a conflict.
    let mut body = LINUX_AMD64_ZIP;
    let err = svc
        .upload_installation_package(&ctx, &m.id, "linux", "amd64", &mut body)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn test_platform_missing_from_manifest_is_invalid() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();
    let m = mirror(svc, &ctx, &upstream).await;

    let mut body = LINUX_AMD64_ZIP;
    let err = svc
        .upload_installation_package(&ctx, &m.id, "freebsd", "amd64", &mut body)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test]
async fn test_duplicate_package_upload_conflicts() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();
    let m = mirror(svc, &ctx, &upstream).await;

    let mut body = LINUX_AMD64_ZIP;
    svc.upload_installation_package(&ctx, &m.id, "linux", "amd64", &mut body)
        .await
        .unwrap();

    let mut body = LINUX_AMD64_ZIP;
    let err = svc
        .upload_installation_package(&ctx, &m.id, "linux", "amd64", &mut body)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(env.stored_object_count(), 1);
}

#[tokio::test]
async fn test_pull_fetches_and_verifies_upstream_package() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();
    let m = mirror(svc, &ctx, &upstream).await;

    let platform = svc
        .pull_installation_package(&ctx, &m.id, "darwin", "arm64")
        .await
        .unwrap();
    assert_eq!(platform.os, "darwin");
    assert_eq!(platform.architecture, "arm64");
    assert_eq!(platform.version_mirror_id, m.id);

    let err = svc
        .pull_installation_package(&ctx, &m.id, "darwin", "arm64")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_mirror_protocol_reads() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();
    let m = mirror(svc, &ctx, &upstream).await;
    let host = upstream.hostname.as_str();

    // A mirror with no packages is invisible.
    let err = svc
        .get_available_provider_versions(&ctx, "acme", host, "hashicorp", "example")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = svc
        .get_available_installation_packages(&ctx, "acme", host, "hashicorp", "example", "1.0.0")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut body = LINUX_AMD64_ZIP;
    let platform = svc
        .upload_installation_package(&ctx, &m.id, "linux", "amd64", &mut body)
        .await
        .unwrap();

    let versions = svc
        .get_available_provider_versions(&ctx, "acme", host, "HashiCorp", "example")
        .await
        .unwrap();
    assert_eq!(versions.versions.keys().collect::<Vec<_>>(), vec!["1.0.0"]);

    let archives = svc
        .get_available_installation_packages(&ctx, "acme", host, "hashicorp", "example", "1.0.0")
        .await
        .unwrap();
    assert_eq!(archives.archives.len(), 1);
    let archive = &archives.archives["linux_amd64"];
    assert_eq!(archive.hashes, vec![format!("zh:{LINUX_DIGEST}")]);
    assert!(archive
        .url
        .starts_with(&format!("{PUBLIC_BASE_URL}/v1/objects/mirror/providers/{}", platform.id)));

    let single = svc
        .get_installation_package(
            &ctx,
            "acme",
            host,
            "hashicorp",
            "example",
            "1.0.0",
            "linux",
            "amd64",
        )
        .await
        .unwrap();
    assert_eq!(single.hashes, archive.hashes);

    let err = svc
        .get_installation_package(
            &ctx,
            "acme",
            host,
            "hashicorp",
            "example",
            "1.0.0",
            "darwin",
            "arm64",
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_version_mirror_limit_rolls_back() {
    let upstream = FakeUpstream::start(UpstreamConfig {
        versions: vec!["1.0.0".to_string(), "1.1.0".to_string()],
        ..UpstreamConfig::default()
    })
    .await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;
    env.set_limit(LimitName::VersionMirrorsPerRootGroup, 1).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();

    mirror(svc, &ctx, &upstream).await;
    let err = svc
        .create_provider_version_mirror(&ctx, mirror_input("acme", &upstream.hostname, "1.1.0"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let mirrors = svc.list_provider_version_mirrors(&ctx, "acme").await.unwrap();
    assert_eq!(mirrors.len(), 1);
    assert_eq!(mirrors[0].semantic_version, "1.0.0");
}

#[tokio::test]
async fn test_platform_mirror_limit_rolls_back() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;
    env.set_limit(LimitName::PlatformMirrorsPerVersionMirror, 1).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();
    let m = mirror(svc, &ctx, &upstream).await;

    let mut body = LINUX_AMD64_ZIP;
    svc.upload_installation_package(&ctx, &m.id, "linux", "amd64", &mut body)
        .await
        .unwrap();

    let mut body = DARWIN_ARM64_ZIP;
    let err = svc
        .upload_installation_package(&ctx, &m.id, "darwin", "arm64", &mut body)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    assert_eq!(svc.list_provider_platform_mirrors(&ctx, &m.id).await.unwrap().len(), 1);
    assert_eq!(env.stored_object_count(), 1);
}

#[tokio::test]
async fn test_delete_with_platforms_requires_force() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();
    let m = mirror(svc, &ctx, &upstream).await;

    let mut body = LINUX_AMD64_ZIP;
    let platform = svc
        .upload_installation_package(&ctx, &m.id, "linux", "amd64", &mut body)
        .await
        .unwrap();

    let err = svc
        .delete_provider_version_mirror(&ctx, &m.id, false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    svc.delete_provider_version_mirror(&ctx, &m.id, true)
        .await
        .unwrap();
    let err = svc
        .get_provider_platform_mirror(&ctx, &platform.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    // Forced deletes leave packages behind.
    assert_eq!(env.stored_object_count(), 1);
}

#[tokio::test]
async fn test_delete_platform_mirror_removes_package() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    env.group("acme", None).await;
    let svc = &env.state.mirrors;
    let ctx = admin_ctx();
    let m = mirror(svc, &ctx, &upstream).await;

    let mut body = LINUX_AMD64_ZIP;
    let platform = svc
        .upload_installation_package(&ctx, &m.id, "linux", "amd64", &mut body)
        .await
        .unwrap();
    svc.delete_provider_platform_mirror(&ctx, &platform.id)
        .await
        .unwrap();
    assert_eq!(env.stored_object_count(), 0);

    svc.delete_provider_version_mirror(&ctx, &m.id, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mirror_permissions() {
    let upstream = FakeUpstream::start(UpstreamConfig::default()).await;
    let env = TestEnv::with_http_upstream().await;
    let acme = env.group("acme", None).await;
    let svc = &env.state.mirrors;

    let reader = env.user("reader", false).await;
    env.grant(&reader, &acme, &["mirror:read"]).await;
    let writer = env.user("writer", false).await;
    env.grant(&writer, &acme, &["mirror:write"]).await;

    let err = svc
        .create_provider_version_mirror(
            &ctx_for(&reader),
            mirror_input("acme", &upstream.hostname, "1.0.0"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let m = mirror(svc, &ctx_for(&writer), &upstream).await;
    assert_eq!(m.created_by, "writer");

    svc.get_provider_version_mirror_by_id(&ctx_for(&reader), &m.id)
        .await
        .unwrap();

    let err = svc
        .get_provider_version_mirror_by_id(&RequestContext::anonymous(), &m.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}
