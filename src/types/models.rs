use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LimitName, Permission};
use crate::verify::Checksums;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub full_path: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub id: String,
    pub name: String,
    pub group_id: String,
    /// Group path plus name, e.g. `acme/platform/ci`.
    pub resource_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Permissions granted to a user or service account on a group and,
/// by inheritance, on every group below it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupGrant {
    pub subject_id: String,
    pub group_id: String,
    pub allow_bits: Permission,
    pub deny_bits: Permission,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub group_id: String,
    /// Top-level ancestor of `group_id`, fixed at creation.
    pub root_group_id: String,
    pub private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderVersion {
    pub id: String,
    pub provider_id: String,
    pub semantic_version: String,
    pub protocols: Vec<String>,
    pub latest: bool,
    pub readme_uploaded: bool,
    pub sha_sums_uploaded: bool,
    pub sha_sums_sig_uploaded: bool,
    /// Snapshot of the trusted key that signed SHA256SUMS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpg_key_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpg_ascii_armor: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPlatform {
    pub id: String,
    pub provider_version_id: String,
    pub os: String,
    pub architecture: String,
    pub sha_sum: String,
    pub filename: String,
    pub binary_uploaded: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderVersionMirror {
    pub id: String,
    /// Always a root group.
    pub group_id: String,
    pub registry_hostname: String,
    pub registry_namespace: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub semantic_version: String,
    #[serde(with = "crate::verify::hex_checksums")]
    pub digests: Checksums,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPlatformMirror {
    pub id: String,
    pub version_mirror_id: String,
    pub os: String,
    pub architecture: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpgKey {
    pub id: String,
    pub group_id: String,
    pub gpg_key_id: u64,
    pub fingerprint: String,
    pub ascii_armor: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimit {
    pub name: LimitName,
    pub value: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Create,
    Update,
    Delete,
    Upload,
}

impl ActivityAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ActivityAction::Create => "create",
            ActivityAction::Update => "update",
            ActivityAction::Delete => "delete",
            ActivityAction::Upload => "upload",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ActivityAction::Create),
            "update" => Some(ActivityAction::Update),
            "delete" => Some(ActivityAction::Delete),
            "upload" => Some(ActivityAction::Upload),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTarget {
    Provider,
    ProviderVersion,
    ProviderPlatform,
    ProviderVersionMirror,
    ProviderPlatformMirror,
    GpgKey,
}

impl ActivityTarget {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ActivityTarget::Provider => "provider",
            ActivityTarget::ProviderVersion => "provider_version",
            ActivityTarget::ProviderPlatform => "provider_platform",
            ActivityTarget::ProviderVersionMirror => "provider_version_mirror",
            ActivityTarget::ProviderPlatformMirror => "provider_platform_mirror",
            ActivityTarget::GpgKey => "gpg_key",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provider" => Some(ActivityTarget::Provider),
            "provider_version" => Some(ActivityTarget::ProviderVersion),
            "provider_platform" => Some(ActivityTarget::ProviderPlatform),
            "provider_version_mirror" => Some(ActivityTarget::ProviderVersionMirror),
            "provider_platform_mirror" => Some(ActivityTarget::ProviderPlatformMirror),
            "gpg_key" => Some(ActivityTarget::GpgKey),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    pub action: ActivityAction,
    pub target_type: ActivityTarget,
    pub target_id: String,
    /// Group the target lives in, for namespace-scoped event queries.
    pub group_id: String,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
