//! Wire types. The registry protocol shapes are both consumed from upstream
//! registries and served for locally hosted providers; the mirror protocol
//! shapes are only served.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Service key for the provider registry in `/.well-known/terraform.json`.
pub const PROVIDERS_SERVICE: &str = "providers.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsResponse {
    pub versions: Vec<VersionEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<PlatformEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEntry {
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageResponse {
    #[serde(default)]
    pub protocols: Vec<String>,
    pub os: String,
    pub arch: String,
    pub filename: String,
    pub download_url: String,
    pub shasums_url: String,
    pub shasums_signature_url: String,
    pub shasum: String,
    pub signing_keys: SigningKeys,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningKeys {
    #[serde(default)]
    pub gpg_public_keys: Vec<GpgPublicKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpgPublicKey {
    #[serde(default)]
    pub key_id: String,
    pub ascii_armor: String,
}

/// Provider Network Mirror Protocol: `index.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorVersionsResponse {
    pub versions: BTreeMap<String, MirrorVersion>,
}

/// Carries no fields; the protocol reserves the object for future use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorVersion {}

/// Provider Network Mirror Protocol: `<version>.json`, keyed by `<os>_<arch>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorArchivesResponse {
    pub archives: BTreeMap<String, MirrorArchive>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorArchive {
    pub url: String,
    /// Each entry is `zh:<hex sha256>`.
    pub hashes: Vec<String>,
}
