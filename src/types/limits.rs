use std::fmt;

use serde::{Deserialize, Serialize};

/// Named resource classes with a platform-wide ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitName {
    ProvidersPerGroup,
    VersionsPerProvider,
    PlatformsPerProviderVersion,
    VersionMirrorsPerRootGroup,
    PlatformMirrorsPerVersionMirror,
    GpgKeysPerGroup,
}

impl LimitName {
    pub const ALL: [LimitName; 6] = [
        LimitName::ProvidersPerGroup,
        LimitName::VersionsPerProvider,
        LimitName::PlatformsPerProviderVersion,
        LimitName::VersionMirrorsPerRootGroup,
        LimitName::PlatformMirrorsPerVersionMirror,
        LimitName::GpgKeysPerGroup,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LimitName::ProvidersPerGroup => "providers_per_group",
            LimitName::VersionsPerProvider => "versions_per_provider",
            LimitName::PlatformsPerProviderVersion => "platforms_per_provider_version",
            LimitName::VersionMirrorsPerRootGroup => "version_mirrors_per_root_group",
            LimitName::PlatformMirrorsPerVersionMirror => "platform_mirrors_per_version_mirror",
            LimitName::GpgKeysPerGroup => "gpg_keys_per_group",
        }
    }

    pub fn parse(s: &str) -> Option<LimitName> {
        Self::ALL.into_iter().find(|name| name.as_str() == s)
    }

    /// Ceiling used when neither the database nor the config sets one.
    #[must_use]
    pub const fn default_value(self) -> i64 {
        match self {
            LimitName::ProvidersPerGroup => 1000,
            LimitName::VersionsPerProvider => 1000,
            LimitName::PlatformsPerProviderVersion => 50,
            LimitName::VersionMirrorsPerRootGroup => 5000,
            LimitName::PlatformMirrorsPerVersionMirror => 50,
            LimitName::GpgKeysPerGroup => 100,
        }
    }
}

impl fmt::Display for LimitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
