use std::fmt;

use serde::{Deserialize, Serialize};

/// Permission represents a bitmask of granted permissions on a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u32);

impl Permission {
    pub const PROVIDER_READ: Permission = Permission(1 << 0); // 1
    pub const PROVIDER_WRITE: Permission = Permission(1 << 1); // 2
    pub const MIRROR_READ: Permission = Permission(1 << 2); // 4
    pub const MIRROR_WRITE: Permission = Permission(1 << 3); // 8
    pub const GPG_KEY_READ: Permission = Permission(1 << 4); // 16
    pub const GPG_KEY_WRITE: Permission = Permission(1 << 5); // 32
    pub const GROUP_ADMIN: Permission = Permission(1 << 6); // 64

    const ALL: Permission = Permission((1 << 7) - 1);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if this permission bitmask contains the required permission.
    #[must_use]
    pub const fn has(self, required: Permission) -> bool {
        self.0 & required.0 == required.0
    }

    /// Combines two permission bitmasks.
    #[must_use]
    pub const fn union(self, other: Permission) -> Permission {
        Permission(self.0 | other.0)
    }

    /// Removes permissions from this bitmask.
    #[must_use]
    pub const fn difference(self, other: Permission) -> Permission {
        Permission(self.0 & !other.0)
    }

    /// Expands a permission bitmask to include implied permissions.
    /// group:admin implies everything, and write implies read for each resource.
    /// This should only be used for ALLOW permissions, never for DENY.
    #[must_use]
    pub fn expand_implied(self) -> Permission {
        if self.has(Self::GROUP_ADMIN) {
            return Self::ALL;
        }

        let mut result = self.0;
        for (write, read) in [
            (Self::PROVIDER_WRITE, Self::PROVIDER_READ),
            (Self::MIRROR_WRITE, Self::MIRROR_READ),
            (Self::GPG_KEY_WRITE, Self::GPG_KEY_READ),
        ] {
            if self.has(write) {
                result |= read.0;
            }
        }

        Permission(result)
    }

    /// Converts a permission string to its bitmask value.
    pub fn parse(s: &str) -> Option<Permission> {
        match s {
            "provider:read" => Some(Self::PROVIDER_READ),
            "provider:write" => Some(Self::PROVIDER_WRITE),
            "mirror:read" => Some(Self::MIRROR_READ),
            "mirror:write" => Some(Self::MIRROR_WRITE),
            "gpg_key:read" => Some(Self::GPG_KEY_READ),
            "gpg_key:write" => Some(Self::GPG_KEY_WRITE),
            "group:admin" => Some(Self::GROUP_ADMIN),
            _ => None,
        }
    }

    /// Converts a slice of permission strings to a combined bitmask.
    pub fn parse_many(strs: &[&str]) -> Option<Permission> {
        let mut result = Permission::default();
        for s in strs {
            result = result.union(Self::parse(s)?);
        }
        Some(result)
    }

    /// Returns a slice of permission strings for this bitmask.
    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        [
            (Self::PROVIDER_READ, "provider:read"),
            (Self::PROVIDER_WRITE, "provider:write"),
            (Self::MIRROR_READ, "mirror:read"),
            (Self::MIRROR_WRITE, "mirror:write"),
            (Self::GPG_KEY_READ, "gpg_key:read"),
            (Self::GPG_KEY_WRITE, "gpg_key:write"),
            (Self::GROUP_ADMIN, "group:admin"),
        ]
        .into_iter()
        .filter(|(p, _)| self.has(*p))
        .map(|(_, name)| name)
        .collect()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strings().join(", "))
    }
}

impl From<u32> for Permission {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<i64> for Permission {
    fn from(bits: i64) -> Self {
        Self(bits as u32)
    }
}

impl From<Permission> for i64 {
    fn from(p: Permission) -> Self {
        p.0 as i64
    }
}
