use std::cmp::Ordering;

use semver::Version;

use crate::error::{Error, Result};

/// Parses a provider version strictly (`MAJOR.MINOR.PATCH[-pre][+build]`).
pub fn parse_version(raw: &str) -> Result<Version> {
    Version::parse(raw.trim())
        .map_err(|e| Error::invalid(format!("invalid semantic version '{raw}': {e}")))
}

/// Semantic version precedence: core numbers first, then pre-release, where a
/// release outranks any pre-release of the same core. Build metadata is ignored.
#[must_use]
pub fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// Returns true when `candidate` should replace `current` as the latest version.
#[must_use]
pub fn supersedes(candidate: &Version, current: &Version) -> bool {
    cmp_precedence(candidate, current) == Ordering::Greater
}

/// Picks the highest version by precedence. Ties keep the first seen.
pub fn highest<'a, T>(items: impl IntoIterator<Item = (&'a Version, T)>) -> Option<T> {
    let mut best: Option<(&Version, T)> = None;
    for (version, item) in items {
        let replace = match &best {
            Some((current, _)) => supersedes(version, current),
            None => true,
        };
        if replace {
            best = Some((version, item));
        }
    }
    best.map(|(_, item)| item)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    #[test]
    fn test_release_beats_prerelease_of_same_core() {
        assert!(supersedes(&v("1.0.0"), &v("1.0.0-pre")));
        assert!(!supersedes(&v("1.0.0-pre"), &v("1.0.0")));
    }

    #[test]
    fn test_lower_core_release_does_not_beat_prerelease() {
        assert!(!supersedes(&v("0.1.0"), &v("1.0.0-pre")));
        assert!(!supersedes(&v("0.9.0"), &v("1.0.0-pre")));
    }

    #[test]
    fn test_prerelease_identifiers_ordering() {
        assert!(supersedes(&v("1.0.0-beta"), &v("1.0.0-alpha")));
        assert!(supersedes(&v("1.0.0-alpha.10"), &v("1.0.0-alpha.2")));
        assert!(supersedes(&v("1.0.0-alpha.1"), &v("1.0.0-alpha")));
    }

    #[test]
    fn test_build_metadata_ignored() {
        assert_eq!(cmp_precedence(&v("1.0.0+a"), &v("1.0.0+b")), Ordering::Equal);
        assert!(!supersedes(&v("1.0.0+b"), &v("1.0.0+a")));
    }

    #[test]
    fn test_highest() {
        let versions = [v("1.0.0-pre"), v("0.9.0"), v("0.10.0")];
        let picked = highest(versions.iter().map(|ver| (ver, ver.to_string())));
        assert_eq!(picked.as_deref(), Some("1.0.0-pre"));

        let empty: Vec<Version> = Vec::new();
        assert_eq!(highest(empty.iter().map(|ver| (ver, ()))), None);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_version("1.0").is_err());
        assert!(parse_version("v1.0.0").is_err());
        assert!(parse_version("1.0.0-").is_err());
        assert!(parse_version(" 1.2.3 ").is_ok());
    }
}
