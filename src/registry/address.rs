use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hostname '{0}'")]
    Hostname(String),
    #[error("invalid provider {field} '{value}': {reason}")]
    ProviderPart {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl From<AddressError> for crate::error::Error {
    fn from(err: AddressError) -> Self {
        crate::error::Error::invalid(err.to_string())
    }
}

/// Normalizes a registry hostname for comparison: lowercase, no trailing
/// dot, and no explicit `:443`. Any other port is kept.
pub fn normalize_hostname(raw: &str) -> Result<String, AddressError> {
    let lowered = raw.trim().to_ascii_lowercase();
    let invalid = || AddressError::Hostname(raw.to_string());

    let (host, port) = match lowered.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (lowered.as_str(), None),
    };
    let host = host.strip_suffix('.').unwrap_or(host);

    if host.is_empty() || host.len() > 253 {
        return Err(invalid());
    }
    for label in host.split('.') {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(invalid());
        }
    }

    match port {
        None | Some("443") => Ok(host.to_string()),
        Some(port) => {
            let parsed: u16 = port.parse().map_err(|_| invalid())?;
            if parsed == 0 || port.starts_with('0') {
                return Err(invalid());
            }
            Ok(format!("{host}:{parsed}"))
        }
    }
}

/// Validates a provider namespace or type and returns its lowercase form.
/// Parts follow DNS label rules: letters, digits and dashes, with no leading,
/// trailing or doubled dash.
pub fn validate_provider_part(field: &'static str, raw: &str) -> Result<String, AddressError> {
    let err = |reason| AddressError::ProviderPart {
        field,
        value: raw.to_string(),
        reason,
    };

    if raw.is_empty() {
        return Err(err("must not be empty"));
    }
    if raw.len() > 64 {
        return Err(err("must be at most 64 characters"));
    }
    if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(err("may contain only letters, digits and dashes"));
    }
    if raw.starts_with('-') || raw.ends_with('-') {
        return Err(err("must not start or end with a dash"));
    }
    if raw.contains("--") {
        return Err(err("must not contain consecutive dashes"));
    }

    Ok(raw.to_ascii_lowercase())
}

/// A fully qualified upstream provider address, `hostname/namespace/type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderAddress {
    pub hostname: String,
    pub namespace: String,
    pub provider_type: String,
}

impl ProviderAddress {
    /// Validates each part on its own before combining them.
    pub fn new(hostname: &str, namespace: &str, provider_type: &str) -> Result<Self, AddressError> {
        let namespace = validate_provider_part("namespace", namespace)?;
        let provider_type = validate_provider_part("type", provider_type)?;
        let hostname = normalize_hostname(hostname)?;

        Ok(Self {
            hostname,
            namespace,
            provider_type,
        })
    }
}

impl fmt::Display for ProviderAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.hostname, self.namespace, self.provider_type)
    }
}

/// Release archive name, used both as the SHA256SUMS key and as the
/// `filename` reported to clients.
#[must_use]
pub fn canonical_filename(provider_type: &str, version: &str, os: &str, arch: &str) -> String {
    format!("terraform-provider-{provider_type}_{version}_{os}_{arch}.zip")
}
