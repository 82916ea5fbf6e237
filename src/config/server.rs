use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::RngCore;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::LimitName;

const SIGNING_SECRET_FILE: &str = ".object_signing_secret";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public base URL for external access (e.g., "https://registry.example.com").
    /// Presigned object URLs are built on it. Defaults to `http://<host>:<port>`.
    pub public_base_url: Option<String>,
    /// Secret for presigned object URLs. Generated and kept in the data
    /// directory when unset.
    pub signing_secret: Option<String>,
    pub presigned_url_ttl_secs: u64,
    /// Seeded into `resource_limits` on initialize; existing rows win.
    pub limits: HashMap<LimitName, i64>,
    /// Bearer tokens for upstream registries, keyed by hostname.
    pub upstream_tokens: HashMap<String, String>,
    /// Scheme used for upstream service discovery.
    pub discovery_scheme: String,
    pub upstream_timeout_secs: u64,
}

/// Values given on the command line. Each one that is set replaces the
/// value from the config file.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub public_base_url: Option<String>,
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Loads the optional config file and applies command line overrides.
    pub fn load(path: Option<&Path>, overrides: ServerOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: ServerOverrides) {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.data_dir = data_dir;
        }
        if overrides.public_base_url.is_some() {
            self.public_base_url = overrides.public_base_url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.presigned_url_ttl_secs == 0 {
            return Err(Error::Config(
                "presigned_url_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if !matches!(self.discovery_scheme.as_str(), "http" | "https") {
            return Err(Error::Config(format!(
                "discovery_scheme must be http or https, got '{}'",
                self.discovery_scheme
            )));
        }
        if let Some((name, value)) = self.limits.iter().find(|(_, value)| **value < 0) {
            return Err(Error::Config(format!("limit {name} must not be negative, got {value}")));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("cairn.db")
    }

    #[must_use]
    pub fn admin_token_path(&self) -> PathBuf {
        self.data_dir.join(".admin_token")
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    #[must_use]
    pub fn presigned_url_ttl(&self) -> Duration {
        Duration::from_secs(self.presigned_url_ttl_secs)
    }

    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Returns the configured signing secret, or the one stored in the data
    /// directory, creating it on first use.
    pub fn resolve_signing_secret(&self) -> Result<String> {
        if let Some(secret) = &self.signing_secret {
            return Ok(secret.clone());
        }

        let path = self.data_dir.join(SIGNING_SECRET_FILE);
        match fs::read_to_string(&path) {
            Ok(secret) if !secret.trim().is_empty() => return Ok(secret.trim().to_string()),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = hex::encode(bytes);

        fs::create_dir_all(&self.data_dir)?;
        fs::write(&path, &secret)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&path, fs::Permissions::from_mode(0o600)) {
                tracing::warn!("Failed to set permissions on {}: {e}", path.display());
            }
        }
        tracing::info!("Generated object signing secret at {}", path.display());
        Ok(secret)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
            signing_secret: None,
            presigned_url_ttl_secs: 900,
            limits: HashMap::new(),
            upstream_tokens: HashMap::new(),
            discovery_scheme: "https".to_string(),
            upstream_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_with_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            port = 9090
            public_base_url = "https://registry.example.com/"

            [limits]
            gpg_keys_per_group = 5

            [upstream_tokens]
            "registry.example.com" = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.base_url(), "https://registry.example.com");
        assert_eq!(config.limits.get(&LimitName::GpgKeysPerGroup), Some(&5));
        assert_eq!(config.upstream_tokens["registry.example.com"], "secret");
        assert_eq!(config.presigned_url_ttl(), Duration::from_secs(900));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(ServerConfig::from_toml("prot = 1").is_err());
        assert!(ServerConfig::from_toml("[limits]\nrepos_per_group = 1").is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let mut config = ServerConfig::from_toml("host = \"0.0.0.0\"\nport = 9090").unwrap();
        config.apply(ServerOverrides {
            port: Some(7000),
            ..Default::default()
        });
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7000);
        assert_eq!(config.base_url(), "http://0.0.0.0:7000");
    }

    #[test]
    fn test_validate() {
        let config = ServerConfig {
            discovery_scheme: "ftp".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ServerConfig {
            presigned_url_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_signing_secret_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let first = config.resolve_signing_secret().unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(config.resolve_signing_secret().unwrap(), first);

        let configured = ServerConfig {
            signing_secret: Some("fixed".to_string()),
            ..config
        };
        assert_eq!(configured.resolve_signing_secret().unwrap(), "fixed");
    }
}
