use serde::Deserialize;

fn default_private() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateProviderRequest {
    pub group_path: String,
    pub name: String,
    #[serde(default = "default_private")]
    pub private: bool,
    #[serde(default)]
    pub repository_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProviderRequest {
    #[serde(default)]
    pub private: Option<bool>,
    /// An empty string clears the URL.
    #[serde(default)]
    pub repository_url: Option<String>,
}

/// Either `group` (list a group's providers) or `ids` (comma separated).
#[derive(Debug, Default, Deserialize)]
pub struct ListProvidersQuery {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub ids: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProviderVersionRequest {
    pub version: String,
    #[serde(default)]
    pub protocols: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProviderPlatformRequest {
    pub os: String,
    pub arch: String,
    pub shasum: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGpgKeyRequest {
    pub group_path: String,
    pub ascii_armor: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupQuery {
    pub group: String,
    #[serde(default)]
    pub include_inherited: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateVersionMirrorRequest {
    pub group_path: String,
    pub hostname: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub version: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}
