use serde::Deserialize;

/// Settings for the status binary itself. Resolver settings live in
/// [`cdn_resolver::ResolverConfig`] under the `CDN_` prefix.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path of the JSON resource manifest
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Resolve without touching the network: every CDN is reported down
    #[serde(default)]
    pub offline: bool,
}

fn default_manifest_path() -> String {
    "assets.json".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl AppConfig {
    /// Load from `ASSET_STATUS_*` environment variables
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("ASSET_STATUS_").from_env()
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}
