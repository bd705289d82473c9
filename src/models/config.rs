use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token clients must present to this gateway. Empty disables auth.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,

    /// Credential injected upstream when the client brings none.
    #[serde(default)]
    pub upstream_api_key: Option<String>,

    /// Substring matched against the target host to decide whether the
    /// identity normalizer runs.
    #[serde(default = "default_identity_host")]
    pub identity_host: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bind 0.0.0.0 instead of loopback.
    #[serde(default)]
    pub allow_lan_access: bool,

    #[serde(default)]
    pub upstream_proxy: UpstreamProxyConfig,
}

fn default_port() -> u16 {
    8082
}

fn default_upstream_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_identity_host() -> String {
    "api.anthropic.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            api_key: String::new(),
            upstream_base_url: default_upstream_base_url(),
            upstream_api_key: None,
            identity_host: default_identity_host(),
            request_timeout_secs: default_request_timeout_secs(),
            allow_lan_access: false,
            upstream_proxy: UpstreamProxyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpstreamProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
}
