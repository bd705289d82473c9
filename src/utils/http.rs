use reqwest::Client;
use tokio::time::Duration;

use crate::models::UpstreamProxyConfig;

/// Builds the outbound client. Automatic decompression is disabled so
/// response bodies pass through byte-for-byte.
pub fn build_upstream_client(
    proxy: Option<&UpstreamProxyConfig>,
    timeout_secs: u64,
) -> Result<Client, String> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(20))
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .no_gzip()
        .no_brotli()
        .no_deflate()
        .timeout(Duration::from_secs(timeout_secs.max(5)));

    if let Some(config) = proxy {
        if config.enabled && !config.url.is_empty() {
            let proxy = reqwest::Proxy::all(&config.url)
                .map_err(|e| format!("Invalid upstream proxy url: {}", e))?;
            builder = builder.proxy(proxy);
        }
    }

    builder
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_without_proxy() {
        assert!(build_upstream_client(None, 600).is_ok());
    }

    #[test]
    fn rejects_invalid_proxy_url() {
        let proxy = UpstreamProxyConfig {
            enabled: true,
            url: "::not-a-url::".to_string(),
        };
        assert!(build_upstream_client(Some(&proxy), 600).is_err());
    }

    #[test]
    fn disabled_proxy_is_ignored() {
        let proxy = UpstreamProxyConfig {
            enabled: false,
            url: "::not-a-url::".to_string(),
        };
        assert!(build_upstream_client(Some(&proxy), 600).is_ok());
    }
}
