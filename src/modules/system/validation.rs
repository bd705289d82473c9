use crate::models::AppConfig;

pub fn validate_app_config(config: &AppConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.proxy.port == 0 {
        errors.push("proxy.port: must be non-zero".to_string());
    }

    let base = config.proxy.upstream_base_url.trim();
    if base.is_empty() {
        errors.push("proxy.upstream_base_url: must not be empty".to_string());
    } else if url::Url::parse(base).is_err() {
        errors.push(format!(
            "proxy.upstream_base_url: not a valid URL (got: {})",
            base
        ));
    }

    if config.proxy.identity_host.trim().is_empty() {
        errors.push("proxy.identity_host: must not be empty".to_string());
    }

    if config.proxy.upstream_proxy.enabled && config.proxy.upstream_proxy.url.trim().is_empty() {
        errors.push("proxy.upstream_proxy.url: required when upstream_proxy is enabled".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
