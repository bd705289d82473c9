pub mod constants;
pub mod error;
mod models;
mod modules;
mod proxy;
#[cfg(test)]
mod test_utils;
mod utils;

use modules::system::logger;
use tracing::{error, info, warn};

fn apply_env_overrides(config: &mut crate::models::AppConfig) {
    if let Ok(key) = std::env::var("API_KEY") {
        if !key.trim().is_empty() {
            info!("Using inbound API key from environment");
            config.proxy.api_key = key;
        }
    }

    if let Ok(port) = std::env::var("PORT") {
        let trimmed = port.trim();
        if !trimmed.is_empty() {
            match trimmed.parse::<u16>() {
                Ok(p) if p > 0 => {
                    config.proxy.port = p;
                    info!("Using proxy port from environment: {}", p);
                }
                _ => warn!("[W-PORT-INVALID] ignoring_invalid_port_value: {}", port),
            }
        }
    }

    if let Ok(base) = std::env::var("UPSTREAM_BASE_URL") {
        if !base.trim().is_empty() {
            info!("Using upstream base URL from environment");
            config.proxy.upstream_base_url = base.trim().to_string();
        }
    }

    if let Ok(key) = std::env::var("UPSTREAM_API_KEY") {
        if !key.trim().is_empty() {
            info!("Using upstream API key from environment");
            config.proxy.upstream_api_key = Some(key);
        }
    }
}

async fn start_runtime() -> Result<proxy::server::ServerHandle, String> {
    let mut config = modules::system::config::load_app_config()
        .map_err(|e| format!("failed_to_load_config: {}", e))?;

    apply_env_overrides(&mut config);
    modules::system::validation::validate_app_config(&config)
        .map_err(|errors| format!("configuration_validation_failed:\n{}", errors.join("\n")))?;

    info!("Starting gateway on port {}", config.proxy.port);

    proxy::server::start(config.proxy)
        .await
        .map_err(|e| format!("failed_to_start_gateway: {}", e))
}

pub fn run() {
    logger::init_logger();

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    runtime.block_on(async {
        let handle = match start_runtime().await {
            Ok(handle) => handle,
            Err(e) => {
                error!("[E-RUNTIME-STARTUP] {}", e);
                std::process::exit(1);
            }
        };

        info!("Gateway is running. Press Ctrl+C to exit.");
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down gateway");
        handle.shutdown();
    });
}

#[cfg(test)]
mod tests {
    use super::apply_env_overrides;
    use crate::models::AppConfig;
    use crate::test_utils::ScopedEnvVar;
    use std::sync::{Mutex, OnceLock};

    static LIB_TEST_ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    #[test]
    fn env_port_overrides_config_port() {
        let _guard = LIB_TEST_ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("lib env test lock");
        let _port = ScopedEnvVar::set("PORT", "8045");

        let mut config = AppConfig::default();
        config.proxy.port = 8145;
        apply_env_overrides(&mut config);

        assert_eq!(config.proxy.port, 8045);
    }

    #[test]
    fn invalid_env_port_is_ignored() {
        let _guard = LIB_TEST_ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("lib env test lock");
        let _port = ScopedEnvVar::set("PORT", "not-a-port");

        let mut config = AppConfig::default();
        config.proxy.port = 8145;
        apply_env_overrides(&mut config);

        assert_eq!(config.proxy.port, 8145);
    }

    #[test]
    fn env_upstream_base_url_is_trimmed() {
        let _guard = LIB_TEST_ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("lib env test lock");
        let _base = ScopedEnvVar::set("UPSTREAM_BASE_URL", " https://relay.example.com ");

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config);

        assert_eq!(config.proxy.upstream_base_url, "https://relay.example.com");
    }
}
