use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::models::ProxyConfig;
use crate::proxy::routes::build_router;
use crate::proxy::state::AppState;
use crate::proxy::upstream::client::UpstreamClient;

pub struct ServerHandle {
    join: tokio::task::JoinHandle<()>,
    pub port: u16,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        self.join.abort();
    }
}

pub async fn start(config: ProxyConfig) -> Result<ServerHandle, String> {
    let upstream = UpstreamClient::new(
        Some(&config.upstream_proxy),
        config.request_timeout_secs,
    )?;

    let bind_host = if config.allow_lan_access {
        warn!("[W-LAN-ACCESS-ENABLED] lan_access_enabled_bind_address_0_0_0_0");
        "0.0.0.0"
    } else {
        "127.0.0.1"
    };
    let addr = format!("{}:{}", bind_host, config.port);

    let state = AppState::new(config, upstream);
    let router = build_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("failed_to_bind {}: {}", addr, e))?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("failed_to_read_local_addr: {}", e))?
        .port();

    info!("Gateway listening on {}:{}", bind_host, port);
    let join = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            warn!("[W-SERVER-EXIT] server_stopped_unexpectedly: {}", e);
        }
    });

    Ok(ServerHandle { join, port })
}
