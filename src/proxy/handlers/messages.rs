use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Uri},
    response::Response,
};
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::proxy::handlers::errors::bad_gateway_response;
use crate::proxy::handlers::retry::{execute_with_cleanup, CleanupMetadata};
use crate::proxy::handlers::streaming::into_client_response;
use crate::proxy::state::AppState;

fn generate_trace_id() -> String {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

fn join_base_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Swaps the gateway credential for the upstream one when configured;
/// otherwise the client's own credential travels upstream untouched.
fn apply_upstream_credentials(headers: &mut HeaderMap, upstream_api_key: Option<&str>) {
    let Some(key) = upstream_api_key else {
        return;
    };
    if key.trim().is_empty() {
        return;
    }
    headers.remove("x-api-key");
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key)) {
        headers.insert(header::AUTHORIZATION, value);
    }
}

fn attach_metadata_headers(response: &mut Response, metadata: &CleanupMetadata) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(metadata.outcome.as_str()) {
        headers.insert("x-trestle-outcome", value);
    }
    if let Ok(value) = HeaderValue::from_str(&metadata.retry_count.to_string()) {
        headers.insert("x-trestle-retry-count", value);
    }
    if !metadata.proactive_removed_ids.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&metadata.proactive_removed_ids.join(",")) {
            headers.insert("x-trestle-removed-ids", value);
        }
    }
}

/// POST /v1/messages. Message-bearing requests run the full cleanup and
/// identity pipeline; anything unparseable is dispatched once, untouched.
pub async fn handle_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = generate_trace_id();
    let target_url = join_base_url(&state.config.upstream_base_url, "/v1/messages");

    let mut outbound_headers = headers.clone();
    apply_upstream_credentials(
        &mut outbound_headers,
        state.config.upstream_api_key.as_deref(),
    );

    let parsed = match serde_json::from_slice::<Value>(&body) {
        Ok(value) if value.is_object() && value.get("messages").is_some() => value,
        _ => {
            debug!(
                "[{}] Body is not a message-bearing object, dispatching directly",
                trace_id
            );
            return dispatch_direct(
                &state,
                &trace_id,
                Method::POST,
                &target_url,
                outbound_headers,
                body,
            )
            .await;
        }
    };
    match execute_with_cleanup(
        &state.upstream,
        &target_url,
        &state.config.identity_host,
        &trace_id,
        outbound_headers,
        parsed,
    )
    .await
    {
        Ok((reply, metadata)) => {
            info!(
                "[{}] Upstream {} | outcome={} retries={} proactive={:?} reactive={:?}",
                trace_id,
                reply.status(),
                metadata.outcome.as_str(),
                metadata.retry_count,
                metadata.proactive_removed_ids,
                metadata.removed_tool_use_ids,
            );
            let mut response = into_client_response(reply);
            attach_metadata_headers(&mut response, &metadata);
            response
        }
        Err(e) => {
            warn!("[{}] Upstream request failed: {}", trace_id, e);
            bad_gateway_response(format!("Upstream request failed: {}", e))
        }
    }
}

/// Transparent fallback for every other /v1 path: one dispatch, no
/// sanitization, response surfaced as-is.
pub async fn handle_passthrough(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = generate_trace_id();
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let target_url = join_base_url(&state.config.upstream_base_url, path);

    let mut outbound_headers = headers.clone();
    apply_upstream_credentials(
        &mut outbound_headers,
        state.config.upstream_api_key.as_deref(),
    );

    dispatch_direct(&state, &trace_id, method, &target_url, outbound_headers, body).await
}

async fn dispatch_direct(
    state: &AppState,
    trace_id: &str,
    method: Method,
    target_url: &str,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload = if body.is_empty() { None } else { Some(body) };
    match state
        .upstream
        .send(method, target_url, &headers, payload)
        .await
    {
        Ok(resp) => {
            debug!("[{}] Direct dispatch -> {}", trace_id, resp.status());
            into_client_response(crate::proxy::handlers::streaming::UpstreamReply::Passthrough(
                resp,
            ))
        }
        Err(e) => {
            warn!("[{}] Direct dispatch failed: {}", trace_id, e);
            bad_gateway_response(format!("Upstream request failed: {}", e))
        }
    }
}
