use axum::http::{header, HeaderMap};
use serde_json::{json, Map, Value};

use crate::proxy::identity::catalog::{
    self, BILLING_SENTINEL, FULL_INSTRUCTIONS_MIN_LEN, IDENTITY_PREFIX,
};
use crate::proxy::identity::header_policy::{
    apply_cli_headers, is_cli_request, merge_beta_flags, normalize_authorization, ANTHROPIC_BETA,
};
use crate::proxy::identity::rules::{match_rule, ModelRule};

/// Rewrites headers and body so the request is indistinguishable from a
/// first-party CLI session. Applies only when the target host matches the
/// identity-sensitive substring and the body matches a model rule; returns
/// whether it ran. Safe to re-apply: a normalized request is a fixed point.
pub fn normalize_request(
    target_url: &str,
    identity_host: &str,
    headers: &mut HeaderMap,
    body: &mut Value,
) -> bool {
    if !targets_identity_host(target_url, identity_host) {
        return false;
    }
    if !body.is_object() {
        return false;
    }
    let Some(model) = body
        .get("model")
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
    else {
        return false;
    };
    let Some(rule) = match_rule(&model) else {
        tracing::debug!("No identity rule for model {}, passing through", model);
        return false;
    };

    // Captured before the beta merge injects the CLI-exclusive flag.
    let is_cli = is_cli_request(headers, body);

    apply_beta_merge(headers, rule);
    apply_thinking(body, rule);
    if rule.remove_temperature {
        if let Some(obj) = body.as_object_mut() {
            obj.remove("temperature");
        }
    }
    apply_cli_headers(headers, is_cli);
    normalize_authorization(headers);
    enforce_body_shape(body, rule, is_cli);
    apply_default_fields(body);
    headers.remove(header::CONTENT_LENGTH);

    tracing::debug!(
        "Identity normalization applied (model={}, cli_caller={})",
        model,
        is_cli
    );
    true
}

fn targets_identity_host(target_url: &str, identity_host: &str) -> bool {
    let Ok(parsed) = url::Url::parse(target_url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    host.to_lowercase().contains(&identity_host.to_lowercase())
}

fn apply_beta_merge(headers: &mut HeaderMap, rule: &ModelRule) {
    let existing = headers
        .get(ANTHROPIC_BETA)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let merged = merge_beta_flags(existing.as_deref(), rule.required_beta_flags);
    if let Ok(value) = axum::http::HeaderValue::from_str(&merged) {
        headers.insert(ANTHROPIC_BETA, value);
    }
}

fn apply_thinking(body: &mut Value, rule: &ModelRule) {
    let Some(obj) = body.as_object_mut() else {
        return;
    };
    match rule.thinking.config() {
        Some(config) => {
            obj.insert("thinking".to_string(), config);
        }
        None => {
            obj.remove("thinking");
        }
    }
}

/// Normalizes `body.system` into block-array form.
fn system_to_array(system: Option<&Value>) -> Vec<Value> {
    match system {
        Some(Value::Array(blocks)) => blocks.clone(),
        Some(Value::String(text)) if !text.is_empty() => {
            vec![json!({"type": "text", "text": text})]
        }
        Some(Value::Object(obj)) if obj.contains_key("type") => {
            vec![Value::Object(obj.clone())]
        }
        _ => Vec::new(),
    }
}

fn block_text(block: &Value) -> Option<&str> {
    block.get("text").and_then(|t| t.as_str())
}

fn ensure_ephemeral_cache(block: &mut Value) {
    if let Some(obj) = block.as_object_mut() {
        obj.entry("cache_control".to_string())
            .or_insert_with(|| json!({"type": "ephemeral"}));
    }
}

fn has_full_instructions(blocks: &[Value]) -> bool {
    blocks
        .iter()
        .any(|block| block_text(block).map(|t| t.len() > FULL_INSTRUCTIONS_MIN_LEN).unwrap_or(false))
}

/// Path (a): the caller is a real CLI whose prompt may have lost pieces.
/// Repairs the prefix without disturbing what the CLI sent.
fn repair_cli_system(system: Vec<Value>) -> Vec<Value> {
    if system.is_empty() {
        return catalog::canonical_system_prefix();
    }

    let first_has_billing = block_text(&system[0])
        .map(|t| t.contains(BILLING_SENTINEL))
        .unwrap_or(false);
    if first_has_billing {
        let mut blocks = system;
        if blocks.len() > 1 {
            ensure_ephemeral_cache(&mut blocks[1]);
        }
        return blocks;
    }

    let first_is_identity = block_text(&system[0])
        .map(|t| t.starts_with(IDENTITY_PREFIX))
        .unwrap_or(false);
    if first_is_identity {
        let mut blocks = system;
        ensure_ephemeral_cache(&mut blocks[0]);
        if !has_full_instructions(&blocks) {
            blocks.push(catalog::instructions_block());
        }
        if let Some(billing) = catalog::billing_block() {
            blocks.insert(0, billing);
        }
        return blocks;
    }

    let mut blocks = catalog::canonical_system_prefix();
    blocks.extend(system);
    blocks
}

/// Path (b): a generic client is dressed up as the CLI.
fn spoof_generic_system(system: Vec<Value>) -> Vec<Value> {
    let already_branded = system.iter().any(|block| {
        block_text(block)
            .map(|t| t.contains(IDENTITY_PREFIX))
            .unwrap_or(false)
    });
    if already_branded {
        return system;
    }

    let mut blocks = catalog::canonical_system_prefix();
    blocks.extend(system);
    blocks
}

fn enforce_tools(obj: &mut Map<String, Value>) {
    let needs_catalog = match obj.get("tools") {
        Some(Value::Array(tools)) => tools.is_empty(),
        _ => true,
    };
    if needs_catalog {
        obj.insert(
            "tools".to_string(),
            Value::Array(catalog::tool_catalog().to_vec()),
        );
    }
}

fn enforce_user_id(obj: &mut Map<String, Value>) {
    let valid = obj
        .get("metadata")
        .and_then(|m| m.get("user_id"))
        .and_then(|u| u.as_str())
        .map(catalog::is_valid_user_id)
        .unwrap_or(false);
    if valid {
        return;
    }

    let metadata = obj
        .entry("metadata".to_string())
        .or_insert_with(|| json!({}));
    if !metadata.is_object() {
        *metadata = json!({});
    }
    if let Some(metadata) = metadata.as_object_mut() {
        metadata.insert(
            "user_id".to_string(),
            Value::String(catalog::generate_user_id()),
        );
    }
}

fn enforce_body_shape(body: &mut Value, rule: &ModelRule, is_cli: bool) {
    let system = system_to_array(body.get("system"));
    let Some(obj) = body.as_object_mut() else {
        return;
    };

    if rule.require_cli_identity {
        let shaped = if is_cli {
            repair_cli_system(system)
        } else {
            spoof_generic_system(system)
        };
        obj.insert("system".to_string(), Value::Array(shaped));
        enforce_tools(obj);
        enforce_user_id(obj);
        return;
    }

    // Small-tier path: minimal shape, no CLI impersonation. A non-empty
    // client system prompt is preserved in whatever form it arrived.
    if system.is_empty() {
        obj.insert(
            "system".to_string(),
            json!([{"type": "text", "text": IDENTITY_PREFIX}]),
        );
    }

    match obj.get("tools") {
        Some(Value::Array(_)) => {}
        _ => {
            obj.insert("tools".to_string(), json!([]));
        }
    }

    if !obj.contains_key("metadata") {
        obj.insert(
            "metadata".to_string(),
            json!({"user_id": catalog::generate_user_id()}),
        );
    }
}

fn is_falsy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn apply_default_fields(body: &mut Value) {
    let Some(obj) = body.as_object_mut() else {
        return;
    };
    if is_falsy(obj.get("max_tokens")) {
        obj.insert("max_tokens".to_string(), json!(32000));
    }
    // `stream` is deliberately left alone: non-streaming callers must get
    // non-streaming responses.
}
