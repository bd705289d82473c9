use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::constants::{cli_user_agent, CLI_BETA_FLAG, CLI_USER_AGENT_PREFIX};
use crate::proxy::identity::catalog::BILLING_SENTINEL;

pub const ANTHROPIC_BETA: &str = "anthropic-beta";

/// Browser-only headers that out a Web UI immediately. Deleted outright for
/// identity-sensitive targets.
pub const FINGERPRINT_BLOCKLIST: [&str; 10] = [
    "sec-ch-ua",
    "sec-ch-ua-platform",
    "sec-ch-ua-mobile",
    "sec-fetch-site",
    "sec-fetch-mode",
    "sec-fetch-dest",
    "accept-language",
    "priority",
    "origin",
    "referer",
];

/// Headers the upstream validates regardless of which client sent them.
/// Always overwritten with the table value.
pub const PROTOCOL_CRITICAL_HEADERS: [(&str, &str); 5] = [
    ("accept", "application/json"),
    ("accept-encoding", "gzip, deflate, br, zstd"),
    ("anthropic-dangerous-direct-browser-access", "true"),
    ("anthropic-version", "2023-06-01"),
    ("x-app", "cli"),
];

/// SDK fingerprint headers. A real CLI caller keeps its own values so a
/// version probe upstream cannot catch a mismatch; everyone else gets the
/// canonical table.
pub const STAINLESS_FINGERPRINT_HEADERS: [(&str, &str); 8] = [
    ("x-stainless-arch", "x64"),
    ("x-stainless-lang", "js"),
    ("x-stainless-os", "Linux"),
    ("x-stainless-package-version", "0.60.0"),
    ("x-stainless-retry-count", "0"),
    ("x-stainless-runtime", "node"),
    ("x-stainless-runtime-version", "v20.18.1"),
    ("x-stainless-timeout", "600"),
];

pub fn parse_beta_flags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|token| token.trim())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

/// Order-preserving merge: every client flag survives in its original
/// position, rule flags append in declaration order, duplicates collapse.
pub fn merge_beta_flags(existing: Option<&str>, required: &[&str]) -> String {
    let mut flags: Vec<String> = Vec::new();
    if let Some(raw) = existing {
        for token in parse_beta_flags(raw) {
            if !flags.contains(&token) {
                flags.push(token);
            }
        }
    }
    for token in required {
        if !flags.iter().any(|f| f == token) {
            flags.push((*token).to_string());
        }
    }
    flags.join(",")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn first_system_text(body: &Value) -> Option<String> {
    match body.get("system") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Array(blocks)) => blocks
            .first()
            .and_then(|block| block.get("text"))
            .and_then(|t| t.as_str())
            .map(|t| t.to_string()),
        _ => None,
    }
}

/// Detects a CLI-shaped request. Must run before the beta merge: the merge
/// injects the CLI-exclusive flag and would make this trivially true.
pub fn is_cli_request(headers: &HeaderMap, body: &Value) -> bool {
    if header_str(headers, header::USER_AGENT.as_str())
        .map(|ua| ua.starts_with(CLI_USER_AGENT_PREFIX))
        .unwrap_or(false)
    {
        return true;
    }

    if header_str(headers, ANTHROPIC_BETA)
        .map(|raw| parse_beta_flags(raw).iter().any(|f| f == CLI_BETA_FLAG))
        .unwrap_or(false)
    {
        return true;
    }

    first_system_text(body)
        .map(|text| text.contains(BILLING_SENTINEL))
        .unwrap_or(false)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => {
            tracing::warn!("Invalid identity header skipped: {}", name);
        }
    }
}

/// Strips browser fingerprints and applies the CLI header table.
pub fn apply_cli_headers(headers: &mut HeaderMap, is_cli: bool) {
    for name in FINGERPRINT_BLOCKLIST {
        headers.remove(name);
    }

    for (name, value) in PROTOCOL_CRITICAL_HEADERS {
        insert_header(headers, name, value);
    }

    if is_cli {
        // Fill only the gaps; a genuine CLI keeps its own fingerprint.
        if !headers.contains_key(header::USER_AGENT) {
            insert_header(headers, header::USER_AGENT.as_str(), &cli_user_agent());
        }
        for (name, value) in STAINLESS_FINGERPRINT_HEADERS {
            if !headers.contains_key(name) {
                insert_header(headers, name, value);
            }
        }
    } else {
        insert_header(headers, header::USER_AGENT.as_str(), &cli_user_agent());
        for (name, value) in STAINLESS_FINGERPRINT_HEADERS {
            insert_header(headers, name, value);
        }
    }
}

/// `x-api-key` callers are rewritten to the `authorization: Bearer` form the
/// aggregator expects. A client that already sends `authorization` wins.
pub fn normalize_authorization(headers: &mut HeaderMap) {
    if headers.contains_key(header::AUTHORIZATION) {
        return;
    }
    let Some(key) = header_str(headers, "x-api-key").map(|k| k.to_string()) else {
        return;
    };
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key)) {
        headers.insert(header::AUTHORIZATION, value);
        headers.remove("x-api-key");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn beta_merge_preserves_client_order_and_appends() {
        let merged = merge_beta_flags(
            Some("context-1m-2025-08-07, structured-outputs-2025-12-15"),
            &["claude-code-20250219", "interleaved-thinking-2025-05-14"],
        );
        assert_eq!(
            merged,
            "context-1m-2025-08-07,structured-outputs-2025-12-15,claude-code-20250219,interleaved-thinking-2025-05-14"
        );
    }

    #[test]
    fn beta_merge_deduplicates() {
        let merged = merge_beta_flags(
            Some("claude-code-20250219,claude-code-20250219"),
            &["claude-code-20250219"],
        );
        assert_eq!(merged, "claude-code-20250219");
    }

    #[test]
    fn beta_merge_drops_empty_tokens() {
        let merged = merge_beta_flags(Some(" , a , ,b,"), &["c"]);
        assert_eq!(merged, "a,b,c");
    }

    #[test]
    fn beta_merge_from_nothing_is_rule_flags() {
        let merged = merge_beta_flags(None, &["a", "b"]);
        assert_eq!(merged, "a,b");
    }

    #[test]
    fn cli_detected_by_user_agent_prefix() {
        let headers = headers_with(&[("user-agent", "claude-cli/1.0.83 (external, cli)")]);
        assert!(is_cli_request(&headers, &json!({})));
    }

    #[test]
    fn cli_detected_by_beta_flag() {
        let headers = headers_with(&[(
            "anthropic-beta",
            "oauth-2025-04-20, claude-code-20250219",
        )]);
        assert!(is_cli_request(&headers, &json!({})));
    }

    #[test]
    fn cli_detected_by_billing_sentinel_in_system() {
        let headers = HeaderMap::new();
        let body = json!({
            "system": [{"type": "text", "text": format!("Usage {}.", BILLING_SENTINEL)}]
        });
        assert!(is_cli_request(&headers, &body));
    }

    #[test]
    fn browser_request_is_not_cli() {
        let headers = headers_with(&[("user-agent", "Mozilla/5.0 (X11; Linux x86_64)")]);
        let body = json!({"system": "You are a helpful assistant."});
        assert!(!is_cli_request(&headers, &body));
    }

    #[test]
    fn fingerprint_blocklist_is_stripped() {
        let mut headers = headers_with(&[
            ("sec-ch-ua", "\"Chromium\";v=\"130\""),
            ("sec-fetch-mode", "cors"),
            ("accept-language", "en-US,en;q=0.9"),
            ("origin", "https://chat.example.com"),
            ("referer", "https://chat.example.com/"),
            ("priority", "u=1, i"),
        ]);
        apply_cli_headers(&mut headers, false);
        for name in FINGERPRINT_BLOCKLIST {
            assert!(headers.get(name).is_none(), "{} should be stripped", name);
        }
    }

    #[test]
    fn generic_client_gets_canonical_fingerprint() {
        let mut headers = headers_with(&[
            ("user-agent", "Mozilla/5.0"),
            ("x-stainless-runtime", "browser:chrome"),
        ]);
        apply_cli_headers(&mut headers, false);
        assert_eq!(
            headers.get("user-agent").unwrap().to_str().unwrap(),
            cli_user_agent()
        );
        assert_eq!(
            headers.get("x-stainless-runtime").unwrap().to_str().unwrap(),
            "node"
        );
    }

    #[test]
    fn cli_client_keeps_its_own_fingerprint() {
        let mut headers = headers_with(&[
            ("user-agent", "claude-cli/1.0.90 (external, cli)"),
            ("x-stainless-runtime-version", "v22.1.0"),
        ]);
        apply_cli_headers(&mut headers, true);
        assert_eq!(
            headers.get("user-agent").unwrap().to_str().unwrap(),
            "claude-cli/1.0.90 (external, cli)"
        );
        assert_eq!(
            headers
                .get("x-stainless-runtime-version")
                .unwrap()
                .to_str()
                .unwrap(),
            "v22.1.0"
        );
        // Gaps are still filled.
        assert_eq!(
            headers.get("x-stainless-lang").unwrap().to_str().unwrap(),
            "js"
        );
    }

    #[test]
    fn protocol_critical_headers_always_win() {
        let mut headers = headers_with(&[("anthropic-version", "2024-10-22"), ("x-app", "web")]);
        apply_cli_headers(&mut headers, true);
        assert_eq!(
            headers.get("anthropic-version").unwrap().to_str().unwrap(),
            "2023-06-01"
        );
        assert_eq!(headers.get("x-app").unwrap().to_str().unwrap(), "cli");
    }

    #[test]
    fn x_api_key_becomes_bearer() {
        let mut headers = headers_with(&[("x-api-key", "sk-test-123")]);
        normalize_authorization(&mut headers);
        assert_eq!(
            headers.get("authorization").unwrap().to_str().unwrap(),
            "Bearer sk-test-123"
        );
        assert!(headers.get("x-api-key").is_none());
    }

    #[test]
    fn existing_authorization_is_kept() {
        let mut headers = headers_with(&[
            ("x-api-key", "sk-ignored"),
            ("authorization", "Bearer original"),
        ]);
        normalize_authorization(&mut headers);
        assert_eq!(
            headers.get("authorization").unwrap().to_str().unwrap(),
            "Bearer original"
        );
        assert!(headers.get("x-api-key").is_some());
    }
}
