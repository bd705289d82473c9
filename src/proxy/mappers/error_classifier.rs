use regex::Regex;
use std::sync::LazyLock;

/// Classification of a non-2xx upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Transient server-side saturation, worth a bounded retry.
    Overload,
    /// Upstream rejected the conversation over dangling tool_result
    /// references. Identifiers are in match order, never empty.
    Orphan(Vec<String>),
    /// Everything else; surfaced to the client unchanged.
    Other,
}

const OVERLOAD_STATUSES: [u16; 3] = [500, 503, 529];

// 负载已经达到上限 is the aggregator-side saturation message; the rest are
// phrasings seen from Anthropic-compatible backends.
const OVERLOAD_PHRASES: [&str; 6] = [
    "负载已经达到上限",
    "overload",
    "overloaded",
    "rate limit",
    "capacity",
    "too many requests",
];

// Tool identifiers are ASCII by contract, so the capture classes stay ASCII
// even though the regex crate defaults \w to Unicode.
static ORPHAN_PRIMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"unexpected `tool_use_id` found in `tool_result` blocks: (toolu_[0-9A-Za-z_]+)")
        .expect("Invalid primary orphan regex")
});

static ORPHAN_SECONDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"tool result's tool id\(([^)]+)\) not found")
        .expect("Invalid secondary orphan regex")
});

/// Pulls a human-readable message out of an error body: `.error.message`,
/// then `.message`, then the raw body when it is not JSON at all.
pub fn extract_error_message(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => value
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .or_else(|| value.get("message").and_then(|m| m.as_str()))
            .map(|m| m.to_string())
            .unwrap_or_else(|| text.into_owned()),
        Err(_) => text.into_owned(),
    }
}

pub fn is_overload_status(status: u16) -> bool {
    OVERLOAD_STATUSES.contains(&status)
}

fn is_overload_message(message: &str) -> bool {
    let normalized = message.to_lowercase();
    OVERLOAD_PHRASES
        .iter()
        .any(|phrase| normalized.contains(phrase))
}

fn orphan_ids(message: &str) -> Vec<String> {
    let mut ids: Vec<String> = ORPHAN_PRIMARY
        .captures_iter(message)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    ids.extend(
        ORPHAN_SECONDARY
            .captures_iter(message)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
    );
    ids
}

/// Classifies a buffered non-2xx response. Total: parse failures and
/// unrecognized shapes all land in `Other`.
pub fn classify(status: u16, body: &[u8]) -> UpstreamErrorKind {
    if is_overload_status(status) {
        let message = extract_error_message(body);
        if is_overload_message(&message) {
            return UpstreamErrorKind::Overload;
        }
        return UpstreamErrorKind::Other;
    }

    if status == 400 {
        let message = extract_error_message(body);
        let ids = orphan_ids(&message);
        if !ids.is_empty() {
            return UpstreamErrorKind::Orphan(ids);
        }
    }

    UpstreamErrorKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error_body(message: &str) -> Vec<u8> {
        json!({"error": {"type": "api_error", "message": message}})
            .to_string()
            .into_bytes()
    }

    #[test]
    fn overloaded_529_is_overload() {
        assert_eq!(
            classify(529, &error_body("Overloaded")),
            UpstreamErrorKind::Overload
        );
    }

    #[test]
    fn chinese_saturation_phrase_is_overload() {
        assert_eq!(
            classify(503, &error_body("当前负载已经达到上限，请稍后再试")),
            UpstreamErrorKind::Overload
        );
    }

    #[test]
    fn overload_match_is_case_insensitive() {
        assert_eq!(
            classify(500, &error_body("RATE LIMIT reached for this key")),
            UpstreamErrorKind::Overload
        );
    }

    #[test]
    fn top_level_message_field_is_read() {
        let body = json!({"message": "server at capacity"}).to_string();
        assert_eq!(classify(503, body.as_bytes()), UpstreamErrorKind::Overload);
    }

    #[test]
    fn non_json_overload_body_is_matched_raw() {
        assert_eq!(
            classify(529, b"upstream overloaded, try later"),
            UpstreamErrorKind::Overload
        );
    }

    #[test]
    fn server_error_without_overload_phrase_is_other() {
        assert_eq!(
            classify(500, &error_body("internal server error")),
            UpstreamErrorKind::Other
        );
    }

    #[test]
    fn overload_phrase_on_other_status_is_other() {
        assert_eq!(
            classify(502, &error_body("Overloaded")),
            UpstreamErrorKind::Other
        );
        assert_eq!(
            classify(429, &error_body("too many requests")),
            UpstreamErrorKind::Other
        );
    }

    #[test]
    fn primary_orphan_pattern_captures_id() {
        let body =
            error_body("unexpected `tool_use_id` found in `tool_result` blocks: toolu_01AbCdEf");
        assert_eq!(
            classify(400, &body),
            UpstreamErrorKind::Orphan(vec!["toolu_01AbCdEf".to_string()])
        );
    }

    #[test]
    fn secondary_orphan_pattern_captures_id() {
        let body = error_body("tool result's tool id(call_9921) not found in conversation");
        assert_eq!(
            classify(400, &body),
            UpstreamErrorKind::Orphan(vec!["call_9921".to_string()])
        );
    }

    #[test]
    fn multiple_orphan_ids_are_kept_in_match_order() {
        let body = error_body(
            "unexpected `tool_use_id` found in `tool_result` blocks: toolu_first, \
             unexpected `tool_use_id` found in `tool_result` blocks: toolu_second",
        );
        assert_eq!(
            classify(400, &body),
            UpstreamErrorKind::Orphan(vec![
                "toolu_first".to_string(),
                "toolu_second".to_string()
            ])
        );
    }

    #[test]
    fn bad_request_without_pattern_is_other() {
        assert_eq!(
            classify(400, &error_body("max_tokens: field required")),
            UpstreamErrorKind::Other
        );
    }

    #[test]
    fn orphan_pattern_on_non_400_status_is_ignored() {
        let body = error_body("unexpected `tool_use_id` found in `tool_result` blocks: toolu_X");
        assert_eq!(classify(422, &body), UpstreamErrorKind::Other);
    }

    #[test]
    fn garbage_body_never_panics() {
        assert_eq!(classify(400, &[0xff, 0xfe, 0x00]), UpstreamErrorKind::Other);
        assert_eq!(classify(500, b""), UpstreamErrorKind::Other);
    }

    #[test]
    fn extract_prefers_nested_error_message() {
        let body = json!({"error": {"message": "inner"}, "message": "outer"}).to_string();
        assert_eq!(extract_error_message(body.as_bytes()), "inner");
    }
}
