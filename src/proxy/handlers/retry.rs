use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::proxy::handlers::streaming::{buffer_response, BufferedResponse, UpstreamReply};
use crate::proxy::identity::normalize_request;
use crate::proxy::mappers::conversation;
use crate::proxy::mappers::error_classifier::{self, UpstreamErrorKind};
use crate::proxy::upstream::client::UpstreamClient;

pub const MAX_OVERLOAD_RETRIES: u32 = 2;

const OVERLOAD_BASE_BACKOFF_MS: u64 = 1000;
const ORPHAN_REPAIR_PAUSE_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CleanupOutcome {
    /// First attempt succeeded with nothing removed.
    Success,
    /// First attempt succeeded, but only after orphans were stripped up
    /// front.
    ProactiveSuccess,
    /// At least one retry (overload or orphan repair) happened.
    RetrySuccess,
}

impl CleanupOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CleanupOutcome::Success => "Success",
            CleanupOutcome::ProactiveSuccess => "ProactiveSuccess",
            CleanupOutcome::RetrySuccess => "RetrySuccess",
        }
    }
}

/// Introspection record for one orchestrated invocation. The only channel
/// through which the cleanup machinery reports what it did.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupMetadata {
    pub proactive_removed_ids: Vec<String>,
    pub removed_tool_use_ids: Vec<String>,
    pub retry_count: u32,
    pub outcome: CleanupOutcome,
}

impl CleanupMetadata {
    fn new() -> Self {
        Self {
            proactive_removed_ids: Vec::new(),
            removed_tool_use_ids: Vec::new(),
            retry_count: 0,
            outcome: CleanupOutcome::Success,
        }
    }
}

enum Attempt {
    Live(reqwest::Response),
    Buffered(BufferedResponse),
}

impl Attempt {
    fn status_u16(&self) -> u16 {
        match self {
            Attempt::Live(resp) => resp.status().as_u16(),
            Attempt::Buffered(resp) => resp.status.as_u16(),
        }
    }

    fn into_reply(self) -> UpstreamReply {
        match self {
            Attempt::Live(resp) => UpstreamReply::Passthrough(resp),
            Attempt::Buffered(resp) => UpstreamReply::Buffered(resp),
        }
    }

    async fn buffered(self) -> AppResult<BufferedResponse> {
        match self {
            Attempt::Live(resp) => buffer_response(resp).await,
            Attempt::Buffered(resp) => Ok(resp),
        }
    }
}

fn settled_outcome(metadata: &CleanupMetadata, had_proactive_orphans: bool) -> CleanupOutcome {
    if metadata.retry_count > 0 {
        CleanupOutcome::RetrySuccess
    } else if had_proactive_orphans {
        CleanupOutcome::ProactiveSuccess
    } else {
        CleanupOutcome::Success
    }
}

fn body_messages(body: &Value) -> Option<&Vec<Value>> {
    body.get("messages").and_then(|m| m.as_array())
}

/// Runs one message-bearing request through proactive sanitization, identity
/// normalization, dispatch, bounded overload retry, and a single reactive
/// orphan repair.
///
/// Preconditions: `body` is a JSON object with a `messages` field; callers
/// with anything else dispatch directly instead.
pub async fn execute_with_cleanup(
    client: &UpstreamClient,
    target_url: &str,
    identity_host: &str,
    trace_id: &str,
    mut headers: HeaderMap,
    mut body: Value,
) -> AppResult<(UpstreamReply, CleanupMetadata)> {
    let mut metadata = CleanupMetadata::new();

    // Proactive sweep strictly happens before the first dispatch.
    let mut had_proactive_orphans = false;
    if let Some(messages) = body_messages(&body) {
        let outcome = conversation::scan_strip(messages);
        had_proactive_orphans = outcome.had_orphans;
        metadata.proactive_removed_ids = outcome.removed_ids;
        if outcome.had_orphans {
            info!(
                "[{}] Proactively removed orphaned tool_result ids: {:?}",
                trace_id, metadata.proactive_removed_ids
            );
            body["messages"] = Value::Array(outcome.messages);
        }
    }

    normalize_request(target_url, identity_host, &mut headers, &mut body);
    let body_bytes = Bytes::from(serde_json::to_vec(&body)?);

    let first = client
        .send(Method::POST, target_url, &headers, Some(body_bytes.clone()))
        .await?;
    let mut attempt = Attempt::Live(first);

    // Bounded overload retry, same body bytes every time: the saturation is
    // server-side, not request-dependent.
    for round in 1..=MAX_OVERLOAD_RETRIES {
        let status = attempt.status_u16();
        if !error_classifier::is_overload_status(status) {
            break;
        }
        let buffered = attempt.buffered().await?;
        if error_classifier::classify(status, &buffered.body) != UpstreamErrorKind::Overload {
            attempt = Attempt::Buffered(buffered);
            break;
        }

        metadata.retry_count = round;
        let backoff_ms = OVERLOAD_BASE_BACKOFF_MS * 2u64.pow(round - 1);
        warn!(
            "[{}] Upstream overloaded (status {}), retry {}/{} in {}ms",
            trace_id, status, round, MAX_OVERLOAD_RETRIES, backoff_ms
        );
        sleep(Duration::from_millis(backoff_ms)).await;

        let retried = client
            .send(Method::POST, target_url, &headers, Some(body_bytes.clone()))
            .await?;
        attempt = Attempt::Live(retried);
    }

    // Streaming classification precedes outcome labeling; streaming bodies
    // are returned untouched.
    let reply_candidate = attempt.into_reply();
    if reply_candidate.is_streaming() || reply_candidate.status().is_success() {
        metadata.outcome = settled_outcome(&metadata, had_proactive_orphans);
        return Ok((reply_candidate, metadata));
    }

    // One reactive repair when upstream cites a dangling identifier.
    if reply_candidate.status().as_u16() == 400 {
        let buffered = match reply_candidate {
            UpstreamReply::Passthrough(resp) => buffer_response(resp).await?,
            UpstreamReply::Buffered(resp) => resp,
        };

        if let UpstreamErrorKind::Orphan(ids) =
            error_classifier::classify(400, &buffered.body)
        {
            debug!(
                "[{}] Upstream cited orphaned tool_use ids: {:?}",
                trace_id, ids
            );
            // Only the first cited id is repaired; a second 400 is
            // surfaced rather than retried again.
            let target_id = ids[0].clone();
            if let Some(messages) = body_messages(&body) {
                let cleaned = conversation::targeted_remove(messages, &target_id);
                body["messages"] = Value::Array(cleaned);
            }
            metadata.removed_tool_use_ids.extend(ids);
            metadata.retry_count += 1;

            sleep(Duration::from_millis(ORPHAN_REPAIR_PAUSE_MS)).await;
            let repaired_bytes = Bytes::from(serde_json::to_vec(&body)?);
            let retried = client
                .send(Method::POST, target_url, &headers, Some(repaired_bytes))
                .await?;

            let reply = UpstreamReply::Passthrough(retried);
            metadata.outcome = if reply.is_streaming() || reply.status().is_success() {
                CleanupOutcome::RetrySuccess
            } else {
                CleanupOutcome::Success
            };
            return Ok((reply, metadata));
        }

        metadata.outcome = if metadata.retry_count > 0 {
            CleanupOutcome::RetrySuccess
        } else {
            CleanupOutcome::Success
        };
        return Ok((UpstreamReply::Buffered(buffered), metadata));
    }

    metadata.outcome = if metadata.retry_count > 0 {
        CleanupOutcome::RetrySuccess
    } else {
        CleanupOutcome::Success
    };
    Ok((reply_candidate, metadata))
}
