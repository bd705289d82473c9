use serde_json::Value;
use std::collections::HashSet;

/// Result of the proactive orphan sweep.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub messages: Vec<Value>,
    pub removed_ids: Vec<String>,
    pub had_orphans: bool,
}

fn block_type(block: &Value) -> Option<&str> {
    block.get("type").and_then(|t| t.as_str())
}

fn collect_tool_use_ids(messages: &[Value]) -> HashSet<String> {
    let mut ids = HashSet::new();
    for message in messages {
        // All roles are scanned. A client that mislabels an assistant turn
        // still gets its tool_use declarations recognized.
        let Some(blocks) = message.get("content").and_then(|c| c.as_array()) else {
            continue;
        };
        for block in blocks {
            if block_type(block) == Some("tool_use") {
                if let Some(id) = block.get("id").and_then(|i| i.as_str()) {
                    ids.insert(id.to_string());
                }
            }
        }
    }
    ids
}

fn tool_result_ref(block: &Value) -> Option<&str> {
    if block_type(block) != Some("tool_result") {
        return None;
    }
    block.get("tool_use_id").and_then(|i| i.as_str())
}

/// Scans the whole conversation and strips every tool_result block whose
/// `tool_use_id` has no matching tool_use anywhere in the message sequence.
///
/// The input is never mutated. Message count and the relative order of the
/// surviving blocks are preserved; a message whose content array becomes
/// empty is kept so the turn structure stays aligned with what the client
/// sent.
pub fn scan_strip(messages: &[Value]) -> ScanOutcome {
    let known_ids = collect_tool_use_ids(messages);

    let mut removed_ids: Vec<String> = Vec::new();
    let mut seen_removed: HashSet<String> = HashSet::new();
    for message in messages {
        let Some(blocks) = message.get("content").and_then(|c| c.as_array()) else {
            continue;
        };
        for block in blocks {
            if let Some(reference) = tool_result_ref(block) {
                if !known_ids.contains(reference) && seen_removed.insert(reference.to_string()) {
                    removed_ids.push(reference.to_string());
                }
            }
        }
    }

    if removed_ids.is_empty() {
        return ScanOutcome {
            messages: messages.to_vec(),
            removed_ids,
            had_orphans: false,
        };
    }

    tracing::warn!(
        "Stripping {} orphaned tool_result reference(s): {:?}",
        removed_ids.len(),
        removed_ids
    );

    let orphaned: HashSet<&str> = removed_ids.iter().map(|s| s.as_str()).collect();
    let cleaned = strip_matching(messages, |reference| orphaned.contains(reference));

    ScanOutcome {
        messages: cleaned,
        removed_ids,
        had_orphans: true,
    }
}

/// Removes every tool_result block referencing exactly `tool_use_id`.
/// Used for the one-shot repair after upstream cites a dangling identifier.
pub fn targeted_remove(messages: &[Value], tool_use_id: &str) -> Vec<Value> {
    strip_matching(messages, |reference| reference == tool_use_id)
}

fn strip_matching<F>(messages: &[Value], should_remove: F) -> Vec<Value>
where
    F: Fn(&str) -> bool,
{
    messages
        .iter()
        .map(|message| {
            let Some(blocks) = message.get("content").and_then(|c| c.as_array()) else {
                return message.clone();
            };

            let kept: Vec<Value> = blocks
                .iter()
                .filter(|block| match tool_result_ref(block) {
                    Some(reference) => !should_remove(reference),
                    None => true,
                })
                .cloned()
                .collect();

            let mut out = message.clone();
            if let Some(obj) = out.as_object_mut() {
                obj.insert("content".to_string(), Value::Array(kept));
            }
            out
        })
        .collect()
}
