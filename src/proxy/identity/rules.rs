use serde_json::{json, Value};

use crate::constants::CLI_BETA_FLAG;

/// What a matched rule does to `body.thinking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingPolicy {
    /// Inject the CLI's adaptive thinking config.
    Adaptive,
    /// Remove any client-supplied thinking config.
    Absent,
}

impl ThinkingPolicy {
    pub fn config(self) -> Option<Value> {
        match self {
            ThinkingPolicy::Adaptive => Some(json!({"type": "adaptive"})),
            ThinkingPolicy::Absent => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModelRule {
    /// Lowercase substring matched against the request's `model` field.
    pub model_substring: &'static str,
    /// Beta flags the upstream expects for this tier, in declaration order.
    pub required_beta_flags: &'static [&'static str],
    pub thinking: ThinkingPolicy,
    pub remove_temperature: bool,
    pub require_cli_identity: bool,
}

/// Ordered rule table, more-specific entries first; the first substring
/// match wins.
pub static MODEL_RULES: &[ModelRule] = &[
    ModelRule {
        model_substring: "haiku",
        required_beta_flags: &[CLI_BETA_FLAG],
        thinking: ThinkingPolicy::Absent,
        remove_temperature: false,
        require_cli_identity: false,
    },
    ModelRule {
        model_substring: "sonnet",
        required_beta_flags: &[
            CLI_BETA_FLAG,
            "interleaved-thinking-2025-05-14",
            "fine-grained-tool-streaming-2025-05-14",
            "context-1m-2025-08-07",
        ],
        thinking: ThinkingPolicy::Adaptive,
        remove_temperature: true,
        require_cli_identity: true,
    },
    ModelRule {
        model_substring: "opus",
        required_beta_flags: &[
            CLI_BETA_FLAG,
            "interleaved-thinking-2025-05-14",
            "fine-grained-tool-streaming-2025-05-14",
        ],
        thinking: ThinkingPolicy::Adaptive,
        remove_temperature: true,
        require_cli_identity: true,
    },
];

pub fn match_rule(model: &str) -> Option<&'static ModelRule> {
    let normalized = model.to_lowercase();
    MODEL_RULES
        .iter()
        .find(|rule| normalized.contains(rule.model_substring))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_are_case_insensitive() {
        let rule = match_rule("Claude-Sonnet-4-20250514").expect("sonnet rule");
        assert_eq!(rule.model_substring, "sonnet");
    }

    #[test]
    fn first_match_wins() {
        // A model name carrying two tier names resolves to the earlier entry.
        let rule = match_rule("claude-haiku-sonnet-hybrid").expect("rule");
        assert_eq!(rule.model_substring, "haiku");
    }

    #[test]
    fn unknown_model_matches_nothing() {
        assert!(match_rule("gpt-4o-mini").is_none());
        assert!(match_rule("").is_none());
    }

    #[test]
    fn small_tier_skips_identity_and_thinking() {
        let rule = match_rule("claude-3-5-haiku-20241022").expect("haiku rule");
        assert!(!rule.require_cli_identity);
        assert!(!rule.remove_temperature);
        assert_eq!(rule.thinking.config(), None);
    }

    #[test]
    fn large_tiers_require_identity() {
        for model in ["claude-sonnet-4-20250514", "claude-opus-4-1-20250805"] {
            let rule = match_rule(model).expect("rule");
            assert!(rule.require_cli_identity);
            assert!(rule.remove_temperature);
            assert_eq!(
                rule.thinking.config().unwrap()["type"],
                "adaptive"
            );
            assert!(rule.required_beta_flags.contains(&CLI_BETA_FLAG));
        }
    }
}
