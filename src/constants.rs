/// Version the impersonated CLI reports. Bumped when the header table in
/// `proxy::identity::header_policy` is refreshed against a real capture.
pub const CLI_VERSION: &str = "1.0.83";

/// Prefix the first-party CLI uses in its `user-agent` header.
pub const CLI_USER_AGENT_PREFIX: &str = "claude-cli/";

/// Beta flag only the first-party CLI negotiates. Its presence on an inbound
/// request marks the caller as CLI-shaped before any rewriting happens.
pub const CLI_BETA_FLAG: &str = "claude-code-20250219";

pub fn cli_user_agent() -> String {
    format!("{}{} (external, cli)", CLI_USER_AGENT_PREFIX, CLI_VERSION)
}
