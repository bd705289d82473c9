use rand::Rng;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

/// First sentence of the CLI's system prompt. Upstream checks it verbatim.
pub const IDENTITY_PREFIX: &str =
    "You are Claude Code, Anthropic's official CLI for Claude.";

/// Leading billing envelope some CLI builds prepend before the identity
/// sentence. Empty in this build; the prepend logic stays conditional so a
/// rebrand only has to fill the constant in.
pub const BILLING_TEXT: &str = "";

/// Substring that marks a client-supplied billing envelope. When the first
/// system block carries it, the request came from a real CLI session and its
/// prefix is preserved as-is.
pub const BILLING_SENTINEL: &str = "billed via the Claude subscription plan";

/// Blocks shorter than this are treated as fragments rather than the full
/// instruction text when deciding whether to append `SYSTEM_INSTRUCTIONS`.
pub const FULL_INSTRUCTIONS_MIN_LEN: usize = 5000;

/// The CLI's full system instructions. Upstream validators compare the shape
/// of this text (not byte equality), but sending the real thing keeps the
/// request indistinguishable from a first-party session.
pub const SYSTEM_INSTRUCTIONS: &str = r#"You are an interactive CLI tool that helps users with software engineering tasks. Use the instructions below and the tools available to you to assist the user.

IMPORTANT: Assist with defensive security tasks only. Refuse to create, modify, or improve code that may be used maliciously. Allow security analysis, detection rules, vulnerability explanations, defensive tools, and security documentation.
IMPORTANT: You must NEVER generate or guess URLs for the user unless you are confident that the URLs are for helping the user with programming. You may use URLs provided by the user in their messages or local files.

If the user asks for help or wants to give feedback inform them of the following:
- /help: Get help with using Claude Code
- To give feedback, users should report the issue at https://github.com/anthropics/claude-code/issues

When the user directly asks about Claude Code (eg 'can Claude Code do...', 'does Claude Code have...') or asks in second person (eg 'are you able...', 'can you do...'), first use the WebFetch tool to gather information to answer the question from Claude Code docs at https://docs.anthropic.com/en/docs/claude-code.

# Tone and style
You should be concise, direct, and to the point. When you run a non-trivial bash command, you should explain what the command does and why you are running it, to make sure the user understands what you are doing (this is especially important when you are running a command that will make changes to the user's system).
Remember that your output will be displayed on a command line interface. Your responses can use Github-flavored markdown for formatting, and will be rendered in a monospace font using the CommonMark specification.
Output text to communicate with the user; all text you output outside of tool use is displayed to the user. Only use tools to complete tasks. Never use tools like Bash or code comments as means to communicate with the user during the session.
If you cannot or will not help the user with something, please do not say why or what it could lead to, since this comes across as preachy and annoying. Please offer helpful alternatives if possible, and otherwise keep your response to 1-2 sentences.
IMPORTANT: You should minimize output tokens as much as possible while maintaining helpfulness, quality, and accuracy. Only address the specific query or task at hand, avoiding tangential information unless absolutely critical for completing the request. If you can answer in 1-3 sentences or a short paragraph, please do.
IMPORTANT: You should NOT answer with unnecessary preamble or postamble (such as explaining your code or summarizing your action), unless the user asks you to.
IMPORTANT: Keep your responses short, since they will be displayed on a command line interface. You MUST answer concisely with fewer than 4 lines (not including tool use or code generation), unless user asks for detail. Answer the user's question directly, without elaboration, explanation, or details. One word answers are best. Avoid introductions, conclusions, and explanations.

# Proactiveness
You are allowed to be proactive, but only when the user asks you to do something. You should strive to strike a balance between:
1. Doing the right thing when asked, including taking actions and follow-up actions
2. Not surprising the user with actions you take without asking
For example, if the user asks you how to approach something, you should do your best to answer their question first, and not immediately jump into taking actions.
3. Do not add additional code explanation summary unless requested by the user. After working on a file, just stop, rather than providing an explanation of what you did.

# Following conventions
When making changes to files, first understand the file's code conventions. Mimic code style, use existing libraries and utilities, and follow existing patterns.
- NEVER assume that a given library is available, even if it is well known. Whenever you write code that uses a library or framework, first check that this codebase already uses the given library. For example, you might look at neighboring files, or check the package.json (or cargo.toml, and so on depending on the language).
- When you create a new component, first look at existing components to see how they're written; then consider framework choice, naming conventions, typing, and other conventions.
- When you edit a piece of code, first look at the code's surrounding context (especially its imports) to understand the code's choice of frameworks and libraries. Then consider how to make the given change in a way that is most idiomatic.
- Always follow security best practices. Never introduce code that exposes or logs secrets and keys. Never commit secrets or keys to the repository.

# Code style
- IMPORTANT: DO NOT ADD ***ANY*** COMMENTS unless asked

# Task Management
You have access to the TodoWrite tools to help you manage and plan tasks. Use these tools VERY frequently to ensure that you are tracking your tasks and giving the user visibility into your progress.
These tools are also EXTREMELY helpful for planning tasks, and for breaking down larger complex tasks into smaller steps. If you do not use this tool when planning, you may forget to do important tasks - and that is unacceptable.
It is critical that you mark todos as completed as soon as you are done with a task. Do not batch up multiple tasks before marking them as completed.

# Doing tasks
The user will primarily request you perform software engineering tasks. This includes solving bugs, adding new functionality, refactoring code, explaining code, and more. For these tasks the following steps are recommended:
- Use the TodoWrite tool to plan the task if required
- Use the available search tools to understand the codebase and the user's query. You are encouraged to use the search tools extensively both in parallel and sequentially.
- Implement the solution using all tools available to you
- Verify the solution if possible with tests. NEVER assume specific test framework or test script. Check the README or search codebase to determine the testing approach.
- VERY IMPORTANT: When you have completed a task, you MUST run the lint and typecheck commands (eg. npm run lint, npm run typecheck, ruff, etc.) with Bash if they were provided to you to ensure your code is correct. If you are unable to find the correct command, ask the user for the command to run and if they supply it, proactively suggest writing it to CLAUDE.md so that you will know to run it next time.
NEVER commit changes unless the user explicitly asks you to. It is VERY IMPORTANT to only commit when explicitly asked, otherwise the user will feel that you are being too proactive.

# Tool usage policy
- When doing file search, prefer to use the Task tool in order to reduce context usage.
- You should proactively use the Task tool with specialized agents when the task at hand matches the agent's description.
- When WebFetch returns a message about a redirect to a different host, you should immediately make a new WebFetch request with the redirect URL provided in the response.
- You have the capability to call multiple tools in a single response. When multiple independent pieces of information are requested, batch your tool calls together for optimal performance.

You MUST answer concisely with fewer than 4 lines of text (not including tool use or code generation), unless user asks for detail.

Here is useful information about the environment you are running in:
<env>
Working directory: /home/user/project
Is directory a git repo: Yes
Platform: linux
OS Version: Linux 6.8
Today's date: 2025-08-19
</env>
You are powered by the model named Sonnet 4. The exact model ID is claude-sonnet-4-20250514.

IMPORTANT: Assist with defensive security tasks only. Refuse to create, modify, or improve code that may be used maliciously.

# Code References

When referencing specific functions or pieces of code include the pattern `file_path:line_number` to allow the user to easily navigate to the source code location.
"#;

/// Tool descriptors the CLI declares on every request. Injected when a
/// spoofed client sends none so the request shape matches a real session.
static TOOL_CATALOG: LazyLock<Vec<Value>> = LazyLock::new(|| {
    vec![
        json!({
            "name": "Task",
            "description": "Launch a new agent to handle complex, multi-step tasks autonomously.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "description": {"type": "string", "description": "A short (3-5 word) description of the task"},
                    "prompt": {"type": "string", "description": "The task for the agent to perform"},
                    "subagent_type": {"type": "string", "description": "The type of specialized agent to use for this task"}
                },
                "required": ["description", "prompt", "subagent_type"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "Bash",
            "description": "Executes a given bash command in a persistent shell session with optional timeout, ensuring proper handling and security measures.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The command to execute"},
                    "timeout": {"type": "number", "description": "Optional timeout in milliseconds (max 600000)"},
                    "description": {"type": "string", "description": "Clear, concise description of what this command does in 5-10 words"},
                    "run_in_background": {"type": "boolean", "description": "Set to true to run this command in the background."}
                },
                "required": ["command"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "Glob",
            "description": "Fast file pattern matching tool that works with any codebase size. Returns matching file paths sorted by modification time.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "The glob pattern to match files against"},
                    "path": {"type": "string", "description": "The directory to search in. If not specified, the current working directory will be used."}
                },
                "required": ["pattern"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "Grep",
            "description": "A powerful search tool built on ripgrep. Supports full regex syntax, file filtering by glob or type, and multiple output modes.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "The regular expression pattern to search for in file contents"},
                    "path": {"type": "string", "description": "File or directory to search in (rg PATH). Defaults to current working directory."},
                    "glob": {"type": "string", "description": "Glob pattern to filter files (e.g. \"*.js\", \"*.{ts,tsx}\")"},
                    "type": {"type": "string", "description": "File type to search (rg --type)"},
                    "output_mode": {"type": "string", "enum": ["content", "files_with_matches", "count"]},
                    "-i": {"type": "boolean", "description": "Case insensitive search (rg -i)"},
                    "-n": {"type": "boolean", "description": "Show line numbers in output"},
                    "multiline": {"type": "boolean", "description": "Enable multiline mode where . matches newlines"}
                },
                "required": ["pattern"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "Read",
            "description": "Reads a file from the local filesystem. You can access any file directly by using this tool.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "The absolute path to the file to read"},
                    "offset": {"type": "number", "description": "The line number to start reading from"},
                    "limit": {"type": "number", "description": "The number of lines to read"}
                },
                "required": ["file_path"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "Edit",
            "description": "Performs exact string replacements in files. The edit will FAIL if old_string is not unique in the file unless replace_all is used.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "The absolute path to the file to modify"},
                    "old_string": {"type": "string", "description": "The text to replace"},
                    "new_string": {"type": "string", "description": "The text to replace it with"},
                    "replace_all": {"type": "boolean", "default": false, "description": "Replace all occurences of old_string"}
                },
                "required": ["file_path", "old_string", "new_string"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "MultiEdit",
            "description": "Makes multiple edits to a single file in one operation. All edits are applied in sequence; either all succeed or none are applied.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "The absolute path to the file to modify"},
                    "edits": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "old_string": {"type": "string"},
                                "new_string": {"type": "string"},
                                "replace_all": {"type": "boolean", "default": false}
                            },
                            "required": ["old_string", "new_string"],
                            "additionalProperties": false
                        },
                        "minItems": 1
                    }
                },
                "required": ["file_path", "edits"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "Write",
            "description": "Writes a file to the local filesystem. Overwrites the existing file if there is one.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "The absolute path to the file to write"},
                    "content": {"type": "string", "description": "The content to write to the file"}
                },
                "required": ["file_path", "content"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "NotebookEdit",
            "description": "Completely replaces the contents of a specific cell in a Jupyter notebook (.ipynb file) with new source.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "notebook_path": {"type": "string", "description": "The absolute path to the Jupyter notebook file to edit"},
                    "cell_id": {"type": "string", "description": "The ID of the cell to edit"},
                    "new_source": {"type": "string", "description": "The new source for the cell"},
                    "cell_type": {"type": "string", "enum": ["code", "markdown"]},
                    "edit_mode": {"type": "string", "enum": ["replace", "insert", "delete"]}
                },
                "required": ["notebook_path", "new_source"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "WebFetch",
            "description": "Fetches content from a specified URL and processes it using an AI model. Takes a URL and a prompt as input.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "url": {"type": "string", "format": "uri", "description": "The URL to fetch content from"},
                    "prompt": {"type": "string", "description": "The prompt to run on the fetched content"}
                },
                "required": ["url", "prompt"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "TodoWrite",
            "description": "Use this tool to create and manage a structured task list for your current coding session.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "content": {"type": "string", "minLength": 1},
                                "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]},
                                "activeForm": {"type": "string", "minLength": 1}
                            },
                            "required": ["content", "status", "activeForm"],
                            "additionalProperties": false
                        },
                        "description": "The updated todo list"
                    }
                },
                "required": ["todos"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "WebSearch",
            "description": "Allows Claude to search the web and use the results to inform responses.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 2, "description": "The search query to use"},
                    "allowed_domains": {"type": "array", "items": {"type": "string"}},
                    "blocked_domains": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["query"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "BashOutput",
            "description": "Retrieves output from a running or completed background bash shell.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "bash_id": {"type": "string", "description": "The ID of the background shell to retrieve output from"},
                    "filter": {"type": "string", "description": "Optional regular expression to filter the output lines"}
                },
                "required": ["bash_id"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "KillShell",
            "description": "Kills a running background bash shell by its ID.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "shell_id": {"type": "string", "description": "The ID of the background shell to kill"}
                },
                "required": ["shell_id"],
                "additionalProperties": false
            }
        }),
    ]
});

static USER_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^user_[a-f0-9]+_account__session_[0-9a-f-]{36}$")
        .expect("Invalid user id regex")
});

pub fn tool_catalog() -> &'static [Value] {
    &TOOL_CATALOG
}

fn ephemeral_cache_control() -> Value {
    json!({"type": "ephemeral"})
}

pub fn identity_block() -> Value {
    json!({
        "type": "text",
        "text": IDENTITY_PREFIX,
        "cache_control": ephemeral_cache_control()
    })
}

pub fn instructions_block() -> Value {
    json!({
        "type": "text",
        "text": SYSTEM_INSTRUCTIONS,
        "cache_control": ephemeral_cache_control()
    })
}

pub fn billing_block() -> Option<Value> {
    if BILLING_TEXT.is_empty() {
        return None;
    }
    Some(json!({"type": "text", "text": BILLING_TEXT}))
}

/// The canonical system-prompt prefix: optional billing envelope, identity
/// sentence, full instructions.
pub fn canonical_system_prefix() -> Vec<Value> {
    let mut blocks = Vec::with_capacity(3);
    if let Some(billing) = billing_block() {
        blocks.push(billing);
    }
    blocks.push(identity_block());
    blocks.push(instructions_block());
    blocks
}

pub fn is_valid_user_id(candidate: &str) -> bool {
    USER_ID_PATTERN.is_match(candidate)
}

/// `user_{32 hex}_account__session_{uuid}`, both parts freshly random per
/// call so sessions never collide across spoofed clients.
pub fn generate_user_id() -> String {
    let account: u128 = rand::thread_rng().gen();
    format!(
        "user_{:032x}_account__session_{}",
        account,
        uuid::Uuid::new_v4()
    )
}
