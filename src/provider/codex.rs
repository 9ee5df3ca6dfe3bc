//! Variant B adapter: wraps a `codex exec`-style CLI.
//!
//! New session:    codex exec --json "<prompt>"
//! Resume session: codex exec resume <session_id> --json "<prompt>"
//!
//! Output is a stream of newline-delimited JSON (JSONL) events. The stream is
//! walked for the event kinds that matter:
//!   thread.started  → captures the session/thread id (field name varies by version)
//!   item.completed  → if item.type == "agent_message", accumulates response text
//!   error           → classifies the failure
//! Everything else is progress noise and is silently skipped.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::{Config, Sandbox};
use crate::state::model::ErrorClass;

use super::classify::classify;
use super::{ProviderAdapter, ProviderResult};

const TURN_TIMEOUT: Duration = Duration::from_secs(300);
const EXECUTABLE: &str = "codex";

/// Set in the child's environment so a wrapper shim that itself invokes
/// switchboard cannot recurse into another routed turn.
const RECURSION_GUARD_VAR: &str = "SWITCHBOARD_INNER_PROVIDER_CALL";

pub struct CodexAdapter;

impl CodexAdapter {
    pub fn new() -> Self {
        Self
    }

    fn build_command(&self, prompt: &str, session_id: Option<&str>, config: &Config) -> Command {
        let mut cmd = Command::new(EXECUTABLE);
        cmd.env(RECURSION_GUARD_VAR, "1");
        cmd.arg("exec");

        if let Some(model) = &config.b.model {
            cmd.arg("--model").arg(model);
        }

        match config.b.sandbox {
            Sandbox::ReadOnly => {
                cmd.arg("--sandbox").arg("read-only");
            }
            Sandbox::WorkspaceWrite => {
                cmd.arg("--sandbox").arg("workspace-write");
            }
            Sandbox::DangerFullAccess => {
                cmd.arg("--sandbox").arg("danger-full-access");
            }
            Sandbox::FullAuto => {
                cmd.arg("--full-auto");
            }
            Sandbox::DangerouslyBypassApprovalsAndSandbox => {
                cmd.arg("--dangerously-bypass-approvals-and-sandbox");
            }
        }

        if let Some(id) = session_id {
            cmd.arg("resume").arg(id);
        }

        cmd.arg("--json").arg(prompt);
        cmd
    }
}

impl Default for CodexAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for CodexAdapter {
    async fn run(&self, prompt: &str, session_id: Option<&str>, config: &Config) -> ProviderResult {
        let output = timeout(
            TURN_TIMEOUT,
            self.build_command(prompt, session_id, config).output(),
        )
        .await;

        let output = match output {
            Ok(Ok(o)) => o,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return ProviderResult::failure(
                    ErrorClass::OtherError,
                    "'codex' command not found. Install the Codex CLI and ensure it is on PATH."
                        .to_string(),
                    None,
                    String::new(),
                );
            }
            Ok(Err(e)) => {
                return ProviderResult::failure(
                    ErrorClass::OtherError,
                    format!("failed to execute codex CLI: {e}"),
                    None,
                    String::new(),
                );
            }
            Err(_) => {
                return ProviderResult::failure(
                    ErrorClass::OtherError,
                    "Codex CLI timed out after 5 minutes.".to_string(),
                    None,
                    String::new(),
                );
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let raw = format!("{stdout}{stderr}");

        parse_jsonl(&stdout, &raw, output.status.success())
    }
}

fn parse_jsonl(stdout: &str, raw: &str, exit_success: bool) -> ProviderResult {
    let mut thread_id: Option<String> = None;
    let mut assistant_text: Option<String> = None;
    let mut last_error: Option<Value> = None;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "thread.started" => {
                thread_id = event
                    .get("thread_id")
                    .or_else(|| event.get("id"))
                    .or_else(|| event.get("session_id"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            "item.completed" => {
                let item = event.get("item");
                let is_agent_message = item
                    .and_then(|i| i.get("type"))
                    .and_then(Value::as_str)
                    .map(|t| t == "agent_message")
                    .unwrap_or(false);
                if is_agent_message {
                    let empty = Vec::new();
                    let blocks = item
                        .and_then(|i| i.get("content"))
                        .and_then(Value::as_array)
                        .unwrap_or(&empty);
                    let parts: Vec<&str> = blocks
                        .iter()
                        .filter_map(|block| {
                            block
                                .get("text")
                                .or_else(|| block.get("output_text"))
                                .and_then(Value::as_str)
                                .filter(|t| !t.is_empty())
                        })
                        .collect();
                    if !parts.is_empty() {
                        // Keep the LAST agent_message — the final answer.
                        assistant_text = Some(parts.join("\n"));
                    }
                }
            }
            "error" => {
                last_error = Some(event);
            }
            _ => {}
        }
    }

    if let Some(error_event) = last_error {
        let message = error_event
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error_event.to_string());
        let class = classify_error_event(&error_event, &message);
        return ProviderResult::failure(class, message, thread_id, raw.to_string());
    }

    if !exit_success && assistant_text.is_none() {
        let class = classify(raw, None);
        let message = if raw.is_empty() {
            "Unknown error from Codex CLI".to_string()
        } else {
            raw.to_string()
        };
        return ProviderResult::failure(class, message, thread_id, raw.to_string());
    }

    if let Some(text) = assistant_text {
        return ProviderResult::success(text, thread_id, raw.to_string());
    }

    // Edge case: exit 0, no error event, but also no assistant message.
    ProviderResult::failure(
        ErrorClass::OtherError,
        "No assistant message found in Codex JSONL output.".to_string(),
        thread_id,
        raw.to_string(),
    )
}

/// 429 can mean either quota exhaustion or a transient rate limit —
/// disambiguate using the message content, same rule as [`classify`].
fn classify_error_event(event: &Value, message: &str) -> ErrorClass {
    let status = event.get("status").and_then(Value::as_u64).map(|s| s as u16);
    classify(message, status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thread_started_and_agent_message() {
        let stdout = concat!(
            r#"{"type":"thread.started","thread_id":"thread_abc123"}"#,
            "\n",
            r#"{"type":"item.completed","item":{"type":"agent_message","content":[{"type":"output_text","text":"Hello!"}]}}"#,
            "\n",
        );
        let result = parse_jsonl(stdout, stdout, true);
        assert!(result.success);
        assert_eq!(result.text.as_deref(), Some("Hello!"));
        assert_eq!(result.session_id.as_deref(), Some("thread_abc123"));
    }

    #[test]
    fn keeps_only_last_agent_message() {
        let stdout = concat!(
            r#"{"type":"item.completed","item":{"type":"agent_message","content":[{"text":"first"}]}}"#,
            "\n",
            r#"{"type":"item.completed","item":{"type":"agent_message","content":[{"text":"final"}]}}"#,
            "\n",
        );
        let result = parse_jsonl(stdout, stdout, true);
        assert_eq!(result.text.as_deref(), Some("final"));
    }

    #[test]
    fn error_event_wins_over_partial_success_text() {
        let stdout = concat!(
            r#"{"type":"item.completed","item":{"type":"agent_message","content":[{"text":"partial"}]}}"#,
            "\n",
            r#"{"type":"error","message":"quota exhausted","status":429}"#,
            "\n",
        );
        let result = parse_jsonl(stdout, stdout, false);
        assert!(!result.success);
        assert_eq!(result.error_class, Some(ErrorClass::QuotaExhausted));
    }

    #[test]
    fn non_json_lines_are_skipped() {
        let stdout = concat!(
            "some progress output\n",
            r#"{"type":"item.completed","item":{"type":"agent_message","content":[{"text":"ok"}]}}"#,
            "\n",
        );
        let result = parse_jsonl(stdout, stdout, true);
        assert!(result.success);
        assert_eq!(result.text.as_deref(), Some("ok"));
    }

    #[test]
    fn exit_zero_with_no_message_is_other_error() {
        let result = parse_jsonl("", "", true);
        assert!(!result.success);
        assert_eq!(result.error_class, Some(ErrorClass::OtherError));
        assert_eq!(
            result.error_message.as_deref(),
            Some("No assistant message found in Codex JSONL output.")
        );
    }

    #[test]
    fn nonzero_exit_without_error_event_falls_back_to_text_classification() {
        let result = parse_jsonl("", "401 unauthorized", false);
        assert!(!result.success);
        assert_eq!(result.error_class, Some(ErrorClass::AuthRequired));
    }
}
