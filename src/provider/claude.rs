//! Variant A adapter: wraps a `claude`-style CLI.
//!
//! New session:    claude -p "<prompt>" --output-format json
//! Resume session: claude -r <session_id> -p "<prompt>" --output-format json
//!
//! `--output-format json` returns a single JSON object on stdout:
//! `{"type": "result", "result": "...", "session_id": "...", "is_error": false, ...}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::Config;

use super::classify::classify;
use super::{ProviderAdapter, ProviderResult};

/// Hard per-turn limit, matching the original CLI's own 5-minute timeout.
const TURN_TIMEOUT: Duration = Duration::from_secs(300);

/// If the primary executable name is missing from PATH, retry once under
/// this alternate name before giving up (spec.md §4.2: "Variant A
/// additionally retries with an alternate executable name").
const ALTERNATE_EXECUTABLE: &str = "claude-code";
const PRIMARY_EXECUTABLE: &str = "claude";

/// Set in the child's environment so a wrapper shim that itself invokes
/// switchboard cannot recurse into another routed turn.
const RECURSION_GUARD_VAR: &str = "SWITCHBOARD_INNER_PROVIDER_CALL";

#[derive(Debug, Deserialize)]
struct ResultEnvelope {
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    result: String,
    #[serde(default)]
    session_id: Option<String>,
}

pub struct ClaudeAdapter;

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self
    }

    fn build_command(&self, exe: &str, prompt: &str, session_id: Option<&str>, config: &Config) -> Command {
        let mut cmd = Command::new(exe);
        cmd.env(RECURSION_GUARD_VAR, "1");
        if let Some(id) = session_id {
            cmd.arg("-r").arg(id);
        }
        cmd.arg("-p").arg(prompt).arg("--output-format").arg("json");
        for tool in &config.a.allowed_tools {
            cmd.arg("--allowedTools").arg(tool);
        }
        cmd
    }

    async fn run_once(
        &self,
        exe: &str,
        prompt: &str,
        session_id: Option<&str>,
        config: &Config,
    ) -> Result<ProviderResult, std::io::Error> {
        let output = timeout(
            TURN_TIMEOUT,
            self.build_command(exe, prompt, session_id, config).output(),
        )
        .await
        .map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::TimedOut, "claude CLI timed out")
        })??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let raw = format!("{stdout}{stderr}");

        Ok(parse(&stdout, &raw, output.status.success()))
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeAdapter {
    async fn run(&self, prompt: &str, session_id: Option<&str>, config: &Config) -> ProviderResult {
        match self.run_once(PRIMARY_EXECUTABLE, prompt, session_id, config).await {
            Ok(result) => result,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match self
                    .run_once(ALTERNATE_EXECUTABLE, prompt, session_id, config)
                    .await
                {
                    Ok(result) => result,
                    Err(_) => ProviderResult::failure(
                        crate::state::model::ErrorClass::OtherError,
                        format!(
                            "neither '{PRIMARY_EXECUTABLE}' nor '{ALTERNATE_EXECUTABLE}' was found on PATH"
                        ),
                        None,
                        String::new(),
                    ),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => ProviderResult::failure(
                crate::state::model::ErrorClass::OtherError,
                "Claude CLI timed out after 5 minutes.".to_string(),
                None,
                String::new(),
            ),
            Err(e) => ProviderResult::failure(
                crate::state::model::ErrorClass::OtherError,
                format!("failed to execute claude CLI: {e}"),
                None,
                String::new(),
            ),
        }
    }
}

fn parse(stdout: &str, raw: &str, exit_success: bool) -> ProviderResult {
    let trimmed = stdout.trim();

    if !trimmed.is_empty() {
        if let Ok(envelope) = serde_json::from_str::<ResultEnvelope>(trimmed) {
            if !envelope.is_error {
                // Empty text is still a valid success (spec.md §4.2 edge case).
                return ProviderResult::success(
                    envelope.result,
                    envelope.session_id,
                    raw.to_string(),
                );
            }
            let error_msg = if envelope.result.is_empty() {
                raw.to_string()
            } else {
                envelope.result
            };
            let class = classify(&error_msg, None);
            return ProviderResult::failure(class, error_msg, envelope.session_id, raw.to_string());
        }
    }

    // No valid JSON. This shouldn't happen with --output-format json, but be
    // safe: a zero exit with plain-text stdout is still a success.
    if exit_success && !trimmed.is_empty() {
        return ProviderResult::success(trimmed.to_string(), None, raw.to_string());
    }

    let message = if raw.is_empty() {
        "Unknown error from Claude CLI".to_string()
    } else {
        raw.to_string()
    };
    let class = classify(raw, None);
    ProviderResult::failure(class, message, None, raw.to_string())
}
