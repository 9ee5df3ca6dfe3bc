//! Handoff document management and git repo snapshotting.
//!
//! `handoff.md` is the primary mechanism for transferring context between
//! providers. It lives at `.switchboard/handoff.md` and is overwritten each
//! turn (not appended) so it stays compact and under the configured line
//! limit. When switching providers, the router prepends the handoff content
//! plus a live git snapshot to the outgoing prompt so the new provider picks
//! up exactly where the previous one left off.

use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::Config;

const GIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a git subcommand, returning stdout on success or an empty string on
/// any failure (not a repo, binary missing, non-zero exit, timeout).
async fn run_git(args: &[&str]) -> String {
    let result = timeout(GIT_TIMEOUT, Command::new("git").args(args).output()).await;
    match result {
        Ok(Ok(output)) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).into_owned()
        }
        _ => String::new(),
    }
}

/// Build a compact Markdown git snapshot for context injection: status, the
/// last 5 commits, diff stat, and the full diff if it fits the configured
/// size limits. Returns an empty string outside a git work tree.
pub async fn repo_snapshot(config: &Config) -> String {
    let inside_work_tree = run_git(&["rev-parse", "--is-inside-work-tree"]).await;
    if inside_work_tree.trim() != "true" {
        return String::new();
    }

    let mut parts: Vec<String> = vec!["## Repo Snapshot\n".to_string()];

    let status = run_git(&["status", "--porcelain"]).await;
    if !status.trim().is_empty() {
        parts.push(format!("**Status:**\n```\n{}\n```\n", status.trim()));
    }

    let log = run_git(&["log", "-n", "5", "--oneline"]).await;
    if !log.trim().is_empty() {
        parts.push(format!("**Recent commits:**\n```\n{}\n```\n", log.trim()));
    }

    let diff_stat = run_git(&["diff", "--stat"]).await;
    if !diff_stat.trim().is_empty() {
        parts.push(format!("**Diff stat:**\n```\n{}\n```\n", diff_stat.trim()));
    }

    let diff = run_git(&["diff"]).await;
    if !diff.trim().is_empty() {
        let n_lines = diff.matches('\n').count();
        let n_bytes = diff.len();
        if n_lines <= config.limits.max_diff_lines && n_bytes <= config.limits.max_diff_bytes {
            parts.push(format!("**Full diff:**\n```diff\n{}\n```\n", diff.trim()));
        } else {
            parts.push(format!(
                "**Full diff omitted** ({n_lines} lines, {n_bytes} bytes). Inspect individual files as needed.\n"
            ));
        }
    }

    parts.join("\n")
}

/// Build the full prompt string to send to a provider.
///
/// When `is_resuming` is true — switching providers mid-session, or starting
/// fresh on a provider with no session of its own — the handoff content and a
/// live git snapshot are prepended ahead of the user's prompt. When false
/// (continuing on the same provider with an active session) the prompt
/// passes through unchanged, since the provider's own session history already
/// carries the context.
pub async fn build_provider_prompt(
    user_prompt: &str,
    config: &Config,
    is_resuming: bool,
    handoff_content: Option<&str>,
) -> String {
    if !is_resuming {
        return user_prompt.to_string();
    }

    let mut sections = Vec::new();

    if let Some(handoff) = handoff_content {
        if !handoff.is_empty() {
            sections.push(format!("## Context Handoff (from previous session)\n\n{handoff}"));
        }
    }

    let snapshot = repo_snapshot(config).await;
    if !snapshot.is_empty() {
        sections.push(snapshot);
    }

    sections.push(format!("## Current Task\n\n{user_prompt}"));

    sections.join("\n\n---\n\n")
}

/// Generate a fresh `handoff.md` capturing the current session state.
///
/// The Goal / Plan / Blockers sections are carried forward verbatim from the
/// previous handoff, since those are stable across turns; only the
/// What-Changed section reflects this turn's exchange.
pub fn update_handoff(
    user_prompt: &str,
    assistant_text: &str,
    provider_label: &str,
    config: &Config,
    previous_handoff: Option<&str>,
) -> String {
    let max_lines = config.limits.max_handoff_lines;
    let now = Utc::now().format("%Y-%m-%d %H:%M UTC");

    let previous = previous_handoff.unwrap_or("");
    let prev_goal = extract_section(previous, "Current Goal");
    let prev_plan = extract_section(previous, "Current Plan");
    let prev_blockers = extract_section(previous, "Open Questions / Blockers");

    let content = format!(
        "# Switchboard Handoff\n\n\
         *Last updated: {now} — Provider: {provider_label}*\n\n\
         ## Current Goal\n\n\
         {}\n\n\
         ## Current Plan\n\n\
         {}\n\n\
         ## What Changed This Turn\n\n\
         **User asked:**\n{}\n\n\
         **{provider_label} responded:**\n{}\n\n\
         ## Open Questions / Blockers\n\n\
         {}\n\n\
         ## Next Concrete Steps\n\n\
         (Derive from the assistant response above and update this section.)\n",
        non_empty_or(&prev_goal, "(not yet established — infer from the exchange below)"),
        non_empty_or(&prev_plan, "(not yet established — infer from the exchange below)"),
        truncate_chars(user_prompt, 600),
        truncate_chars(assistant_text, 2000),
        non_empty_or(&prev_blockers, "(none noted yet)"),
    );

    enforce_line_limit(&content, max_lines)
}

fn non_empty_or<'a>(s: &'a str, fallback: &'a str) -> &'a str {
    if s.is_empty() { fallback } else { s }
}

/// Extract the body of a level-2 Markdown section (`## Section Name`).
/// Returns an empty string if the section is not present.
fn extract_section(text: &str, section_name: &str) -> String {
    let header = format!("## {section_name}");
    let mut in_section = false;
    let mut body = Vec::new();
    for line in text.lines() {
        if line.starts_with(&header) {
            in_section = true;
            continue;
        }
        if in_section {
            if line.starts_with("## ") {
                break;
            }
            body.push(line);
        }
    }
    body.join("\n").trim().to_string()
}

/// Truncate `text` to `max_chars`, noting how much was dropped.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    let dropped = text.chars().count() - max_chars;
    format!("{truncated}\n…[{dropped} chars truncated]")
}

/// If `text` exceeds `max_lines`, drop the middle, keeping the top third and
/// the bottom two-thirds so the goal header and next-steps footer both survive.
fn enforce_line_limit(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.to_string();
    }

    let keep_top = max_lines / 3;
    let keep_bottom = max_lines.saturating_sub(keep_top + 3);
    let dropped = lines.len() - keep_top - keep_bottom;

    let mut trimmed: Vec<&str> = Vec::with_capacity(max_lines);
    trimmed.extend_from_slice(&lines[..keep_top]);
    trimmed.push("");
    let notice = format!("[… {dropped} lines omitted to stay within the {max_lines}-line limit …]");
    trimmed.push(&notice);
    trimmed.push("");
    trimmed.extend_from_slice(&lines[lines.len() - keep_bottom..]);

    trimmed.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_section_returns_body_between_headers() {
        let text = "## Current Goal\n\nShip the thing.\n\n## Current Plan\n\nStep one.\n";
        assert_eq!(extract_section(text, "Current Goal"), "Ship the thing.");
        assert_eq!(extract_section(text, "Current Plan"), "Step one.");
    }

    #[test]
    fn extract_section_missing_returns_empty() {
        assert_eq!(extract_section("no sections here", "Current Goal"), "");
    }

    #[test]
    fn truncate_chars_under_limit_is_unchanged() {
        assert_eq!(truncate_chars("short", 600), "short");
    }

    #[test]
    fn truncate_chars_over_limit_notes_drop_count() {
        let text = "a".repeat(10);
        let out = truncate_chars(&text, 4);
        assert!(out.starts_with("aaaa"));
        assert!(out.contains("6 chars truncated"));
    }

    #[test]
    fn enforce_line_limit_keeps_top_and_bottom() {
        let lines: Vec<String> = (0..100).map(|i| format!("line {i}")).collect();
        let text = lines.join("\n");
        let out = enforce_line_limit(&text, 10);
        assert!(out.contains("line 0"));
        assert!(out.contains("line 99"));
        assert!(out.contains("omitted"));
    }

    #[test]
    fn enforce_line_limit_under_limit_is_unchanged() {
        let text = "a\nb\nc";
        assert_eq!(enforce_line_limit(text, 10), text);
    }

    #[test]
    fn update_handoff_carries_forward_goal_and_plan() {
        let config = Config::default();
        let previous = "# Switchboard Handoff\n\n## Current Goal\n\nFix the bug.\n\n## Current Plan\n\nWrite a test first.\n\n## Open Questions / Blockers\n\nNone.\n";
        let out = update_handoff("do X", "did X", "a", &config, Some(previous));
        assert!(out.contains("Fix the bug."));
        assert!(out.contains("Write a test first."));
        assert!(out.contains("did X"));
    }

    #[test]
    fn update_handoff_with_no_previous_uses_placeholders() {
        let config = Config::default();
        let out = update_handoff("do X", "did X", "b", &config, None);
        assert!(out.contains("not yet established"));
        assert!(out.contains("none noted yet"));
    }
}
