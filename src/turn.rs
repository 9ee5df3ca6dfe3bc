//! Turn Driver (C7): the single entry point that wires the state store,
//! provider adapters, error classifier, cooldown policy, handoff builder,
//! and router into one full turn.

use chrono::Utc;

use crate::config::Config;
use crate::error::Result;
use crate::provider::{ProviderRegistry, ProviderResult};
use crate::router::{run_with_retry, ConfirmSwitchFn, OnProviderStartFn};
use crate::state::model::{ActiveRun, Provider, TranscriptRecord};
use crate::state::{handoff, store};

const PROMPT_EXCERPT_CHARS: usize = 200;

/// What the caller (CLI layer) needs to render the outcome of one turn.
pub struct TurnOutcome {
    pub success: bool,
    pub provider_used: Option<Provider>,
    pub previous_provider: Option<Provider>,
    pub result: Option<ProviderResult>,
}

/// Clears the active-run marker on drop, so it is removed on every exit path
/// out of [`run_turn`] — success, classified failure, or an early `?` on a
/// state-store write error. Rust has no `finally`; this is the idiomatic
/// substitute (spec.md §4.7 "on any exit").
struct ActiveRunGuard;

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        store::clear_active_run();
    }
}

fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Execute one prompt turn end-to-end: load state and handoff, write the
/// active-run marker, route via retry/failover, persist state, update the
/// handoff document on success, and append one transcript record.
pub async fn run_turn(
    user_prompt: &str,
    mode: &str,
    config: &Config,
    registry: &ProviderRegistry,
    confirm_switch: Option<&ConfirmSwitchFn>,
    on_provider_start: Option<&OnProviderStartFn>,
) -> Result<TurnOutcome> {
    let span = tracing::info_span!("turn", mode, prompt_len = user_prompt.len());
    let _entered = span.enter();

    let mut state = store::load_state();
    let previous_provider = state.last_provider;
    let handoff_content = store::load_handoff();

    store::save_active_run(&ActiveRun {
        pid: std::process::id(),
        mode: mode.to_string(),
        started_at: Utc::now(),
        provider: None,
        prompt_excerpt: truncate_excerpt(user_prompt, PROMPT_EXCERPT_CHARS),
    })?;
    let _guard = ActiveRunGuard;

    let now = Utc::now();
    let outcome = run_with_retry(
        user_prompt,
        &mut state,
        config,
        handoff_content.as_deref(),
        registry,
        confirm_switch,
        on_provider_start,
        now,
    )
    .await;

    store::save_state(&mut state)?;

    let Some(result) = outcome.result else {
        tracing::warn!("all configured providers are in cooldown");
        return Ok(TurnOutcome {
            success: false,
            provider_used: None,
            previous_provider,
            result: None,
        });
    };

    let provider = outcome.provider_used.expect("a result implies a provider was used");

    if result.success {
        let assistant_text = result.text.clone().unwrap_or_default();
        let new_handoff = handoff::update_handoff(
            user_prompt,
            &assistant_text,
            provider.as_str(),
            config,
            handoff_content.as_deref(),
        );
        store::save_handoff(&new_handoff)?;

        let ps = state.get(provider);
        store::append_transcript(&TranscriptRecord {
            timestamp: now,
            provider: Some(provider),
            user_prompt: user_prompt.to_string(),
            assistant_text: Some(assistant_text),
            session_id: ps.session_id.clone(),
            error: None,
            cooldown: None,
            switch: outcome.switch,
        })?;

        Ok(TurnOutcome {
            success: true,
            provider_used: Some(provider),
            previous_provider,
            result: Some(result),
        })
    } else {
        let ps = state.get(provider);
        let error_text = match result.error_class {
            Some(class) => format!("{class}: {}", result.error_message.clone().unwrap_or_default()),
            None => result.error_message.clone().unwrap_or_default(),
        };
        let session_id = result.session_id.clone().or_else(|| ps.session_id.clone());

        store::append_transcript(&TranscriptRecord {
            timestamp: now,
            provider: Some(provider),
            user_prompt: user_prompt.to_string(),
            assistant_text: None,
            session_id,
            error: Some(error_text),
            cooldown: ps.cooldown.clone(),
            switch: outcome.switch,
        })?;

        Ok(TurnOutcome {
            success: false,
            provider_used: Some(provider),
            previous_provider,
            result: Some(result),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_excerpt_under_limit_is_unchanged() {
        assert_eq!(truncate_excerpt("short", 200), "short");
    }

    #[test]
    fn truncate_excerpt_over_limit_is_cut() {
        let long = "a".repeat(500);
        assert_eq!(truncate_excerpt(&long, 200).chars().count(), 200);
    }
}
