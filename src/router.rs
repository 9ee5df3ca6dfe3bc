//! Router (C6): orchestrates provider selection, retry, failover,
//! confirmation, and state updates for one turn. This module is otherwise
//! IO-free — all IO happens inside the Provider Adapter and Handoff Builder
//! it calls into. State mutations are returned on the caller's `RepoState`,
//! never persisted here; persistence is the Turn Driver's job (spec.md §3
//! "Ownership").

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::cooldown::{quota_cooldown_decision, transient_cooldown_decision};
use crate::provider::classify::looks_like_limit_exhaustion;
use crate::provider::{ProviderRegistry, ProviderResult};
use crate::state::handoff::build_provider_prompt;
use crate::state::model::{ErrorClass, Provider, RepoState, SwitchDecision, SwitchMeta};

/// Observability hook invoked before the first attempt on each candidate
/// provider. Exceptions/panics here must not affect routing — callers are
/// expected to keep this infallible; there is no `Result` to propagate.
pub type OnProviderStartFn = dyn Fn(Provider) + Send + Sync;

/// Asked before attempting a non-preferred provider. Receives the provider
/// being left, the provider being tried next, and the failure that triggered
/// the fallback. Returning `false` aborts routing without further attempts.
/// When omitted, switching is implicitly approved (spec.md §4.6).
pub type ConfirmSwitchFn = dyn Fn(Provider, Provider, &ProviderResult) -> bool + Send + Sync;

/// Everything the Turn Driver needs to persist a transcript record and
/// decide what to show the user.
pub struct RouteOutcome {
    /// `None` only when every provider was in cooldown and nothing was tried.
    pub result: Option<ProviderResult>,
    /// `None` only when `result` is `None`.
    pub provider_used: Option<Provider>,
    pub switch: SwitchMeta,
}

/// Ordered list of providers by configured preference, excluding any
/// currently in cooldown at `now`. Unknown names in configuration are
/// skipped (spec.md §4.6 step 1).
pub fn available_providers(state: &RepoState, config: &Config, now: DateTime<Utc>) -> Vec<Provider> {
    config
        .provider_order
        .iter()
        .filter_map(|name| Provider::parse(name))
        .filter(|p| state.get(*p).is_available_at(now))
        .collect()
}

/// Run one user prompt to completion against the best available provider.
pub async fn run_with_retry(
    user_prompt: &str,
    state: &mut RepoState,
    config: &Config,
    handoff_content: Option<&str>,
    registry: &ProviderRegistry,
    confirm_switch: Option<&ConfirmSwitchFn>,
    on_provider_start: Option<&OnProviderStartFn>,
    now: DateTime<Utc>,
) -> RouteOutcome {
    let available = available_providers(state, config, now);
    if available.is_empty() {
        return RouteOutcome {
            result: None,
            provider_used: None,
            switch: SwitchMeta::default(),
        };
    }

    let mut result: Option<ProviderResult> = None;
    let mut last_provider: Option<Provider> = None;
    let mut switch = SwitchMeta::default();

    for (idx, provider) in available.iter().copied().enumerate() {
        let is_fallback = idx > 0;

        if is_fallback {
            let from = last_provider.expect("fallback implies a previous attempt");
            switch.switch_from = Some(from);
            switch.switch_to = Some(provider);
        }

        if let Some(on_start) = on_provider_start {
            on_start(provider);
        }

        let prompt = if is_fallback {
            build_provider_prompt(user_prompt, config, true, handoff_content).await
        } else {
            user_prompt.to_string()
        };
        let session_id = if is_fallback {
            None
        } else {
            state.get(provider).session_id.clone()
        };

        if is_fallback {
            let from = last_provider.expect("fallback implies a previous attempt");
            let approved = match confirm_switch {
                Some(confirm) => {
                    let last_result = result.as_ref().expect("fallback implies a prior failure");
                    confirm(from, provider, last_result)
                }
                None => true,
            };
            switch.switch_prompt_decision = Some(if approved {
                SwitchDecision::Approved
            } else {
                SwitchDecision::Denied
            });
            if !approved {
                return RouteOutcome {
                    result,
                    provider_used: Some(from),
                    switch,
                };
            }
        }

        last_provider = Some(provider);

        let adapter = registry
            .get(&provider)
            .expect("registry must have an adapter for every configured provider");

        let mut exhausted_to_next_provider = false;

        for attempt in 0..=config.retry.max_retries {
            let attempt_result = adapter.run(&prompt, session_id.as_deref(), config).await;

            if attempt_result.success {
                let ps = state.get_mut(provider);
                ps.record_success(attempt_result.session_id.clone(), now);
                state.last_provider = Some(provider);
                state.turn_count += 1;
                return RouteOutcome {
                    result: Some(attempt_result),
                    provider_used: Some(provider),
                    switch,
                };
            }

            let ps = state.get_mut(provider);
            ps.consecutive_errors += 1;

            let mut effective_class = attempt_result.error_class.unwrap_or(ErrorClass::OtherError);
            if effective_class == ErrorClass::OtherError
                && looks_like_limit_exhaustion(attempt_result.error_message.as_deref())
            {
                effective_class = ErrorClass::QuotaExhausted;
            }

            match effective_class {
                ErrorClass::QuotaExhausted => {
                    let decision = quota_cooldown_decision(
                        attempt_result.error_message.as_deref(),
                        now,
                        config.retry.cooldown_minutes,
                    );
                    ps.cooldown = Some(decision.into_cooldown(now));
                    result = Some(attempt_result);
                    exhausted_to_next_provider = true;
                }
                ErrorClass::TransientRateLimit => {
                    if attempt < config.retry.max_retries {
                        let wait = (config.retry.backoff_base.powi(attempt as i32))
                            .clamp(0.0, config.retry.backoff_max);
                        result = Some(attempt_result);
                        if wait > 0.0 {
                            tokio::time::sleep(std::time::Duration::from_secs_f64(wait)).await;
                        }
                        continue;
                    } else {
                        let decision = transient_cooldown_decision(
                            now,
                            config.retry.transient_cooldown_minutes,
                            attempt_result.error_message.as_deref(),
                        );
                        ps.cooldown = Some(decision.into_cooldown(now));
                        result = Some(attempt_result);
                        exhausted_to_next_provider = true;
                    }
                }
                ErrorClass::AuthRequired | ErrorClass::OtherError => {
                    return RouteOutcome {
                        result: Some(attempt_result),
                        provider_used: Some(provider),
                        switch,
                    };
                }
            }

            if exhausted_to_next_provider {
                break;
            }
        }
    }

    RouteOutcome {
        result,
        provider_used: last_provider,
        switch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::provider::ProviderAdapter;

    struct ScriptedAdapter {
        responses: std::sync::Mutex<Vec<ProviderResult>>,
        calls: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(responses: Vec<ProviderResult>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        async fn run(&self, _prompt: &str, _session_id: Option<&str>, _config: &Config) -> ProviderResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            }
        }
    }

    fn registry_with(a: ScriptedAdapter, b: ScriptedAdapter) -> ProviderRegistry {
        let mut registry: ProviderRegistry = std::collections::HashMap::new();
        registry.insert(Provider::A, Arc::new(a));
        registry.insert(Provider::B, Arc::new(b));
        registry
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn first_provider_success_increments_turn_count() {
        let a = ScriptedAdapter::new(vec![ProviderResult::success(
            "hi".into(),
            Some("sess-1".into()),
            String::new(),
        )]);
        let b = ScriptedAdapter::new(vec![ProviderResult::success("unused".into(), None, String::new())]);
        let registry = registry_with(a, b);

        let mut state = RepoState::default();
        let config = Config::default();
        let outcome = run_with_retry("hi", &mut state, &config, None, &registry, None, None, now()).await;

        assert_eq!(outcome.provider_used, Some(Provider::A));
        assert!(outcome.result.unwrap().success);
        assert_eq!(state.turn_count, 1);
        assert_eq!(state.a.session_id.as_deref(), Some("sess-1"));
        assert_eq!(state.last_provider, Some(Provider::A));
    }

    #[tokio::test]
    async fn quota_exhaustion_fails_over_to_next_provider() {
        let a = ScriptedAdapter::new(vec![ProviderResult::failure(
            ErrorClass::QuotaExhausted,
            "you've hit your usage limit reached".into(),
            None,
            String::new(),
        )]);
        let b = ScriptedAdapter::new(vec![ProviderResult::success("from b".into(), Some("s2".into()), String::new())]);
        let registry = registry_with(a, b);

        let mut state = RepoState::default();
        let config = Config::default();
        let outcome = run_with_retry("hi", &mut state, &config, None, &registry, None, None, now()).await;

        assert_eq!(outcome.provider_used, Some(Provider::B));
        assert!(outcome.result.unwrap().success);
        assert!(state.a.cooldown.is_some());
        assert_eq!(outcome.switch.switch_from, Some(Provider::A));
        assert_eq!(outcome.switch.switch_to, Some(Provider::B));
        assert_eq!(outcome.switch.switch_prompt_decision, Some(SwitchDecision::Approved));
    }

    #[tokio::test]
    async fn confirm_switch_denied_stops_without_trying_next_provider() {
        let a = ScriptedAdapter::new(vec![ProviderResult::failure(
            ErrorClass::QuotaExhausted,
            "usage limit reached".into(),
            None,
            String::new(),
        )]);
        let b = ScriptedAdapter::new(vec![ProviderResult::success("from b".into(), None, String::new())]);
        let registry = registry_with(a, b);

        let mut state = RepoState::default();
        let config = Config::default();
        let deny = |_from: Provider, _to: Provider, _r: &ProviderResult| false;
        let outcome = run_with_retry("hi", &mut state, &config, None, &registry, Some(&deny), None, now()).await;

        assert_eq!(outcome.provider_used, Some(Provider::A));
        assert!(!outcome.result.unwrap().success);
        assert_eq!(outcome.switch.switch_prompt_decision, Some(SwitchDecision::Denied));
    }

    #[tokio::test]
    async fn transient_rate_limit_retries_then_cools_down_and_fails_over() {
        let mut config = Config::default();
        config.retry.max_retries = 1;
        config.retry.backoff_base = 0.0;

        let a = ScriptedAdapter::new(vec![
            ProviderResult::failure(ErrorClass::TransientRateLimit, "rate limit".into(), None, String::new()),
            ProviderResult::failure(ErrorClass::TransientRateLimit, "rate limit".into(), None, String::new()),
        ]);
        let b = ScriptedAdapter::new(vec![ProviderResult::success("from b".into(), None, String::new())]);
        let registry = registry_with(a, b);

        let mut state = RepoState::default();
        let outcome = run_with_retry("hi", &mut state, &config, None, &registry, None, None, now()).await;

        assert_eq!(outcome.provider_used, Some(Provider::B));
        assert!(state.a.cooldown.is_some());
        assert_eq!(state.a.cooldown.as_ref().unwrap().source, "transient_retry_exhausted");
    }

    #[tokio::test]
    async fn auth_required_surfaces_immediately_without_failover() {
        let a = ScriptedAdapter::new(vec![ProviderResult::failure(
            ErrorClass::AuthRequired,
            "not authenticated".into(),
            None,
            String::new(),
        )]);
        let b = ScriptedAdapter::new(vec![ProviderResult::success("unused".into(), None, String::new())]);
        let registry = registry_with(a, b);

        let mut state = RepoState::default();
        let config = Config::default();
        let outcome = run_with_retry("hi", &mut state, &config, None, &registry, None, None, now()).await;

        assert_eq!(outcome.provider_used, Some(Provider::A));
        assert!(!outcome.result.unwrap().success);
        assert!(state.a.cooldown.is_none());
    }

    #[tokio::test]
    async fn all_providers_in_cooldown_returns_none() {
        let mut state = RepoState::default();
        state.a.cooldown = Some(crate::state::model::Cooldown {
            until: now() + chrono::Duration::minutes(10),
            started_at: now(),
            source: "quota_default".into(),
            reason: "r".into(),
            message_excerpt: None,
        });
        state.b.cooldown = Some(crate::state::model::Cooldown {
            until: now() + chrono::Duration::minutes(10),
            started_at: now(),
            source: "quota_default".into(),
            reason: "r".into(),
            message_excerpt: None,
        });

        let a = ScriptedAdapter::new(vec![ProviderResult::success("unused".into(), None, String::new())]);
        let b = ScriptedAdapter::new(vec![ProviderResult::success("unused".into(), None, String::new())]);
        let registry = registry_with(a, b);
        let config = Config::default();

        let outcome = run_with_retry("hi", &mut state, &config, None, &registry, None, None, now()).await;
        assert!(outcome.result.is_none());
        assert!(outcome.provider_used.is_none());
    }

    #[test]
    fn available_providers_skips_unknown_names_and_cooled_down() {
        let mut config = Config::default();
        config.provider_order = vec!["bogus".into(), "a".into(), "b".into()];
        let mut state = RepoState::default();
        state.a.cooldown = Some(crate::state::model::Cooldown {
            until: now() + chrono::Duration::minutes(10),
            started_at: now(),
            source: "quota_default".into(),
            reason: "r".into(),
            message_excerpt: None,
        });
        let available = available_providers(&state, &config, now());
        assert_eq!(available, vec![Provider::B]);
    }
}
