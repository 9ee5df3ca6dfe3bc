//! Data model shared by the state store, router, and handoff builder.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two supported provider identities. Ordering in configuration is a
/// permutation of these two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    A,
    B,
}

impl Provider {
    /// Parse a provider name from configuration (`"a"`/`"b"`, case-insensitive).
    /// Unknown names return `None` — callers skip them (spec.md §4.6 step 1).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a" => Some(Provider::A),
            "b" => Some(Provider::B),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::A => "a",
            Provider::B => "b",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed taxonomy of provider error classes (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// Plan/monthly limit hit; long cooldown, switch immediately.
    QuotaExhausted,
    /// Backpressure; retry same provider with backoff, then short cooldown and switch.
    TransientRateLimit,
    /// Credential or token problem; surface to user, no retry, no switch.
    AuthRequired,
    /// Anything else; surface to user, no retry, no switch.
    OtherError,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::QuotaExhausted => "QUOTA_EXHAUSTED",
            ErrorClass::TransientRateLimit => "TRANSIENT_RATE_LIMIT",
            ErrorClass::AuthRequired => "AUTH_REQUIRED",
            ErrorClass::OtherError => "OTHER_ERROR",
        };
        write!(f, "{s}")
    }
}

/// Active cooldown bookkeeping for one provider. All five fields are either
/// all-null or all-non-null, except `message_excerpt` which may be null even
/// while a cooldown is active (spec.md §3 invariant).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cooldown {
    pub until: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub source: String,
    pub reason: String,
    pub message_excerpt: Option<String>,
}

/// Per-provider runtime state, tracked across turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderState {
    /// Opaque session/thread id from the last successful turn, used for resumption.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cooldown: Option<Cooldown>,
    #[serde(default)]
    pub consecutive_errors: u32,
}

impl ProviderState {
    /// A provider is available at instant `now` iff its cooldown is absent
    /// or has already elapsed (spec.md §4.4).
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        match &self.cooldown {
            Some(c) => c.until <= now,
            None => true,
        }
    }

    /// Clear all cooldown bookkeeping and reset the error counter, as done
    /// after a successful turn (spec.md §4.6 step 2e).
    pub fn record_success(&mut self, session_id: Option<String>, now: DateTime<Utc>) {
        if let Some(id) = session_id {
            self.session_id = Some(id);
        }
        self.last_used = Some(now);
        self.consecutive_errors = 0;
        self.cooldown = None;
    }
}

/// Durable per-repository state (`.switchboard/state.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoState {
    #[serde(default)]
    pub last_provider: Option<Provider>,
    #[serde(default)]
    pub a: ProviderState,
    #[serde(default)]
    pub b: ProviderState,
    #[serde(default)]
    pub turn_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for RepoState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            last_provider: None,
            a: ProviderState::default(),
            b: ProviderState::default(),
            turn_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl RepoState {
    pub fn get(&self, provider: Provider) -> &ProviderState {
        match provider {
            Provider::A => &self.a,
            Provider::B => &self.b,
        }
    }

    pub fn get_mut(&mut self, provider: Provider) -> &mut ProviderState {
        match provider {
            Provider::A => &mut self.a,
            Provider::B => &mut self.b,
        }
    }
}

/// Decision ∈ {null, "approved", "denied"} recorded for a provider switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchDecision {
    Approved,
    Denied,
}

/// Switch metadata attached to a transcript record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchMeta {
    #[serde(default)]
    pub switch_from: Option<Provider>,
    #[serde(default)]
    pub switch_to: Option<Provider>,
    #[serde(default)]
    pub switch_prompt_decision: Option<SwitchDecision>,
}

/// One append-only transcript record (`.switchboard/transcript.ndjson`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub timestamp: DateTime<Utc>,
    pub provider: Option<Provider>,
    pub user_prompt: String,
    pub assistant_text: Option<String>,
    pub session_id: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub cooldown: Option<Cooldown>,
    #[serde(flatten)]
    pub switch: SwitchMeta,
}

/// Transient metadata about the in-flight turn (`.switchboard/active.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRun {
    pub pid: u32,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub provider: Option<Provider>,
    pub prompt_excerpt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parse_accepts_known_names_case_insensitively() {
        assert_eq!(Provider::parse("a"), Some(Provider::A));
        assert_eq!(Provider::parse("A"), Some(Provider::A));
        assert_eq!(Provider::parse("b"), Some(Provider::B));
        assert_eq!(Provider::parse("codex"), None);
    }

    #[test]
    fn provider_state_available_when_no_cooldown() {
        let ps = ProviderState::default();
        assert!(ps.is_available_at(Utc::now()));
    }

    #[test]
    fn provider_state_unavailable_during_cooldown() {
        let now = Utc::now();
        let mut ps = ProviderState::default();
        ps.cooldown = Some(Cooldown {
            until: now + chrono::Duration::minutes(5),
            started_at: now,
            source: "quota_default".into(),
            reason: "quota-exhausted:default-cooldown".into(),
            message_excerpt: None,
        });
        assert!(!ps.is_available_at(now));
        assert!(ps.is_available_at(now + chrono::Duration::minutes(10)));
    }

    #[test]
    fn record_success_clears_cooldown_and_errors() {
        let now = Utc::now();
        let mut ps = ProviderState::default();
        ps.consecutive_errors = 3;
        ps.cooldown = Some(Cooldown {
            until: now + chrono::Duration::minutes(5),
            started_at: now,
            source: "quota_default".into(),
            reason: "r".into(),
            message_excerpt: None,
        });
        ps.record_success(Some("sess-1".into()), now);
        assert_eq!(ps.consecutive_errors, 0);
        assert!(ps.cooldown.is_none());
        assert_eq!(ps.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn record_success_without_new_session_id_keeps_prior_one() {
        let now = Utc::now();
        let mut ps = ProviderState::default();
        ps.session_id = Some("old".into());
        ps.record_success(None, now);
        assert_eq!(ps.session_id.as_deref(), Some("old"));
    }

    #[test]
    fn repo_state_default_has_zero_turns_and_no_provider() {
        let state = RepoState::default();
        assert_eq!(state.turn_count, 0);
        assert!(state.last_provider.is_none());
    }
}
