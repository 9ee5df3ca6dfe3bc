//! Provider Adapter (C2): the boundary between the router and the two
//! underlying interactive coding-assistant CLIs.

pub mod claude;
pub mod classify;
pub mod codex;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::state::model::{ErrorClass, Provider};

/// Unified result from a single provider CLI invocation. Callers check
/// `success` first, then read either `text` or `error_class`.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub success: bool,
    /// The assistant's full response text. Set only when `success` is true —
    /// though an empty string is a valid response (spec.md §4.2 edge case).
    pub text: Option<String>,
    /// Session/thread id returned by the provider, used for resumption.
    pub session_id: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub error_message: Option<String>,
    /// Combined stdout+stderr, kept for debugging; never shown by default.
    pub raw_output: String,
}

impl ProviderResult {
    pub fn success(text: String, session_id: Option<String>, raw_output: String) -> Self {
        Self {
            success: true,
            text: Some(text),
            session_id,
            error_class: None,
            error_message: None,
            raw_output,
        }
    }

    pub fn failure(
        error_class: ErrorClass,
        error_message: String,
        session_id: Option<String>,
        raw_output: String,
    ) -> Self {
        Self {
            success: false,
            text: None,
            session_id,
            error_class: Some(error_class),
            error_message: Some(truncate_bytes(&error_message, 800)),
            raw_output,
        }
    }
}

fn truncate_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Common interface every provider implementation satisfies: execute one
/// prompt turn against the underlying CLI and report a unified result.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Execute a single prompt turn.
    ///
    /// `prompt` may include prepended handoff context. `session_id`, if set,
    /// requests resumption (provider-specific semantics). Never returns an
    /// `Err` for a provider-side failure — that is reported as data via
    /// `ProviderResult { success: false, .. }` (spec.md §9 "Failure as data").
    async fn run(&self, prompt: &str, session_id: Option<&str>, config: &Config) -> ProviderResult;
}

/// Process-wide table mapping each provider identity to its adapter. Built
/// once and passed explicitly rather than relying on implicit global state
/// (spec.md §9 design note).
pub type ProviderRegistry = HashMap<Provider, Arc<dyn ProviderAdapter>>;

/// Build the registry with the two built-in adapters.
pub fn build_registry() -> ProviderRegistry {
    let mut registry: ProviderRegistry = HashMap::new();
    registry.insert(Provider::A, Arc::new(claude::ClaudeAdapter::new()));
    registry.insert(Provider::B, Arc::new(codex::CodexAdapter::new()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_bytes_under_limit_is_unchanged() {
        assert_eq!(truncate_bytes("short", 800), "short");
    }

    #[test]
    fn truncate_bytes_respects_char_boundaries() {
        let s = "é".repeat(500); // 2 bytes each, 1000 bytes total
        let truncated = truncate_bytes(&s, 800);
        assert!(truncated.len() <= 800);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
    }

    #[test]
    fn registry_has_both_providers() {
        let registry = build_registry();
        assert!(registry.contains_key(&Provider::A));
        assert!(registry.contains_key(&Provider::B));
    }
}
