//! Deterministic, case-insensitive mapping from raw provider output to the
//! closed [`ErrorClass`] taxonomy (spec.md §4.3).
//!
//! Rules are evaluated in order; the first match wins. This is pure and
//! provider-agnostic — both adapters route their combined stdout/stderr (or
//! structured error event message) through the same [`classify`].

use std::sync::LazyLock;

use regex::RegexSet;

use crate::state::model::ErrorClass;

const RATE_LIMIT_PHRASES: &[&str] = &["rate limit", "too many requests", "overloaded", "quota"];
const QUOTA_QUALIFIERS: &[&str] = &["quota", "usage limit", "exhausted"];
const AUTH_PHRASES: &[&str] = &[
    "unauthorized",
    "authentication",
    "invalid api key",
    "log in",
    "not authenticated",
];
const PLAN_EXHAUSTION_PHRASES: &[&str] = &[
    "usage limit reached",
    "monthly limit",
    "you've reached your",
    "claude.ai/settings/limits",
];

/// Phrases that, on an otherwise-`OtherError` message, indicate the provider
/// actually meant a plan/quota exhaustion it failed to flag cleanly (used by
/// the router's defensive reclassification, spec.md §4.3).
const LIMIT_TEXT_PATTERNS: &[&str] = &[
    "usage limit",
    "quota",
    "hit your limit",
    "limit reached",
    "billing period",
    "resets",
    "claude.ai/settings/limits",
];

static RATE_LIMIT_SET: LazyLock<RegexSet> = LazyLock::new(|| build_set(RATE_LIMIT_PHRASES));
static QUOTA_QUALIFIER_SET: LazyLock<RegexSet> = LazyLock::new(|| build_set(QUOTA_QUALIFIERS));
static AUTH_SET: LazyLock<RegexSet> = LazyLock::new(|| build_set(AUTH_PHRASES));
static PLAN_EXHAUSTION_SET: LazyLock<RegexSet> =
    LazyLock::new(|| build_set(PLAN_EXHAUSTION_PHRASES));
static LIMIT_TEXT_SET: LazyLock<RegexSet> = LazyLock::new(|| build_set(LIMIT_TEXT_PATTERNS));

fn build_set(phrases: &[&str]) -> RegexSet {
    let patterns: Vec<String> = phrases.iter().map(|p| regex::escape(p)).collect();
    RegexSet::new(patterns).expect("static classifier patterns are valid regexes")
}

const RATE_LIMIT_STATUS: u16 = 429;
const AUTH_STATUS: u16 = 401;

/// Classify raw provider output (combined stdout/stderr, or a structured
/// error event's message) into the closed error taxonomy.
pub fn classify(text: &str, status: Option<u16>) -> ErrorClass {
    let lower = text.to_lowercase();

    if status == Some(RATE_LIMIT_STATUS) || RATE_LIMIT_SET.is_match(&lower) {
        return if QUOTA_QUALIFIER_SET.is_match(&lower) {
            ErrorClass::QuotaExhausted
        } else {
            ErrorClass::TransientRateLimit
        };
    }

    if status == Some(AUTH_STATUS) || AUTH_SET.is_match(&lower) {
        return ErrorClass::AuthRequired;
    }

    if PLAN_EXHAUSTION_SET.is_match(&lower) {
        return ErrorClass::QuotaExhausted;
    }

    ErrorClass::OtherError
}

/// The router's defensive reclassification: an `OtherError` whose message
/// reads like a plan-limit message the classifier above failed to catch is
/// treated as `QuotaExhausted` before cooldown application.
pub fn looks_like_limit_exhaustion(message: Option<&str>) -> bool {
    match message {
        Some(m) if !m.is_empty() => LIMIT_TEXT_SET.is_match(&m.to_lowercase()),
        _ => false,
    }
}
