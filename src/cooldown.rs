//! Cooldown Policy (C4): decides the {`until`, `source`, `reason`,
//! `message_excerpt`} tuple for a provider cooldown, given a classified
//! error and — for quota exhaustion — an attempt to parse a provider-stated
//! reset time out of the error text.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::state::model::Cooldown;

/// 12-hour reset time with a parenthesized IANA zone, e.g.
/// `"resets at 6pm (America/Los_Angeles)"`.
static RESET_TIME_12H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)resets?\s+(?:at\s+)?(?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?\s*(?P<ampm>am|pm)\s*[.,:;\-·]?\s*\((?P<tz>[^)]+)\)",
    )
    .expect("valid regex")
});

/// 24-hour reset time with a parenthesized IANA zone, e.g.
/// `"resets at 18:00 (America/Los_Angeles)"`.
static RESET_TIME_24H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)resets?\s+(?:at\s+)?(?P<hour>[01]?\d|2[0-3]):(?P<minute>[0-5]\d)\s*[.,:;\-·]?\s*\((?P<tz>[^)]+)\)",
    )
    .expect("valid regex")
});

/// The {until, source, reason, message_excerpt} tuple a cooldown decision
/// produces, before it's written into a `Cooldown` alongside `started_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownDecision {
    pub until: DateTime<Utc>,
    pub source: String,
    pub reason: String,
    pub message_excerpt: Option<String>,
}

impl CooldownDecision {
    pub fn into_cooldown(self, started_at: DateTime<Utc>) -> Cooldown {
        Cooldown {
            until: self.until,
            started_at,
            source: self.source,
            reason: self.reason,
            message_excerpt: self.message_excerpt,
        }
    }
}

/// Decide the cooldown for a `QuotaExhausted` classification. Prefers a
/// reset time parsed from the provider's own error message; falls back to a
/// fixed-duration cooldown from now.
pub fn quota_cooldown_decision(
    error_message: Option<&str>,
    now_utc: DateTime<Utc>,
    default_minutes: i64,
) -> CooldownDecision {
    if let Some(reset_until) = extract_reset_time_utc(error_message, now_utc) {
        if reset_until > now_utc {
            return CooldownDecision {
                until: reset_until,
                source: "quota_reset_time".to_string(),
                reason: "quota-exhausted:provider-reset-time".to_string(),
                message_excerpt: message_excerpt(error_message, 240),
            };
        }
    }

    CooldownDecision {
        until: now_utc + ChronoDuration::minutes(default_minutes),
        source: "quota_default".to_string(),
        reason: "quota-exhausted:default-cooldown".to_string(),
        message_excerpt: message_excerpt(error_message, 240),
    }
}

/// Decide the cooldown applied after a `TransientRateLimit` exhausts its
/// retries on the same provider.
pub fn transient_cooldown_decision(
    now_utc: DateTime<Utc>,
    cooldown_minutes: i64,
    error_message: Option<&str>,
) -> CooldownDecision {
    CooldownDecision {
        until: now_utc + ChronoDuration::minutes(cooldown_minutes),
        source: "transient_retry_exhausted".to_string(),
        reason: "transient-rate-limit:retries-exhausted".to_string(),
        message_excerpt: message_excerpt(error_message, 240),
    }
}

fn message_excerpt(message: Option<&str>, limit: usize) -> Option<String> {
    let message = message?;
    let normalized = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= limit {
        return Some(normalized);
    }
    let truncated: String = normalized.chars().take(limit).collect();
    Some(format!("{truncated}..."))
}

/// Try both accepted reset-time shapes in turn; the first to match wins.
fn extract_reset_time_utc(message: Option<&str>, now_utc: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let message = message?;
    extract_12h(message, now_utc).or_else(|| extract_24h(message, now_utc))
}

fn extract_12h(message: &str, now_utc: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RESET_TIME_12H.captures(message)?;
    let hour_12: u32 = caps.name("hour")?.as_str().parse().ok()?;
    let minute: u32 = caps
        .name("minute")
        .map(|m| m.as_str().parse().unwrap_or(0))
        .unwrap_or(0);
    if !(1..=12).contains(&hour_12) {
        return None;
    }
    let ampm = caps.name("ampm")?.as_str().to_ascii_lowercase();
    let hour_24 = (hour_12 % 12) + if ampm == "pm" { 12 } else { 0 };
    build_reset_time_utc(now_utc, caps.name("tz")?.as_str().trim(), hour_24, minute)
}

fn extract_24h(message: &str, now_utc: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RESET_TIME_24H.captures(message)?;
    let hour_24: u32 = caps.name("hour")?.as_str().parse().ok()?;
    let minute: u32 = caps.name("minute")?.as_str().parse().ok()?;
    build_reset_time_utc(now_utc, caps.name("tz")?.as_str().trim(), hour_24, minute)
}

/// Resolve `tz_name` as an IANA zone, compute the next future instant at
/// `hour_24:minute` local wall-clock time in that zone (rolling to the next
/// day if it has already passed today), and convert back to UTC.
fn build_reset_time_utc(
    now_utc: DateTime<Utc>,
    tz_name: &str,
    hour_24: u32,
    minute: u32,
) -> Option<DateTime<Utc>> {
    if hour_24 > 23 || minute > 59 {
        return None;
    }
    let tz = Tz::from_str(tz_name).ok()?;

    let local_now = now_utc.with_timezone(&tz);
    let mut local_reset = tz
        .with_ymd_and_hms(
            local_now.year(),
            local_now.month(),
            local_now.day(),
            hour_24,
            minute,
            0,
        )
        .single()?;

    if local_reset <= local_now {
        local_reset += ChronoDuration::days(1);
    }

    Some(local_reset.with_timezone(&Utc))
}
