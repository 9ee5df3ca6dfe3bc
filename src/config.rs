//! Layered configuration loading.
//!
//! Precedence (lowest to highest): built-in defaults ← user-global
//! (`~/.config/switchboard/config.toml`) ← repo-local
//! (`.switchboard/config.toml`). Nested groups deep-merge; scalars and
//! sequences are shallow-overridden by the higher-priority source.
//!
//! Loading never fails: a missing or unparsable layer is skipped (with a
//! `tracing::warn!`), exactly like state-store reads degrading to defaults
//! (spec.md §4.1) — configuration is read-only at runtime and hand-edited,
//! so a typo in one layer should not prevent the tool from running at all.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::state::store::{REPO_CONFIG_FILE, user_config_file};

/// Sandbox policy forwarded to Provider B. Unknown values in configuration
/// silently coerce to `ReadOnly` (spec.md §6 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sandbox {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
    FullAuto,
    DangerouslyBypassApprovalsAndSandbox,
}

impl Default for Sandbox {
    fn default() -> Self {
        Sandbox::ReadOnly
    }
}

impl Sandbox {
    fn parse(raw: &str) -> Sandbox {
        match raw {
            "read-only" => Sandbox::ReadOnly,
            "workspace-write" => Sandbox::WorkspaceWrite,
            "danger-full-access" => Sandbox::DangerFullAccess,
            "full-auto" => Sandbox::FullAuto,
            "dangerously-bypass-approvals-and-sandbox" => {
                Sandbox::DangerouslyBypassApprovalsAndSandbox
            }
            other => {
                tracing::warn!(value = other, "unknown sandbox value, coercing to read-only");
                Sandbox::ReadOnly
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AConfig {
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl Default for AConfig {
    fn default() -> Self {
        Self {
            allowed_tools: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "deserialize_sandbox")]
    pub sandbox: Sandbox,
}

fn deserialize_sandbox<'de, D>(deserializer: D) -> std::result::Result<Sandbox, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(Sandbox::parse(&raw))
}

impl Default for BConfig {
    fn default() -> Self {
        Self {
            model: None,
            sandbox: Sandbox::ReadOnly,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "Limits::default_max_diff_lines")]
    pub max_diff_lines: usize,
    #[serde(default = "Limits::default_max_diff_bytes")]
    pub max_diff_bytes: usize,
    #[serde(default = "Limits::default_max_handoff_lines")]
    pub max_handoff_lines: usize,
}

impl Limits {
    fn default_max_diff_lines() -> usize {
        200
    }
    fn default_max_diff_bytes() -> usize {
        8_000
    }
    fn default_max_handoff_lines() -> usize {
        350
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_diff_lines: Self::default_max_diff_lines(),
            max_diff_bytes: Self::default_max_diff_bytes(),
            max_handoff_lines: Self::default_max_handoff_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retry {
    #[serde(default = "Retry::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "Retry::default_backoff_base")]
    pub backoff_base: f64,
    #[serde(default = "Retry::default_backoff_max")]
    pub backoff_max: f64,
    #[serde(default = "Retry::default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    #[serde(default = "Retry::default_transient_cooldown_minutes")]
    pub transient_cooldown_minutes: i64,
}

impl Retry {
    fn default_max_retries() -> u32 {
        3
    }
    fn default_backoff_base() -> f64 {
        2.0
    }
    fn default_backoff_max() -> f64 {
        30.0
    }
    fn default_cooldown_minutes() -> i64 {
        60
    }
    fn default_transient_cooldown_minutes() -> i64 {
        5
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: Self::default_max_retries(),
            backoff_base: Self::default_backoff_base(),
            backoff_max: Self::default_backoff_max(),
            cooldown_minutes: Self::default_cooldown_minutes(),
            transient_cooldown_minutes: Self::default_transient_cooldown_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider_order: Vec<String>,
    pub a: AConfig,
    pub b: BConfig,
    pub limits: Limits,
    pub retry: Retry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider_order: vec!["a".to_string(), "b".to_string()],
            a: AConfig::default(),
            b: BConfig::default(),
            limits: Limits::default(),
            retry: Retry::default(),
        }
    }
}

/// Load the merged configuration: defaults ← user-global ← repo-local.
/// Never fails — a missing or corrupt layer is skipped.
pub fn load() -> Config {
    let mut merged = toml::Value::try_from(Config::default()).expect("default config serializes");

    if let Some(user_cfg) = user_config_file() {
        merge_layer(&mut merged, &user_cfg);
    }
    merge_layer(&mut merged, Path::new(REPO_CONFIG_FILE));

    merged.try_into().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "merged configuration failed to deserialize, using defaults");
        Config::default()
    })
}

fn merge_layer(base: &mut toml::Value, path: &Path) {
    let Ok(text) = std::fs::read_to_string(path) else {
        return;
    };
    match toml::from_str::<toml::Value>(&text) {
        Ok(layer) => deep_merge(base, layer),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse config layer, skipping");
        }
    }
}

/// Recursively merge `override_value` into `base`, in place. Nested tables
/// merge key-by-key; everything else (scalars, arrays) is overridden wholesale.
fn deep_merge(base: &mut toml::Value, override_value: toml::Value) {
    match (base, override_value) {
        (toml::Value::Table(base_table), toml::Value::Table(override_table)) => {
            for (key, value) in override_table {
                match base_table.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base_slot, value) => *base_slot = value,
    }
}

pub(crate) fn resolved_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = user_config_file() {
        paths.push(p);
    }
    paths.push(PathBuf::from(REPO_CONFIG_FILE));
    paths
}
