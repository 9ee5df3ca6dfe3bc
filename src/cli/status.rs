//! `status` subcommand: print router and provider cooldown state.

use chrono::{DateTime, Utc};

use crate::router::available_providers;
use crate::state::model::{Cooldown, Provider, ProviderState, RepoState};
use crate::state::store;

const SESSION_ID_TRUNCATE_CHARS: usize = 20;

pub fn run_status_command(active: bool) -> anyhow::Result<()> {
    let config = crate::config::load();
    let state = store::load_state();
    let now = Utc::now();
    print_state(&state, &config, now);

    if active {
        match store::load_active_run() {
            Some(run) => {
                println!();
                println!("active run:");
                println!("  pid:     {}", run.pid);
                println!("  mode:    {}", run.mode);
                println!("  started: {}", run.started_at.to_rfc3339());
                if let Some(provider) = run.provider {
                    println!("  provider: {provider}");
                }
                println!("  prompt:  {}", run.prompt_excerpt);
            }
            None => println!("\nno active run"),
        }
    }

    Ok(())
}

fn print_state(state: &RepoState, config: &crate::config::Config, now: DateTime<Utc>) {
    println!("turn count: {}", state.turn_count);
    match state.last_provider {
        Some(p) => println!("last provider: {p}"),
        None => println!("last provider: (none yet)"),
    }

    let available = available_providers(state, config, now);
    let available_str = if available.is_empty() {
        "none".to_string()
    } else {
        available.iter().map(Provider::as_str).collect::<Vec<_>>().join(", ")
    };
    println!("available: {available_str}");

    for provider in [Provider::A, Provider::B] {
        let ps = state.get(provider);
        println!();
        println!("provider {provider}:");
        println!("  session:            {}", format_session_id(ps));
        println!("  last used:          {}", format_last_used(ps));
        println!("  consecutive errors: {}", ps.consecutive_errors);
        println!("  cooldown remaining: {}", format_cooldown_remaining(ps, now));
        println!("  cooldown until:     {}", format_cooldown_until(ps, now));
        println!("  cooldown source:    {}", format_cooldown_source(ps, now));
    }
}

fn format_session_id(ps: &ProviderState) -> String {
    match &ps.session_id {
        Some(id) if id.chars().count() > SESSION_ID_TRUNCATE_CHARS => {
            let truncated: String = id.chars().take(SESSION_ID_TRUNCATE_CHARS).collect();
            format!("{truncated}…")
        }
        Some(id) => id.clone(),
        None => "—".to_string(),
    }
}

fn format_last_used(ps: &ProviderState) -> String {
    match ps.last_used {
        Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        None => "—".to_string(),
    }
}

fn active_cooldown(ps: &ProviderState, now: DateTime<Utc>) -> Option<&Cooldown> {
    ps.cooldown.as_ref().filter(|c| c.until > now)
}

fn format_cooldown_remaining(ps: &ProviderState, now: DateTime<Utc>) -> String {
    match active_cooldown(ps, now) {
        Some(c) => {
            let mins = (c.until - now).num_minutes().max(0);
            format!("{mins} min")
        }
        None => "—".to_string(),
    }
}

fn format_cooldown_until(ps: &ProviderState, now: DateTime<Utc>) -> String {
    match active_cooldown(ps, now) {
        Some(c) => {
            let until_utc = c.until.format("%Y-%m-%d %H:%M UTC");
            let until_local = c.until.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M %Z");
            format!("{until_utc} / {until_local}")
        }
        None => "—".to_string(),
    }
}

fn format_cooldown_source(ps: &ProviderState, now: DateTime<Utc>) -> String {
    match active_cooldown(ps, now) {
        Some(c) if !c.source.is_empty() => c.source.clone(),
        Some(_) => "unknown".to_string(),
        None => "—".to_string(),
    }
}
