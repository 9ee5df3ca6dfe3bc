//! `ask` subcommand: run a single prompt to completion, non-interactively.

use crossterm::tty::IsTty;

use crate::cli::ConfirmPolicy;
use crate::config::Config;
use crate::provider::{ProviderRegistry, ProviderResult};
use crate::state::model::Provider;
use crate::turn;

pub async fn run_ask_command(
    prompt_words: &[String],
    order: Option<&str>,
    confirm: ConfirmPolicy,
    mut config: Config,
    registry: &ProviderRegistry,
) -> anyhow::Result<()> {
    if let Some(order) = order {
        config.provider_order = parse_order(order)?;
    }

    let approve = resolve_approval(confirm);
    let confirm_switch = move |from: Provider, to: Provider, _last: &ProviderResult| {
        if approve {
            println!("(switching from provider {from} to provider {to})");
        }
        approve
    };
    let on_start = |provider: Provider| {
        tracing::debug!(%provider, "starting attempt");
    };

    let user_prompt = prompt_words.join(" ");
    let outcome = turn::run_turn(
        &user_prompt,
        "ask",
        &config,
        registry,
        Some(&confirm_switch),
        Some(&on_start),
    )
    .await?;

    match outcome.result {
        None => {
            println!("All configured providers are in cooldown. Try again later.");
            std::process::exit(1);
        }
        Some(result) if result.success => {
            println!("{}", result.text.unwrap_or_default());
        }
        Some(result) => {
            eprintln!(
                "error from provider {}: {}",
                outcome.provider_used.expect("failure implies a provider was used"),
                result.error_message.unwrap_or_default()
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

/// `--confirm ask` has no interactive surface in one-shot mode; it degrades
/// to `yes` with a warning when stdin is not a TTY, matching how one-shot
/// invocations never block on input.
fn resolve_approval(confirm: ConfirmPolicy) -> bool {
    match confirm {
        ConfirmPolicy::Yes => true,
        ConfirmPolicy::No => false,
        ConfirmPolicy::Ask => {
            if !std::io::stdin().is_tty() {
                tracing::warn!("--confirm ask has no effect on stdin that isn't a TTY; treating as yes");
            }
            true
        }
    }
}

fn parse_order(order: &str) -> anyhow::Result<Vec<String>> {
    let names: Vec<String> = order.split(',').map(|s| s.trim().to_string()).collect();
    for name in &names {
        if Provider::parse(name).is_none() {
            anyhow::bail!("unknown provider name in --order: {name}");
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_order_accepts_known_names() {
        assert_eq!(parse_order("a,b").unwrap(), vec!["a", "b"]);
        assert_eq!(parse_order("b,a").unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn parse_order_rejects_unknown_names() {
        assert!(parse_order("a,codex").is_err());
    }

    #[test]
    fn resolve_approval_yes_and_no() {
        assert!(resolve_approval(ConfirmPolicy::Yes));
        assert!(!resolve_approval(ConfirmPolicy::No));
    }
}
