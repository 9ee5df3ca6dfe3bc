//! `chat` subcommand: interactive REPL, one turn per line.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::Config;
use crate::provider::{ProviderRegistry, ProviderResult};
use crate::state::model::Provider;
use crate::turn;

const PROMPT: &str = "switchboard> ";

pub async fn run_chat_command(config: Config, registry: &ProviderRegistry) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let history_path = history_file();
    if let Some(path) = &history_path {
        let _ = editor.load_history(path);
    }

    println!("switchboard chat — Ctrl-D or 'exit' to quit.");

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed.to_ascii_lowercase().as_str(), "exit" | "quit" | "/exit" | "/quit") {
            break;
        }
        let _ = editor.add_history_entry(trimmed);

        let confirm_switch = |from: Provider, to: Provider, last: &ProviderResult| {
            let reason = last.error_message.as_deref().unwrap_or("unknown error");
            println!("provider {from} failed ({reason}).");
            prompt_yes_no(&format!("Switch to provider {to}?"))
        };
        let on_start = |provider: Provider| {
            tracing::debug!(%provider, "starting attempt");
        };

        match turn::run_turn(trimmed, "chat", &config, registry, Some(&confirm_switch), Some(&on_start)).await {
            Ok(outcome) => render_outcome(outcome),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    if let Some(path) = &history_path {
        let _ = editor.save_history(path);
    }
    Ok(())
}

fn render_outcome(outcome: turn::TurnOutcome) {
    match outcome.result {
        None => println!("All configured providers are in cooldown. Try again later."),
        Some(result) if result.success => {
            let skin = termimad::MadSkin::default();
            skin.print_text(&result.text.unwrap_or_default());
        }
        Some(result) => {
            eprintln!(
                "error from provider {}: {}",
                outcome.provider_used.expect("failure implies a provider was used"),
                result.error_message.unwrap_or_default()
            );
        }
    }
}

fn prompt_yes_no(question: &str) -> bool {
    use std::io::{self, Write as _};
    print!("{question} [y/N] ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn history_file() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("switchboard").join("chat_history.txt"))
}
