//! CLI command handling.
//!
//! Provides subcommands for:
//! - One-shot prompts (`ask`)
//! - Interactive chat (`chat`)
//! - Inspecting router state (`status`)
//! - Clearing router state (`reset`)
//! - Shell completion generation (`completion`)

mod ask;
mod chat;
mod completion;
mod reset;
mod status;

pub use ask::run_ask_command;
pub use chat::run_chat_command;
pub use completion::generate_completions;
pub use reset::run_reset_command;
pub use status::run_status_command;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(about = "Local failover router in front of two coding-assistant CLIs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single prompt to completion against the best available provider
    Ask {
        /// The prompt text (joined with spaces if passed as multiple words)
        #[arg(required = true)]
        prompt: Vec<String>,

        /// Override the configured provider order for this invocation only
        #[arg(long, value_name = "a,b|b,a")]
        order: Option<String>,

        /// Switch-confirmation policy for this invocation
        #[arg(long, value_enum, default_value_t = ConfirmPolicy::Yes)]
        confirm: ConfirmPolicy,
    },

    /// Start an interactive chat session
    Chat,

    /// Show router and provider cooldown state
    Status {
        /// Also print the active-run marker, if one is present
        #[arg(long)]
        active: bool,
    },

    /// Delete all router state for this repository
    Reset {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
        shell: String,
    },
}

/// Switch-confirmation policy, shared by `ask --confirm` and the interactive
/// default used by `chat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfirmPolicy {
    /// Prompt the user interactively; degrades to `Yes` with a warning when
    /// stdin is not a TTY (non-interactive `ask` invocations).
    Ask,
    /// Always approve the switch without prompting.
    Yes,
    /// Always deny the switch without prompting.
    No,
}
