use clap::Parser;

use switchboard::cli::{self, Cli, Command};
use switchboard::{config, provider};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("switchboard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ask { prompt, order, confirm } => {
            let config = config::load();
            let registry = provider::build_registry();
            cli::run_ask_command(&prompt, order.as_deref(), confirm, config, &registry).await
        }
        Command::Chat => {
            let config = config::load();
            let registry = provider::build_registry();
            cli::run_chat_command(config, &registry).await
        }
        Command::Status { active } => cli::run_status_command(active),
        Command::Reset { yes } => cli::run_reset_command(yes),
        Command::Completion { shell } => cli::generate_completions(&shell),
    }
}
