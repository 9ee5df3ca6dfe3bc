//! `reset` subcommand: delete all router state for this repository.

use std::io::{self, Write as _};

use crate::state::store;

pub fn run_reset_command(yes: bool) -> anyhow::Result<()> {
    if !yes && !confirm("This will delete .switchboard/ (state, handoff, transcript). Continue?")? {
        println!("Aborted.");
        return Ok(());
    }

    store::wipe()?;
    println!("Removed .switchboard/");
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
