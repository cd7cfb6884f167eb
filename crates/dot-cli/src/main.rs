//! dotsync CLI
//!
//! Applies a source directory of encoded dotfiles to a home directory.

mod cli;
mod commands;
mod context;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands, StateAction};
use context::Context;
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}: logging disabled: {}", "warning".yellow().bold(), e);
    }
    let context = Context::resolve(&cli)?;
    tracing::debug!(?context, "resolved settings");

    match cli.command {
        Commands::Apply {
            dry_run,
            keep_going,
        } => commands::run_apply(&context, dry_run, keep_going),
        Commands::Diff => commands::run_diff(&context),
        Commands::State { action } => match action {
            StateAction::Dump => commands::run_state_dump(&context),
            StateAction::Delete { bucket, key } => commands::run_state_delete(&context, &bucket, &key),
        },
    }
}
