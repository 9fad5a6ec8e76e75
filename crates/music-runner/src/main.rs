//! Music runner: plays background music from the command line.
//!
//! - `play`: play the configured sources in the foreground.
//! - `run`: play in the background while a child command runs, then stop the music and exit
//!   with the command's exit code.

mod cli;
mod runtime;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,music_player=info,music_runner=info")
        }))
        .init();

    match args.cmd {
        cli::Command::Play { sources } => runtime::run_play(&sources),
        cli::Command::Run { sources, command } => {
            let code = runtime::run_command(&sources, &command)?;
            std::process::exit(code);
        }
        cli::Command::ListDevices => runtime::print_devices(),
        cli::Command::Companion => {
            runtime::print_companion();
            Ok(())
        }
    }
}
