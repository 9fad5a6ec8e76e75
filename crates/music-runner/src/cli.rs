use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "music-runner", version = VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play the configured sources and block until they finish (or Ctrl-C)
    ///
    /// Always plays in the foreground and once through;
    /// the config's background setting is ignored.
    Play {
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Play in the background while a command runs; exit with the command's exit code
    ///
    /// Always plays in the background; the config's background setting is ignored.
    Run {
        #[command(flatten)]
        sources: SourceArgs,

        /// Command and arguments to run, after `--`
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// List output devices
    ListDevices,

    /// Report whether the Spotify desktop app is installed and running
    Companion,
}

/// Source selection shared by `play` and `run`. Flags override the config file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Local audio file (repeatable). Any source flag replaces the config's source list.
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// http, https or file URL (repeatable)
    #[arg(long = "uri", value_name = "URL")]
    pub uris: Vec<String>,

    /// Spotify URI or open.spotify.com link (repeatable)
    #[arg(long = "service", value_name = "URI")]
    pub services: Vec<String>,

    /// Gain in dB for sources without their own volume, e.g. -20
    #[arg(long, allow_negative_numbers = true)]
    pub volume_db: Option<f32>,

    /// Shuffle the source list
    #[arg(long)]
    pub shuffle: bool,

    /// Play the list once instead of repeating it
    #[arg(long)]
    pub no_repeat: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,
}

impl SourceArgs {
    pub fn has_sources(&self) -> bool {
        !(self.files.is_empty() && self.uris.is_empty() && self.services.is_empty())
    }
}
