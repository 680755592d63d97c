//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `jukeboxd` binary.
//!
//! ## Commands
//!
//! - `run`: Serve in the foreground until interrupted
//! - `daemon start|stop|status`: Manage a background instance
//! - `fill`: Add songs or albums to a partition right now
//! - `rebuild-cache`: Rebuild the album and sticker caches once and report
//! - `completion`: Print a shell completion script
//!
//! ## Examples
//!
//! ```bash
//! jukeboxd run
//! jukeboxd fill 5 --albums
//! JUKEBOXD_CONFIG=~/jukebox.json jukeboxd daemon start
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "jukeboxd")]
#[command(about = "jukeboxd: keeps your MPD queue playing")]
#[command(version)]
pub struct Args {
    /// Path to the JSON config file
    ///
    /// Defaults to `config.json` in the jukeboxd data directory. A missing
    /// file means built-in defaults.
    #[arg(long, global = true, env = "JUKEBOXD_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the service in the foreground
    ///
    /// Builds the metadata caches, then polls every configured partition,
    /// records play history and tops up queues whose jukebox is enabled.
    /// Stops cleanly on Ctrl-C or SIGTERM.
    Run,

    /// Manage the background service
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },

    /// Add songs or albums to a partition now
    ///
    /// Picks random candidates from the partition's configured source under
    /// the same uniqueness and recency rules the jukebox uses, and appends
    /// them to the queue. Album mode builds the album cache first.
    Fill {
        /// How many songs (or albums) to add, at most 99
        count: usize,

        /// Add whole albums instead of single songs
        #[arg(long)]
        albums: bool,

        /// Partition to add to
        #[arg(long, default_value = "default")]
        partition: String,
    },

    /// Rebuild the metadata caches once and print their sizes
    RebuildCache,

    /// Generate shell completions
    ///
    /// Usage: jukeboxd completion bash > ~/.local/share/bash-completion/completions/jukeboxd
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Daemon management actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonAction {
    /// Start the service in the background
    Start,

    /// Stop the running service
    Stop,

    /// Report whether the service is running
    Status,
}
