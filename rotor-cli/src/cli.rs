use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "rotor",
    version,
    about = "Keeps M3U playlists pointed at healthy numbered mirrors"
)]
pub struct Args {
    /// Path to a TOML config file (defaults are used when absent)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Probe the playlist's entries and rewrite unhealthy ones
    Reconcile {
        /// Playlist file; located by recursive search when omitted
        #[arg(short, long)]
        playlist: Option<PathBuf>,

        /// Preferred ("main") endpoint id; detected from the playlist when
        /// omitted
        #[arg(long)]
        preferred: Option<u16>,

        /// Report what would change without writing or publishing
        #[arg(long)]
        dry_run: bool,

        /// Write the playlist but never invoke git
        #[arg(long)]
        no_publish: bool,

        /// Annotate entries that could not be relocated
        #[arg(long)]
        annotate: bool,

        /// Write a JSON snapshot of the pass to this path
        #[arg(long)]
        status_file: Option<PathBuf>,
    },

    /// Probe every endpoint in the configured range and report which are
    /// serving the playlist's paths
    Scan {
        /// Playlist file; located by recursive search when omitted
        #[arg(short, long)]
        playlist: Option<PathBuf>,

        /// How many of the playlist's paths to sample per endpoint
        #[arg(long, default_value_t = 3)]
        sample_limit: usize,
    },
}
