use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI application arguments and command structure
#[derive(Parser)]
#[clap(
    name = "webnotes",
    version,
    about = "Personal notes with tags, search and version history"
)]
pub struct Cli {
    /// Path to a JSON configuration file
    #[clap(short = 'c', long, value_parser)]
    pub config: Option<PathBuf>,

    /// Directory for the file backend (overrides config and environment)
    #[clap(long, value_parser)]
    pub data_dir: Option<PathBuf>,

    /// Print results as JSON
    #[clap(short, long, global = true)]
    pub json: bool,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the webnotes application
    #[clap(subcommand)]
    pub command: Commands,
}
