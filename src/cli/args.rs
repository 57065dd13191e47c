//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Strato serverless development loop CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the live rebuild loop over the application
    #[command(visible_alias = "w")]
    Watch {
        /// Config file path (default: strato.toml)
        #[arg(short = 'C', long, default_value = "strato.toml", value_hint = clap::ValueHint::FilePath)]
        config: PathBuf,
    },
}
