//! Strato - a live rebuild development loop for serverless applications.

#![allow(dead_code)]

mod build;
mod cli;
mod config;
mod core;
mod logger;
mod utils;
mod watcher;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::AppConfig;
use std::sync::Arc;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    // Set global color override based on CLI option and NO_COLOR
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {
            if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
                owo_colors::set_override(false);
            }
        }
    }

    match cli.command {
        Commands::Watch { config } => {
            let config = Arc::new(AppConfig::load(&config)?);
            cli::watch::run(config)
        }
    }
}
