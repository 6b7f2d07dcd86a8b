//! Packline - build orchestrator for an external bundler.

mod bundler;
mod cli;
mod compile;
mod config;
mod core;
mod deps;
mod devserver;
mod fingerprint;
mod logger;
mod orchestrator;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    logger::set_verbose(cli.verbose);

    match &cli.command {
        Commands::Build { args } => cli::build::run_build(&cli, args),
        Commands::Serve { args, port, host } => cli::serve::run_serve(&cli, args, *port, host),
    }
}
