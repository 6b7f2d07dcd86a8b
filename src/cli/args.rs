//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Packline build orchestrator CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// One-shot build of every target
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Development server with live rebuild
    #[command(visible_alias = "s")]
    Serve {
        #[command(flatten)]
        args: BuildArgs,

        /// Port the dev server listens on (fragments override)
        #[arg(short, long, default_value_t = 3500)]
        port: u16,

        /// Host the dev server binds (fragments override)
        #[arg(long, default_value = "localhost")]
        host: String,
    },
}

/// Shared build arguments for Build and Serve commands
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Project root to scan for packline files
    #[arg(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    pub root: PathBuf,

    /// Platform/arch strings to build (e.g. web.browser, os, web.cordova)
    #[arg(short, long = "target", value_delimiter = ',', default_values = ["web.browser", "os"])]
    pub targets: Vec<String>,

    /// Bundler command to drive (split on whitespace)
    #[arg(short, long, default_value = "packline-bundler")]
    pub bundler: String,

    /// Build with development settings instead of production
    #[arg(long)]
    pub development: bool,
}

impl BuildArgs {
    /// The bundler command line, split into argv form.
    pub fn bundler_command(&self) -> Vec<String> {
        self.bundler.split_whitespace().map(String::from).collect()
    }
}
