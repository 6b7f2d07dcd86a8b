//! Command-line interface.

mod args;
pub mod build;
mod scan;
pub mod serve;

pub use args::{Cli, Commands};
