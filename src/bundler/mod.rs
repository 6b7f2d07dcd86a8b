//! The bundler collaborator boundary.
//!
//! The orchestrator never bundles anything itself. A [`Bundler`] turns an
//! assembled config plus an in-memory output filesystem into a
//! [`CompilerInstance`]; running the instance is a terminal, blocking
//! request/response exchange — whatever concurrency the bundler uses
//! internally is invisible here.

mod external;
#[cfg(test)]
pub mod fake;
mod memfs;
mod stats;

pub use external::ExternalBundler;
pub use memfs::MemoryFs;
pub use stats::{ChunkManifest, RunStats};

use anyhow::Result;

use crate::config::AssembledConfig;

/// Factory for compiler instances. One instance per target config; the
/// instance is discarded whenever the fingerprint cache invalidates.
pub trait Bundler: Send + Sync {
    fn instantiate(
        &self,
        config: &AssembledConfig,
        output: MemoryFs,
    ) -> Result<Box<dyn CompilerInstance>>;
}

/// An opaque compiler handle bound to one config. `run` blocks until the
/// bundler reports a terminal result; artifacts land in the instance's
/// output filesystem.
pub trait CompilerInstance: Send {
    /// Perform one compilation. An `Err` means the invocation itself failed
    /// (as opposed to the bundler reporting compile errors in the stats).
    fn run(&mut self) -> Result<RunStats>;

    /// The in-memory output filesystem this instance writes into.
    fn output(&self) -> &MemoryFs;
}
