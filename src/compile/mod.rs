//! The compile-and-harvest cycle.

mod artifact;
mod driver;
mod postprocess;

pub use artifact::{ArtifactKind, CompiledArtifact};
pub use driver::{CompileDriver, CompileOutcome};
pub use postprocess::{MANIFEST_GLOBAL, extract};
