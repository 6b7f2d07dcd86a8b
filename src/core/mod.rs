//! Core types shared across the orchestrator.

mod mode;
mod state;
mod target;

pub use mode::{BuildMode, Invocation};
pub use state::{is_shutdown, register_server, setup_shutdown_handler};
pub use target::{EnvDescriptor, Target};
