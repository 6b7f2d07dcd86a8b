//! Content fingerprinting and the per-target rebuild cache.

mod cache;
mod hash;

pub use cache::FingerprintCache;
pub use hash::ContentHash;
