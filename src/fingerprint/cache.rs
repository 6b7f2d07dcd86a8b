//! Per-target fingerprint sets deciding compiler reuse.

use rustc_hash::{FxHashMap, FxHashSet};

use super::ContentHash;
use crate::core::Target;

/// Tracks, per target, the set of content fingerprints that produced the
/// currently cached compiler instance.
///
/// Reuse policy is deliberately loose: a rebuild is forced iff no cached set
/// exists or any incoming fingerprint is absent from it. A fragment that was
/// removed (its fingerprint no longer incoming) does not invalidate on its
/// own.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    sets: FxHashMap<Target, FxHashSet<ContentHash>>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must the target be rebuilt for the given incoming fingerprints?
    pub fn should_rebuild(&self, target: Target, current: &[ContentHash]) -> bool {
        match self.sets.get(&target) {
            None => true,
            Some(cached) => current.iter().any(|fp| !cached.contains(fp)),
        }
    }

    /// Replace the cached set for a target in one step, so a half-updated
    /// set can never be observed next to a fresh compiler instance.
    pub fn record(&mut self, target: Target, current: &[ContentHash]) {
        self.sets
            .insert(target, current.iter().copied().collect());
    }
}
