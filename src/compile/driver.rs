//! Per-target compiler ownership and the blocking compile cycle.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::bundler::{Bundler, ChunkManifest, CompilerInstance, MemoryFs};
use crate::config::AssembledConfig;
use crate::core::Target;
use crate::fingerprint::{ContentHash, FingerprintCache};
use crate::{debug, log};

/// Result of one compile call: either an ordered error list, or the output
/// filesystem to extract artifacts from. Never both — on error no partial
/// output is exposed.
#[derive(Debug)]
pub struct CompileOutcome {
    pub errors: Vec<String>,
    pub output: Option<MemoryFs>,
}

impl CompileOutcome {
    fn failed(errors: Vec<String>) -> Self {
        Self {
            errors,
            output: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Owns one cached compiler instance per target and the chunk manifest
/// captured from the web target.
///
/// Not safe for concurrent invocations: the host serializes builds, and all
/// state lives in this struct rather than in globals so that contract is
/// explicit.
pub struct CompileDriver {
    bundler: Arc<dyn Bundler>,
    instances: FxHashMap<Target, Box<dyn CompilerInstance>>,
    cache: FingerprintCache,
    manifest: Option<ChunkManifest>,
}

impl CompileDriver {
    pub fn new(bundler: Arc<dyn Bundler>) -> Self {
        Self {
            bundler,
            instances: FxHashMap::default(),
            cache: FingerprintCache::new(),
            manifest: None,
        }
    }

    /// The chunk manifest from the most recent successful web compile, if
    /// any. The server target tolerates its absence.
    pub fn manifest(&self) -> Option<&ChunkManifest> {
        self.manifest.as_ref()
    }

    /// Compile one target, blocking until the bundler reports a terminal
    /// result.
    ///
    /// The cached instance is reused unless the fingerprint cache signals a
    /// rebuild, in which case it is discarded and a fresh instance is bound
    /// to `config` with a new in-memory output filesystem. The fingerprint
    /// set is recorded before the new instance is stored, so a torn state
    /// (new fingerprints, old instance or vice versa) is never observable.
    pub fn compile(
        &mut self,
        config: &AssembledConfig,
        fingerprints: &[ContentHash],
    ) -> CompileOutcome {
        let target = config.target;

        if self.cache.should_rebuild(target, fingerprints) {
            debug!("compile"; "{}: config changed, new compiler instance", target);
            self.instances.remove(&target);

            let instance = match self.bundler.instantiate(config, MemoryFs::new()) {
                Ok(instance) => instance,
                Err(e) => return CompileOutcome::failed(vec![e.to_string()]),
            };

            self.cache.record(target, fingerprints);
            self.instances.insert(target, instance);
        } else {
            debug!("compile"; "{}: reusing cached compiler instance", target);
        }

        let instance = self
            .instances
            .get_mut(&target)
            .expect("instance recorded above");

        let errors = match instance.run() {
            Ok(stats) => {
                // The stripped manifest is kept from the web target even
                // when the compile reported errors, matching the bundler's
                // own stats semantics.
                if target == Target::Web {
                    self.manifest = Some(stats.to_manifest());
                }
                stats.errors
            }
            Err(e) => vec![e.to_string()],
        };

        if errors.is_empty() {
            CompileOutcome {
                errors,
                output: Some(instance.output().clone()),
            }
        } else {
            log!("compile"; "{}: {} error(s)", target, errors.len());
            CompileOutcome::failed(errors)
        }
    }
}
