//! Dependency-manifest fragments.
//!
//! `packline.packages.json` files each declare a JSON map of package name to
//! version requirement for the bundler's runtime. Fragments merge over a
//! built-in base set; installation itself is the host's job — the
//! orchestrator only reports the merged set and whether it changed since the
//! last invocation for this target.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::config::AttributedError;
use crate::core::Target;
use crate::orchestrator::InputFile;

/// Basename identifying a dependency manifest in the source tree.
pub const PACKAGES_BASENAME: &str = "packline.packages.json";

/// Packages every bundle needs regardless of project manifests: the
/// hot-update client runtime.
const BASE_DEPENDENCIES: &[(&str, &str)] = &[("packline-hot-client", "^1.0.0")];

/// Result of merging the manifests for one target.
#[derive(Debug)]
pub struct DependencySet {
    pub packages: BTreeMap<String, String>,
    /// True when the merged set differs from the previous invocation's.
    pub changed: bool,
    pub errors: Vec<AttributedError>,
}

/// Per-target cache of the last merged dependency set.
#[derive(Debug, Default)]
pub struct DepsCache {
    merged: FxHashMap<Target, BTreeMap<String, String>>,
}

impl DepsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the manifest fragments for a target over the base set.
    ///
    /// A file that is not valid JSON contributes one attributed error and no
    /// packages; sibling manifests still merge.
    pub fn merge(&mut self, target: Target, manifests: &[&InputFile]) -> DependencySet {
        let mut packages: BTreeMap<String, String> = BASE_DEPENDENCIES
            .iter()
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect();
        let mut errors = Vec::new();

        for manifest in manifests {
            match serde_json::from_slice::<BTreeMap<String, String>>(&manifest.contents) {
                Ok(declared) => packages.extend(declared),
                Err(e) => errors.push(AttributedError::new(&manifest.path, e.to_string())),
            }
        }

        let changed = self.merged.get(&target) != Some(&packages);
        if changed {
            self.merged.insert(target, packages.clone());
        }

        DependencySet {
            packages,
            changed,
            errors,
        }
    }
}
