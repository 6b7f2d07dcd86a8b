//! Config fragment files and their evaluation.

use std::path::{Path, PathBuf};

use crate::core::EnvDescriptor;
use crate::fingerprint::ContentHash;

/// Basename identifying a config fragment in the source tree.
pub const CONFIG_BASENAME: &str = "packline.conf.toml";

/// One source file contributing partial configuration for a target.
#[derive(Debug, Clone)]
pub struct ConfigFragment {
    /// Path within the project (used for attribution and depth ordering).
    pub path: PathBuf,
    pub source: String,
    pub fingerprint: ContentHash,
}

impl ConfigFragment {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        let source = source.into();
        let fingerprint = ContentHash::of_bytes(source.as_bytes());
        Self {
            path: path.into(),
            source,
            fingerprint,
        }
    }

    /// Directory depth used for merge ordering (shallower merges first).
    pub fn depth(&self) -> usize {
        self.path.components().count()
    }

    /// Directory containing this fragment.
    pub fn dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Evaluate the fragment for one target environment: parse the TOML
    /// document and fold any matching `[when.<env>]` overlay tables into the
    /// base keys. Overlays apply in declaration order of the environment
    /// names, deeper-wins like the fragment merge itself.
    pub fn evaluate(&self, env: EnvDescriptor) -> Result<toml::Table, toml::de::Error> {
        let mut table: toml::Table = toml::from_str(&self.source)?;

        let when = match table.remove("when") {
            Some(toml::Value::Table(when)) => when,
            _ => return Ok(table),
        };

        for name in env.overlay_names() {
            if let Some(toml::Value::Table(overlay)) = when.get(name).cloned() {
                super::assemble::shallow_merge(&mut table, overlay);
            }
        }

        Ok(table)
    }
}
