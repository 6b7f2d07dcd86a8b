//! Run results reported by a compiler instance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Terminal result of one compile cycle. Compile errors live here; an error
/// invoking the bundler at all is the `Err` side of `CompilerInstance::run`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunStats {
    #[serde(default)]
    pub errors: Vec<String>,

    /// Chunk name to emitted asset files.
    #[serde(default)]
    pub assets_by_chunk_name: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub public_path: String,
}

impl RunStats {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Strip the stats down to the summary retained for the server target:
    /// chunk mapping and public path, nothing else.
    pub fn to_manifest(&self) -> ChunkManifest {
        ChunkManifest {
            assets_by_chunk_name: self.assets_by_chunk_name.clone(),
            public_path: self.public_path.clone(),
        }
    }
}

/// Chunk-name to asset mapping captured from the web target and injected
/// into the server script so server-side code can reference client chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkManifest {
    pub assets_by_chunk_name: BTreeMap<String, Vec<String>>,
    pub public_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_strips_errors() {
        let mut stats = RunStats {
            errors: vec!["boom".into()],
            public_path: "/assets/".into(),
            ..Default::default()
        };
        stats
            .assets_by_chunk_name
            .insert("main".into(), vec!["web.js".into()]);

        let manifest = stats.to_manifest();
        assert_eq!(manifest.public_path, "/assets/");
        assert_eq!(manifest.assets_by_chunk_name["main"], vec!["web.js"]);

        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("assetsByChunkName"));
        assert!(!json.contains("errors"));
    }

    #[test]
    fn test_stats_deserialize_defaults() {
        let stats: RunStats = serde_json::from_str("{}").unwrap();
        assert!(!stats.has_errors());
        assert!(stats.assets_by_chunk_name.is_empty());
    }

    #[test]
    fn test_stats_deserialize_full() {
        let json = r#"{
            "errors": ["module not found: ./missing"],
            "assets_by_chunk_name": {"main": ["web.js", "web.js.map"]},
            "public_path": "/assets/"
        }"#;
        let stats: RunStats = serde_json::from_str(json).unwrap();
        assert!(stats.has_errors());
        assert_eq!(stats.assets_by_chunk_name["main"].len(), 2);
    }
}
