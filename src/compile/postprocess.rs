//! Artifact extraction from the in-memory output filesystem.

use std::path::Path;

use anyhow::{Context, Result};

use super::CompiledArtifact;
use crate::bundler::{ChunkManifest, MemoryFs};
use crate::config::AssembledConfig;
use crate::core::{BuildMode, Target};
use crate::debug;

/// Global the chunk manifest is assigned to at the top of the server script.
pub const MANIFEST_GLOBAL: &str = "__CHUNK_MANIFEST__";

/// Extract typed artifacts for one target from a successful compile.
///
/// The primary script is required; its source map is optional and, when
/// present, has its source paths rewritten to be project-relative. For the
/// server target the chunk manifest captured from the web compile is
/// prepended as a global assignment (`null` when no web compile happened).
/// In production, remaining output files of client targets are classified
/// into stylesheets and generic assets; in development they are served live
/// by the dev server instead.
pub fn extract(
    config: &AssembledConfig,
    output: &MemoryFs,
    manifest: Option<&ChunkManifest>,
    mode: BuildMode,
) -> Result<Vec<CompiledArtifact>> {
    let script_path = config.output.script_path();
    let mut script = output
        .read(&script_path)
        .with_context(|| format!("bundler emitted no {}", script_path.display()))?
        .to_vec();

    if config.target == Target::Server {
        let manifest_json = match manifest {
            Some(m) => serde_json::to_string(m)?,
            None => "null".to_string(),
        };
        let mut prefixed =
            format!("{MANIFEST_GLOBAL} = {manifest_json};\n").into_bytes();
        prefixed.extend_from_slice(&script);
        script = prefixed;
    }

    let mut artifacts = vec![CompiledArtifact::script(
        &config.output.filename,
        script,
    )];

    // A missing source map is absence, not failure.
    if let Some(raw_map) = output.read(&config.output.source_map_path()) {
        match repair_source_map(&raw_map, config) {
            Ok(map) => artifacts.push(CompiledArtifact::source_map(
                format!("{}.map", config.output.filename),
                map,
            )),
            Err(e) => debug!("compile"; "{}: unusable source map ({})", config.target, e),
        }
    }

    if mode == BuildMode::Production && config.target != Target::Server {
        classify_assets(config, output, &mut artifacts);
    }

    Ok(artifacts)
}

/// Rewrite `sources` entries so they resolve against the project root
/// instead of the in-memory filesystem root or a bundler URL scheme.
fn repair_source_map(raw: &[u8], config: &AssembledConfig) -> Result<Vec<u8>> {
    let mut map: serde_json::Value = serde_json::from_slice(raw)?;
    let memory_root = config.output.path.to_string_lossy();

    if let Some(sources) = map.get_mut("sources").and_then(|s| s.as_array_mut()) {
        for source in sources {
            if let Some(s) = source.as_str() {
                *source = serde_json::Value::String(project_relative(s, &memory_root));
            }
        }
    }

    Ok(serde_json::to_vec(&map)?)
}

/// Strip a URL scheme, the in-memory root and any leading `/` or `./`.
fn project_relative(source: &str, memory_root: &str) -> String {
    let mut s = source;
    if let Some(idx) = s.find("://") {
        s = &s[idx + 3..];
    }
    s = s.strip_prefix(memory_root).unwrap_or(s);
    let s = s.trim_start_matches('/');
    s.strip_prefix("./").unwrap_or(s).to_string()
}

/// Everything in the output directory besides the primary script and its
/// map becomes a stylesheet or generic asset under `assets/`.
fn classify_assets(
    config: &AssembledConfig,
    output: &MemoryFs,
    artifacts: &mut Vec<CompiledArtifact>,
) {
    let script_path = config.output.script_path();
    let map_path = config.output.source_map_path();

    for path in output.list(&config.output.path) {
        if path == script_path || path == map_path {
            continue;
        }
        let Ok(rel) = path.strip_prefix(&config.output.path) else {
            continue;
        };
        let Some(data) = output.read(&path) else {
            continue;
        };

        let out = Path::new("assets").join(rel);
        artifacts.push(match path.extension().and_then(|e| e.to_str()) {
            Some("css") => CompiledArtifact::stylesheet(out, data.to_vec()),
            _ => CompiledArtifact::asset(out, data.to_vec()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ArtifactKind;
    use crate::config::test_config;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn output_with_script(config: &AssembledConfig, script: &[u8]) -> MemoryFs {
        let fs = MemoryFs::new();
        fs.write(config.output.script_path(), script.to_vec());
        fs
    }

    #[test]
    fn test_script_payload_untouched_for_client_targets() {
        let config = test_config(Target::Web);
        let output = output_with_script(&config, b"bundle-code");

        let artifacts = extract(&config, &output, None, BuildMode::Development).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].kind, ArtifactKind::Script);
        assert_eq!(artifacts[0].path, PathBuf::from("web.js"));
        assert_eq!(artifacts[0].data, b"bundle-code");
    }

    #[test]
    fn test_missing_script_is_error() {
        let config = test_config(Target::Web);
        assert!(extract(&config, &MemoryFs::new(), None, BuildMode::Development).is_err());
    }

    #[test]
    fn test_server_script_gets_manifest_prefix() {
        let config = test_config(Target::Server);
        let output = output_with_script(&config, b"server-code");

        let mut assets = BTreeMap::new();
        assets.insert("main".to_string(), vec!["web.js".to_string()]);
        let manifest = ChunkManifest {
            assets_by_chunk_name: assets,
            public_path: "/assets/".into(),
        };

        let artifacts =
            extract(&config, &output, Some(&manifest), BuildMode::Production).unwrap();
        let text = String::from_utf8(artifacts[0].data.clone()).unwrap();

        assert!(text.starts_with("__CHUNK_MANIFEST__ = {"));
        assert!(text.contains("\"main\":[\"web.js\"]"));
        assert!(text.ends_with(";\nserver-code"));
    }

    #[test]
    fn test_server_without_manifest_gets_null() {
        let config = test_config(Target::Server);
        let output = output_with_script(&config, b"server-code");

        let artifacts = extract(&config, &output, None, BuildMode::Production).unwrap();
        let text = String::from_utf8(artifacts[0].data.clone()).unwrap();
        assert!(text.starts_with("__CHUNK_MANIFEST__ = null;\n"));
    }

    #[test]
    fn test_source_map_paths_repaired() {
        let config = test_config(Target::Web);
        let output = output_with_script(&config, b"code");
        output.write(
            config.output.source_map_path(),
            br#"{"version":3,"sources":["bundle:///memory/packline/src/index.js","./lib/util.js"],"mappings":""}"#
                .to_vec(),
        );

        let artifacts = extract(&config, &output, None, BuildMode::Development).unwrap();
        let map = artifacts
            .iter()
            .find(|a| a.kind == ArtifactKind::SourceMap)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&map.data).unwrap();
        let sources: Vec<&str> = parsed["sources"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s.as_str().unwrap())
            .collect();
        assert_eq!(sources, vec!["src/index.js", "lib/util.js"]);
    }

    #[test]
    fn test_missing_source_map_is_not_an_error() {
        let config = test_config(Target::Web);
        let output = output_with_script(&config, b"code");
        let artifacts = extract(&config, &output, None, BuildMode::Development).unwrap();
        assert_eq!(artifacts.len(), 1);
    }

    #[test]
    fn test_production_classifies_remaining_assets() {
        let config = test_config(Target::Web);
        let output = output_with_script(&config, b"code");
        output.write(config.output.path.join("style.css"), b"body{}".to_vec());
        output.write(config.output.path.join("logo.png"), vec![0x89, 0x50]);

        let artifacts = extract(&config, &output, None, BuildMode::Production).unwrap();

        let css = artifacts
            .iter()
            .find(|a| a.kind == ArtifactKind::Stylesheet)
            .unwrap();
        assert_eq!(css.path, PathBuf::from("assets/style.css"));

        let asset = artifacts
            .iter()
            .find(|a| a.kind == ArtifactKind::GenericAsset)
            .unwrap();
        assert_eq!(asset.path, PathBuf::from("assets/logo.png"));
    }

    #[test]
    fn test_development_skips_asset_classification() {
        let config = test_config(Target::Web);
        let output = output_with_script(&config, b"code");
        output.write(config.output.path.join("style.css"), b"body{}".to_vec());

        let artifacts = extract(&config, &output, None, BuildMode::Development).unwrap();
        assert!(artifacts.iter().all(|a| a.kind == ArtifactKind::Script));
    }

    #[test]
    fn test_server_target_never_classifies_assets() {
        let config = test_config(Target::Server);
        let output = output_with_script(&config, b"code");
        output.write(config.output.path.join("style.css"), b"body{}".to_vec());

        let artifacts = extract(&config, &output, None, BuildMode::Production).unwrap();
        assert!(artifacts.iter().all(|a| a.kind == ArtifactKind::Script));
    }
}
