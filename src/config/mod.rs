//! Per-target configuration assembly.
//!
//! Configuration is contributed by declarative fragment files
//! (`packline.conf.toml`) scattered through the project tree. Shallower
//! fragments are merged first so deeper, more specific ones override them.
//! A fragment can branch on the target environment through `[when.server]`,
//! `[when.client]` and `[when.cordova]` overlay tables.

mod assemble;
mod error;
mod fragment;
mod prepare;

pub use assemble::{MergedConfig, assemble};
pub use error::AttributedError;
pub use fragment::{CONFIG_BASENAME, ConfigFragment};
pub use prepare::prepare;

use crate::core::Target;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root of the in-memory output filesystem handed to the bundler.
pub const MEMORY_OUTPUT_ROOT: &str = "/memory/packline";

/// Path prefix of the hot-update event channels on the dev server.
pub const HOT_CHANNEL_PATH: &str = "/__hot";

/// Path of one target's hot-update event channel. The server is shared, so
/// each target's channel gets its own path.
pub fn hot_channel_path(target: Target) -> String {
    format!("{HOT_CHANNEL_PATH}/{target}")
}

/// The merged, normalized configuration for one target. Exactly one exists
/// per target per build invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledConfig {
    #[serde(serialize_with = "serialize_target")]
    pub target: Target,
    /// Entry points, hot client entry first when the dev server applies.
    pub entry: Vec<String>,
    /// Base directory for resolving relative entries.
    pub context: Option<PathBuf>,
    pub output: OutputConfig,
    /// Module resolution roots (project roots plus the dependency root).
    pub resolve_roots: Vec<PathBuf>,
    pub resolve_loader_roots: Vec<PathBuf>,
    pub devtool: String,
    pub dev_server: DevServerConfig,
    /// Compile-time constants, name to JSON-encoded literal.
    pub defines: BTreeMap<String, String>,
    /// Unrecognized top-level fragment keys passed through to the bundler.
    pub extra: BTreeMap<String, toml::Value>,
}

fn serialize_target<S: serde::Serializer>(t: &Target, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(t.as_str())
}

/// Output location of the primary script artifact.
#[derive(Debug, Clone, Serialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub filename: String,
    pub public_path: String,
}

impl OutputConfig {
    /// Absolute (in-memory) path of the primary script.
    pub fn script_path(&self) -> PathBuf {
        self.path.join(&self.filename)
    }

    /// Absolute (in-memory) path of its source map.
    pub fn source_map_path(&self) -> PathBuf {
        self.path.join(format!("{}.map", self.filename))
    }

    /// URL path portion of the public path (scheme and authority stripped).
    pub fn public_url_path(&self) -> &str {
        let p = &self.public_path;
        match p.find("//") {
            Some(idx) => {
                let rest = &p[idx + 2..];
                match rest.find('/') {
                    Some(slash) => &rest[slash..],
                    None => "/",
                }
            }
            None => p,
        }
    }
}

/// Dev-server sub-config (also emitted to the client as a global).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevServerConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl DevServerConfig {
    /// Base URL, e.g. `http://localhost:3500`.
    pub fn base_url(&self) -> String {
        format!("{}//{}:{}", self.protocol, self.host, self.port)
    }

    /// Full URL of one target's hot-update channel.
    pub fn hot_channel_url(&self, target: Target) -> String {
        format!("{}{}", self.base_url(), hot_channel_path(target))
    }
}

/// Minimal config for tests elsewhere in the crate.
#[cfg(test)]
pub(crate) fn test_config(target: Target) -> AssembledConfig {
    AssembledConfig {
        target,
        entry: vec!["./index.js".into()],
        context: None,
        output: OutputConfig {
            path: PathBuf::from(MEMORY_OUTPUT_ROOT),
            filename: target.bundle_filename(),
            public_path: "http://localhost:3500/assets/".into(),
        },
        resolve_roots: vec![],
        resolve_loader_roots: vec![],
        devtool: "source-map".into(),
        dev_server: DevServerConfig {
            protocol: "http:".into(),
            host: "localhost".into(),
            port: 3500,
        },
        defines: BTreeMap::new(),
        extra: BTreeMap::new(),
    }
}
