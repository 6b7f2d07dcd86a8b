//! Post-merge normalization into an [`AssembledConfig`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{
    AssembledConfig, AttributedError, CONFIG_BASENAME, DevServerConfig, MEMORY_OUTPUT_ROOT,
    MergedConfig, OutputConfig,
};
use crate::core::{BuildMode, Invocation, Target};
use crate::debug;

/// Default dev-server endpoint.
const DEFAULT_PROTOCOL: &str = "http:";
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3500;

/// Known top-level fragment keys. Anything else passes through untouched in
/// `extra`; unknown keys inside known tables are dropped with a warning.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialConfig {
    entry: Option<OneOrMany>,
    context: Option<PathBuf>,
    output: PartialOutput,
    resolve: PartialResolve,
    resolve_loader: PartialResolve,
    devtool: Option<String>,
    dev_server: PartialDevServer,
    hot_middleware: BTreeMap<String, toml::Value>,
    define: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialOutput {
    public_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialResolve {
    root: Option<OneOrMany>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialDevServer {
    protocol: Option<String>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

/// Normalize a merged fragment table into the final per-target config:
/// apply defaults, force the in-memory output location and target filename,
/// compute the public path, extend resolve roots with the dependency root,
/// build the compile-time constant table (NODE_ENV always forced to the
/// orchestrator's computed mode) and, when a dev server applies, prepend the
/// hot-update client entry.
///
/// A known key with the wrong type falls back to defaults, but the mismatch
/// is returned as an attributed error so the target reports it.
pub fn prepare(
    target: Target,
    merged: MergedConfig,
    invocation: &Invocation,
    deps_root: &Path,
    using_dev_server: bool,
    env_vars: &BTreeMap<String, String>,
) -> (AssembledConfig, Vec<AttributedError>) {
    let source = merged.source;
    let (partial, extra, type_error) = split_known_keys(target, merged.table);

    let mut errors = Vec::new();
    if let Some(message) = type_error {
        let path = source.unwrap_or_else(|| PathBuf::from(CONFIG_BASENAME));
        errors.push(AttributedError::new(
            path,
            format!("malformed merged config: {message}"),
        ));
    }

    let dev_server = DevServerConfig {
        protocol: partial
            .dev_server
            .protocol
            .unwrap_or_else(|| DEFAULT_PROTOCOL.into()),
        host: partial
            .dev_server
            .host
            .unwrap_or_else(|| DEFAULT_HOST.into()),
        port: partial.dev_server.port.unwrap_or(DEFAULT_PORT),
    };

    let mut entry = partial.entry.map(OneOrMany::into_vec).unwrap_or_default();
    if using_dev_server {
        entry.insert(
            0,
            hot_client_entry(target, &dev_server, &partial.hot_middleware),
        );
    }

    let public_path = if invocation.mode.is_development() {
        format!("{}/assets/", dev_server.base_url())
    } else {
        "/assets/".to_string()
    };

    let output = OutputConfig {
        path: PathBuf::from(MEMORY_OUTPUT_ROOT),
        filename: target.bundle_filename(),
        public_path: partial.output.public_path.unwrap_or(public_path),
    };

    let mut resolve_roots: Vec<PathBuf> = partial
        .resolve
        .root
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(PathBuf::from)
        .collect();
    resolve_roots.push(deps_root.to_path_buf());

    let mut resolve_loader_roots: Vec<PathBuf> = partial
        .resolve_loader
        .root
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(PathBuf::from)
        .collect();
    resolve_loader_roots.push(deps_root.to_path_buf());

    let defines = build_defines(target, invocation.mode, env_vars, &partial.define);

    let config = AssembledConfig {
        target,
        entry,
        context: partial.context,
        output,
        resolve_roots,
        resolve_loader_roots,
        // source-map is the one devtool giving accurate lines without eval
        devtool: partial.devtool.unwrap_or_else(|| "source-map".into()),
        dev_server,
        defines,
        extra,
    };
    (config, errors)
}

/// Deserialize the known keys, collecting unknown top-level keys as
/// passthrough and warning about unknown nested ones. A type mismatch on a
/// known key yields defaults plus the failure message for attribution.
fn split_known_keys(
    target: Target,
    table: toml::Table,
) -> (PartialConfig, BTreeMap<String, toml::Value>, Option<String>) {
    let mut ignored: Vec<String> = Vec::new();
    let value = toml::Value::Table(table.clone());
    let mut type_error = None;
    let partial: PartialConfig =
        match serde_ignored::deserialize(value, |path: serde_ignored::Path<'_>| {
            ignored.push(path.to_string());
        }) {
            Ok(partial) => partial,
            Err(e) => {
                type_error = Some(e.to_string());
                PartialConfig::default()
            }
        };

    let mut extra = BTreeMap::new();
    for path in ignored {
        match path.split_once('.') {
            // Top-level unknown key: preserved verbatim for the bundler.
            None => {
                if let Some(v) = table.get(&path) {
                    extra.insert(path, v.clone());
                }
            }
            Some((top, _)) => {
                debug!("config"; "{}: ignoring unknown key `{}`", target, path);
                // A nested unknown inside an otherwise-unknown table is
                // already covered by the passthrough of its parent.
                let _ = top;
            }
        }
    }
    (partial, extra, type_error)
}

/// Encode the hot client entry with the channel URL and any hot middleware
/// options as a query string, e.g.
/// `hot-client?path=http://localhost:3500/__hot/web&reload=true`.
fn hot_client_entry(
    target: Target,
    dev_server: &DevServerConfig,
    hot_middleware: &BTreeMap<String, toml::Value>,
) -> String {
    let mut options = format!("path={}", dev_server.hot_channel_url(target));
    for (key, value) in hot_middleware {
        let encoded = match value {
            toml::Value::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        options.push('&');
        options.push_str(key);
        options.push('=');
        options.push_str(&encoded);
    }
    format!("hot-client?{options}")
}

/// Compile-time constants: every environment variable inlined by name, the
/// target descriptor booleans, then user-declared `[define]` entries.
/// NODE_ENV is always the orchestrator's computed mode, never the raw value.
fn build_defines(
    target: Target,
    mode: BuildMode,
    env_vars: &BTreeMap<String, String>,
    user: &BTreeMap<String, toml::Value>,
) -> BTreeMap<String, String> {
    let mut defines = BTreeMap::new();

    for (name, value) in env_vars {
        if name == "NODE_ENV" {
            continue;
        }
        defines.insert(
            format!("process.env.{name}"),
            serde_json::Value::String(value.clone()).to_string(),
        );
    }

    defines.insert(
        "process.env.NODE_ENV".into(),
        serde_json::Value::String(mode.node_env().into()).to_string(),
    );

    let env = target.env();
    defines.insert("env.isServer".into(), env.is_server.to_string());
    defines.insert("env.isClient".into(), env.is_client.to_string());
    defines.insert("env.isCordova".into(), env.is_cordova.to_string());

    for (name, value) in user {
        if let Ok(json) = serde_json::to_string(value) {
            defines.insert(name.clone(), json);
        }
    }

    defines
}
