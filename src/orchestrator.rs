//! The orchestrator context and per-target build pipeline.
//!
//! All process-wide build state (fingerprint cache, compiler instances, the
//! chunk manifest, dependency cache, dev server) lives in one owned
//! [`Orchestrator`]. The host serializes invocations; running two builds on
//! one context concurrently is unsupported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::bundler::Bundler;
use crate::compile::{CompileDriver, CompiledArtifact, extract};
use crate::config::{
    AssembledConfig, AttributedError, CONFIG_BASENAME, ConfigFragment, assemble, prepare,
};
use crate::core::{Invocation, Target};
use crate::deps::{DepsCache, PACKAGES_BASENAME};
use crate::devserver::DevServerManager;
use crate::fingerprint::ContentHash;
use crate::{debug, log};

/// Basename identifying a startup script in the source tree.
pub const STARTUP_BASENAME: &str = "packline.startup.js";

/// Global the dev-server sub-config is assigned to in the emitted client
/// script, so the hot client knows where to open its event stream.
pub const DEV_SERVER_GLOBAL: &str = "__DEV_SERVER_CONFIG__";

/// One source file handed over by the host for an invocation.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: PathBuf,
    /// Platform/arch string the host compiles this file for.
    pub arch: String,
    pub contents: Vec<u8>,
    /// Package the file came from, if not the application itself.
    pub package: Option<String>,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>, arch: &str, contents: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            arch: arch.to_string(),
            contents,
            package: None,
        }
    }

    pub fn in_package(mut self, package: &str) -> Self {
        self.package = Some(package.to_string());
        self
    }

    fn basename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    fn role(&self) -> Option<FileRole> {
        match self.basename() {
            CONFIG_BASENAME => Some(FileRole::ConfigFragment),
            PACKAGES_BASENAME => Some(FileRole::DependencyManifest),
            STARTUP_BASENAME => Some(FileRole::Startup),
            _ => None,
        }
    }

    fn target(&self) -> Target {
        Target::from_arch(&self.arch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileRole {
    ConfigFragment,
    DependencyManifest,
    Startup,
}

/// Fatal errors that abort the whole invocation. Per-target compile and
/// fragment errors are reported in [`TargetReport`]s instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(
        "{}: build files must live in the application, not in package `{package}`",
        path.display()
    )]
    UsageInPackage { path: PathBuf, package: String },

    #[error("no {CONFIG_BASENAME} found in the source tree")]
    MissingConfig,

    #[error(transparent)]
    Environment(#[from] anyhow::Error),
}

/// The outcome for one target: attributed non-fatal errors, the bundler's
/// compile errors, and the artifacts produced (empty when compilation
/// failed or the target is served live by the dev server).
#[derive(Debug)]
pub struct TargetReport {
    pub target: Target,
    pub errors: Vec<AttributedError>,
    pub compile_errors: Vec<String>,
    pub artifacts: Vec<CompiledArtifact>,
    /// The merged dependency set differs from the previous invocation's;
    /// the host should reinstall before running the output.
    pub dependencies_changed: bool,
}

impl TargetReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || !self.compile_errors.is_empty()
    }
}

pub struct Orchestrator {
    deps_root: PathBuf,
    driver: CompileDriver,
    deps: DepsCache,
    dev_server: DevServerManager,
    /// Lowest-priority dev-server host/port, e.g. from CLI flags. Fragments
    /// still override.
    serve_defaults: Option<(String, u16)>,
}

impl Orchestrator {
    pub fn new(bundler: Arc<dyn Bundler>, project_root: &Path) -> Self {
        Self {
            deps_root: project_root.join(".packline").join("deps"),
            driver: CompileDriver::new(Arc::clone(&bundler)),
            deps: DepsCache::new(),
            dev_server: DevServerManager::new(bundler),
            serve_defaults: None,
        }
    }

    pub fn with_serve_defaults(mut self, host: &str, port: u16) -> Self {
        self.serve_defaults = Some((host.to_string(), port));
        self
    }

    /// Run one build invocation over the host's files.
    ///
    /// Files are grouped by target (derived from their arch string) and each
    /// target runs the full pipeline in compile order, clients before the
    /// server so the web chunk manifest exists when the server script embeds
    /// it.
    pub fn run_invocation(
        &mut self,
        files: &[InputFile],
        invocation: &Invocation,
    ) -> Result<Vec<TargetReport>, OrchestratorError> {
        let env_vars: BTreeMap<String, String> = std::env::vars().collect();
        self.run_with_env(files, invocation, &env_vars)
    }

    fn run_with_env(
        &mut self,
        files: &[InputFile],
        invocation: &Invocation,
        env_vars: &BTreeMap<String, String>,
    ) -> Result<Vec<TargetReport>, OrchestratorError> {
        let role_files: Vec<&InputFile> =
            files.iter().filter(|f| f.role().is_some()).collect();

        for file in &role_files {
            if let Some(package) = &file.package {
                return Err(OrchestratorError::UsageInPackage {
                    path: file.path.clone(),
                    package: package.clone(),
                });
            }
        }
        if !role_files
            .iter()
            .any(|f| f.role() == Some(FileRole::ConfigFragment))
        {
            return Err(OrchestratorError::MissingConfig);
        }

        let mut reports = Vec::new();
        for target in Target::COMPILE_ORDER {
            let for_target: Vec<&InputFile> = role_files
                .iter()
                .copied()
                .filter(|f| f.target() == target)
                .collect();
            if for_target.is_empty() {
                continue;
            }
            reports.push(self.process_target(target, &for_target, invocation, env_vars)?);
        }
        Ok(reports)
    }

    fn process_target(
        &mut self,
        target: Target,
        files: &[&InputFile],
        invocation: &Invocation,
        env_vars: &BTreeMap<String, String>,
    ) -> Result<TargetReport, OrchestratorError> {
        debug!("build"; "{}: {} input file(s)", target, files.len());

        let fragments: Vec<ConfigFragment> = files
            .iter()
            .filter(|f| f.role() == Some(FileRole::ConfigFragment))
            .map(|f| {
                ConfigFragment::new(&f.path, String::from_utf8_lossy(&f.contents).into_owned())
            })
            .collect();
        let fingerprints: Vec<ContentHash> = fragments.iter().map(|f| f.fingerprint).collect();

        let (mut merged, mut errors) = assemble(target, &fragments);
        self.apply_serve_defaults(&mut merged.table);

        // Mirror runs never touch dependency bookkeeping.
        let mut dependencies_changed = false;
        if !invocation.mirror {
            let manifests: Vec<&InputFile> = files
                .iter()
                .copied()
                .filter(|f| f.role() == Some(FileRole::DependencyManifest))
                .collect();
            let set = self.deps.merge(target, &manifests);
            errors.extend(set.errors);
            dependencies_changed = set.changed;
            if set.changed {
                log!("build"; "{}: dependencies changed ({} package(s))", target, set.packages.len());
            }
        }

        let using_dev_server = invocation.uses_dev_server(target);
        let (config, prepare_errors) = prepare(
            target,
            merged,
            invocation,
            &self.deps_root,
            using_dev_server,
            env_vars,
        );
        errors.extend(prepare_errors);

        let (compile_errors, mut artifacts) = if using_dev_server {
            let compile_errors = self.dev_server.sync_target(&config, &fingerprints)?;
            (compile_errors, vec![dev_server_config_artifact(&config)])
        } else {
            self.compile_target(&config, &fingerprints, invocation)
        };

        for file in files {
            if file.role() == Some(FileRole::Startup) {
                artifacts.push(CompiledArtifact::script(
                    file.basename(),
                    file.contents.clone(),
                ));
            }
        }

        Ok(TargetReport {
            target,
            errors,
            compile_errors,
            artifacts,
            dependencies_changed,
        })
    }

    fn compile_target(
        &mut self,
        config: &AssembledConfig,
        fingerprints: &[ContentHash],
        invocation: &Invocation,
    ) -> (Vec<String>, Vec<CompiledArtifact>) {
        let outcome = self.driver.compile(config, fingerprints);
        let Some(output) = outcome.output else {
            return (outcome.errors, Vec::new());
        };

        match extract(config, &output, self.driver.manifest(), invocation.mode) {
            Ok(artifacts) => (Vec::new(), artifacts),
            Err(e) => (vec![e.to_string()], Vec::new()),
        }
    }

    /// Fold CLI host/port under any fragment-declared dev-server keys.
    fn apply_serve_defaults(&self, table: &mut toml::Table) {
        let Some((host, port)) = &self.serve_defaults else {
            return;
        };
        let dev = table
            .entry("dev_server")
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if let toml::Value::Table(dev) = dev {
            dev.entry("host")
                .or_insert_with(|| toml::Value::String(host.clone()));
            dev.entry("port")
                .or_insert_with(|| toml::Value::Integer(i64::from(*port)));
        }
    }

    /// Block until Ctrl+C once the dev server is up.
    pub fn wait_for_shutdown(&self) {
        self.dev_server.block_until_shutdown();
    }
}

/// Script artifact assigning the dev-server sub-config to a global, loaded
/// by clients before the hot client connects.
fn dev_server_config_artifact(config: &AssembledConfig) -> CompiledArtifact {
    let json = serde_json::to_string(&config.dev_server).unwrap_or_else(|_| "null".into());
    CompiledArtifact::script(
        "dev-server.js",
        format!("{DEV_SERVER_GLOBAL} = {json};\n").into_bytes(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::fake::FakeBundler;
    use crate::compile::{ArtifactKind, MANIFEST_GLOBAL};

    fn file(path: &str, arch: &str, contents: &str) -> InputFile {
        InputFile::new(path, arch, contents.as_bytes().to_vec())
    }

    fn orchestrator(bundler: &FakeBundler) -> Orchestrator {
        Orchestrator::new(Arc::new(bundler.clone()), Path::new("/project"))
    }

    fn run(
        orchestrator: &mut Orchestrator,
        files: &[InputFile],
        invocation: Invocation,
    ) -> Vec<TargetReport> {
        orchestrator
            .run_with_env(files, &invocation, &BTreeMap::new())
            .unwrap()
    }

    #[test]
    fn test_production_build_emits_artifacts() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files = [file("app/packline.conf.toml", "web.browser", "entry = \"./index.js\"")];

        let reports = run(&mut orch, &files, Invocation::production());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].target, Target::Web);
        assert!(!reports[0].has_errors());

        let script = &reports[0].artifacts[0];
        assert_eq!(script.kind, ArtifactKind::Script);
        assert_eq!(script.data, b"code");
    }

    #[test]
    fn test_server_embeds_web_manifest() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files = [
            file("app/packline.conf.toml", "web.browser", "entry = \"./index.js\""),
            file("app/packline.conf.toml", "os.linux.x86_64", "entry = \"./index.js\""),
        ];

        let reports = run(&mut orch, &files, Invocation::production());
        assert_eq!(reports.len(), 2);
        // Clients compile before the server.
        assert_eq!(reports[0].target, Target::Web);
        assert_eq!(reports[1].target, Target::Server);

        let server_script = String::from_utf8(reports[1].artifacts[0].data.clone()).unwrap();
        assert!(server_script.starts_with(MANIFEST_GLOBAL));
        assert!(server_script.contains("web.js"));
    }

    #[test]
    fn test_server_alone_gets_null_manifest() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files = [file("app/packline.conf.toml", "os", "entry = \"./index.js\"")];

        let reports = run(&mut orch, &files, Invocation::production());
        let script = String::from_utf8(reports[0].artifacts[0].data.clone()).unwrap();
        assert!(script.starts_with("__CHUNK_MANIFEST__ = null;"));
    }

    #[test]
    fn test_missing_config_is_fatal() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files = [file("app/packline.packages.json", "web.browser", "{}")];

        let err = orch
            .run_with_env(&files, &Invocation::production(), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingConfig));
    }

    #[test]
    fn test_package_attributed_file_is_fatal() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files =
            [file("pkg/packline.conf.toml", "web.browser", "").in_package("some:package")];

        let err = orch
            .run_with_env(&files, &Invocation::production(), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UsageInPackage { .. }));
    }

    #[test]
    fn test_invalid_fragment_attributed_but_build_continues() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files = [
            file("app/packline.conf.toml", "web.browser", "entry = [broken"),
            file("app/lib/packline.conf.toml", "web.browser", "entry = \"./index.js\""),
        ];

        let reports = run(&mut orch, &files, Invocation::production());
        assert_eq!(reports[0].errors.len(), 1);
        assert!(reports[0].errors[0].path.ends_with("app/packline.conf.toml"));
        assert!(!reports[0].artifacts.is_empty());
    }

    #[test]
    fn test_mistyped_merged_key_reported() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        // Valid TOML, wrong type for a known key: the target still builds
        // with defaults, but the report must carry the error.
        let files = [file("app/packline.conf.toml", "web.browser", "entry = 123")];

        let reports = run(&mut orch, &files, Invocation::production());
        assert_eq!(reports[0].errors.len(), 1);
        assert!(reports[0].errors[0].path.ends_with("app/packline.conf.toml"));
        assert!(reports[0].has_errors());
    }

    #[test]
    fn test_compile_errors_suppress_artifacts() {
        let bundler = FakeBundler::new(b"code").with_errors(&["module not found"]);
        let mut orch = orchestrator(&bundler);
        let files = [file("app/packline.conf.toml", "web.browser", "entry = \"./a.js\"")];

        let reports = run(&mut orch, &files, Invocation::production());
        assert_eq!(reports[0].compile_errors, vec!["module not found".to_string()]);
        assert!(reports[0].artifacts.is_empty());
    }

    #[test]
    fn test_unchanged_invocation_reuses_instance() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files = [file("app/packline.conf.toml", "web.browser", "entry = \"./a.js\"")];

        run(&mut orch, &files, Invocation::production());
        run(&mut orch, &files, Invocation::production());

        assert_eq!(bundler.instantiations(), 1);
        assert_eq!(bundler.run_count(), 2);
    }

    #[test]
    fn test_startup_scripts_pass_through() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files = [
            file("app/packline.conf.toml", "os", "entry = \"./index.js\""),
            file("app/packline.startup.js", "os", "require('./server');"),
        ];

        let reports = run(&mut orch, &files, Invocation::production());
        let startup = reports[0]
            .artifacts
            .iter()
            .find(|a| a.path == PathBuf::from(STARTUP_BASENAME))
            .unwrap();
        assert_eq!(startup.data, b"require('./server');");
    }

    #[test]
    fn test_dependency_manifests_merge_and_flag_changes() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files = [
            file("app/packline.conf.toml", "web.browser", "entry = \"./a.js\""),
            file("app/packline.packages.json", "web.browser", r#"{"lodash": "^4.0"}"#),
        ];

        let reports = run(&mut orch, &files, Invocation::production());
        assert!(reports[0].dependencies_changed);

        let reports = run(&mut orch, &files, Invocation::production());
        assert!(!reports[0].dependencies_changed);
    }

    #[test]
    fn test_invalid_dependency_manifest_attributed() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files = [
            file("app/packline.conf.toml", "web.browser", "entry = \"./a.js\""),
            file("app/packline.packages.json", "web.browser", "{not json"),
        ];

        let reports = run(&mut orch, &files, Invocation::production());
        assert_eq!(reports[0].errors.len(), 1);
        assert!(reports[0].errors[0].path.ends_with("packline.packages.json"));
    }

    #[test]
    fn test_development_serves_instead_of_packaging() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler).with_serve_defaults("localhost", 0);
        let files = [file("app/packline.conf.toml", "web.browser", "entry = \"./a.js\"")];

        let reports = run(&mut orch, &files, Invocation::development());
        assert_eq!(bundler.instantiations(), 1);

        let config_script = String::from_utf8(reports[0].artifacts[0].data.clone()).unwrap();
        assert!(config_script.starts_with(DEV_SERVER_GLOBAL));
        // No bundle artifact: the dev server serves it from memory.
        assert_eq!(reports[0].artifacts.len(), 1);
    }

    #[test]
    fn test_mirror_skips_dependency_bookkeeping() {
        let bundler = FakeBundler::new(b"code");
        let mut orch = orchestrator(&bundler);
        let files = [
            file("app/packline.conf.toml", "web.browser", "entry = \"./a.js\""),
            file("app/packline.packages.json", "web.browser", r#"{"lodash": "^4.0"}"#),
        ];
        let mirror = Invocation {
            mirror: true,
            ..Invocation::production()
        };

        let reports = run(&mut orch, &files, mirror);
        assert!(!reports[0].dependencies_changed);
        assert!(reports[0].errors.is_empty());
    }
}
