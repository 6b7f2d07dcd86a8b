//! Scripted bundler used by driver, dev-server and orchestrator tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;

use super::{Bundler, CompilerInstance, MemoryFs, RunStats};
use crate::config::AssembledConfig;

/// A bundler whose instances write a scripted output tree on every run.
/// Instantiation and run counts are observable, so tests can assert the
/// reuse semantics of the fingerprint cache and dev-server lifecycle.
#[derive(Clone)]
pub struct FakeBundler {
    pub instantiated: Arc<AtomicUsize>,
    pub runs: Arc<AtomicUsize>,
    /// Payload written as the primary script.
    pub script: Vec<u8>,
    /// Extra files (path relative to the output dir, payload).
    pub extra_files: Vec<(String, Vec<u8>)>,
    /// Errors reported in the run stats.
    pub errors: Vec<String>,
    /// When true, `run` fails outright instead of reporting stats.
    pub fail_run: bool,
}

impl FakeBundler {
    pub fn new(script: &[u8]) -> Self {
        Self {
            instantiated: Arc::new(AtomicUsize::new(0)),
            runs: Arc::new(AtomicUsize::new(0)),
            script: script.to_vec(),
            extra_files: Vec::new(),
            errors: Vec::new(),
            fail_run: false,
        }
    }

    pub fn with_extra_file(mut self, path: &str, data: &[u8]) -> Self {
        self.extra_files.push((path.into(), data.to_vec()));
        self
    }

    pub fn with_errors(mut self, errors: &[&str]) -> Self {
        self.errors = errors.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_run = true;
        self
    }

    pub fn instantiations(&self) -> usize {
        self.instantiated.load(Ordering::SeqCst)
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Bundler for FakeBundler {
    fn instantiate(
        &self,
        config: &AssembledConfig,
        output: MemoryFs,
    ) -> Result<Box<dyn CompilerInstance>> {
        self.instantiated.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeInstance {
            bundler: self.clone(),
            out_dir: config.output.path.clone(),
            script_path: config.output.script_path(),
            public_path: config.output.public_path.clone(),
            output,
        }))
    }
}

struct FakeInstance {
    bundler: FakeBundler,
    out_dir: PathBuf,
    script_path: PathBuf,
    public_path: String,
    output: MemoryFs,
}

impl CompilerInstance for FakeInstance {
    fn run(&mut self) -> Result<RunStats> {
        self.bundler.runs.fetch_add(1, Ordering::SeqCst);

        if self.bundler.fail_run {
            anyhow::bail!("bundler invocation failed");
        }

        self.output.clear();
        self.output
            .write(self.script_path.clone(), self.bundler.script.clone());
        for (rel, data) in &self.bundler.extra_files {
            self.output.write(self.out_dir.join(rel), data.clone());
        }

        let mut stats = RunStats {
            errors: self.bundler.errors.clone(),
            public_path: self.public_path.clone(),
            ..Default::default()
        };
        stats.assets_by_chunk_name.insert(
            "main".into(),
            vec![
                self.script_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ],
        );
        Ok(stats)
    }

    fn output(&self) -> &MemoryFs {
        &self.output
    }
}
