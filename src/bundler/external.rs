//! Bundler implementation driving an external bundler command.
//!
//! The assembled config is serialized to JSON and the configured command is
//! run with a scratch output directory:
//!
//! ```text
//! <command> --config .packline/<target>/config.json --out-dir .packline/<target>/out
//! ```
//!
//! The command reports compile errors by writing them into `stats.json` in
//! the output directory and exiting 0; a non-zero exit is treated as a
//! failed invocation. Everything else in the output directory is loaded
//! into the in-memory filesystem under the config's output path.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use jwalk::WalkDir;

use super::{Bundler, CompilerInstance, MemoryFs, RunStats};
use crate::config::AssembledConfig;
use crate::debug;
use crate::utils::exec::Cmd;

/// Name of the stats file the bundler command emits.
const STATS_FILENAME: &str = "stats.json";

/// Scratch directory under the project root.
const SCRATCH_DIR: &str = ".packline";

pub struct ExternalBundler {
    command: Vec<String>,
    workdir: PathBuf,
}

impl ExternalBundler {
    pub fn new(command: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            workdir: workdir.into(),
        }
    }
}

impl Bundler for ExternalBundler {
    fn instantiate(
        &self,
        config: &AssembledConfig,
        output: MemoryFs,
    ) -> Result<Box<dyn CompilerInstance>> {
        let config_json =
            serde_json::to_string_pretty(config).context("Failed to serialize bundler config")?;

        // The command also sees the computed mode in its own environment.
        let node_env = config
            .defines
            .get("process.env.NODE_ENV")
            .map(|v| v.trim_matches('"').to_string());

        Ok(Box::new(ExternalInstance {
            command: self.command.clone(),
            scratch: self.workdir.join(SCRATCH_DIR).join(config.target.as_str()),
            workdir: self.workdir.clone(),
            memory_root: config.output.path.clone(),
            config_json,
            node_env,
            output,
        }))
    }
}

struct ExternalInstance {
    command: Vec<String>,
    scratch: PathBuf,
    workdir: PathBuf,
    memory_root: PathBuf,
    config_json: String,
    node_env: Option<String>,
    output: MemoryFs,
}

impl CompilerInstance for ExternalInstance {
    fn run(&mut self) -> Result<RunStats> {
        let out_dir = self.scratch.join("out");
        if out_dir.exists() {
            fs::remove_dir_all(&out_dir)
                .with_context(|| format!("Failed to clear {}", out_dir.display()))?;
        }
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;

        let config_path = self.scratch.join("config.json");
        fs::write(&config_path, &self.config_json)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        Cmd::from_slice(&self.command)
            .arg("--config")
            .arg(&config_path)
            .arg("--out-dir")
            .arg(&out_dir)
            .cwd(&self.workdir)
            .envs(self.node_env.iter().map(|v| ("NODE_ENV", v.as_str())))
            .run()?;

        self.harvest(&out_dir)
    }

    fn output(&self) -> &MemoryFs {
        &self.output
    }
}

impl ExternalInstance {
    /// Load the emitted files into the in-memory filesystem and parse the
    /// stats file.
    fn harvest(&self, out_dir: &PathBuf) -> Result<RunStats> {
        self.output.clear();
        let mut stats = RunStats::default();

        for entry in WalkDir::new(out_dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let rel = path
                .strip_prefix(out_dir)
                .context("walker escaped the output directory")?;

            let data = fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;

            if rel == std::path::Path::new(STATS_FILENAME) {
                stats = serde_json::from_slice(&data)
                    .with_context(|| format!("Invalid {STATS_FILENAME}"))?;
            } else {
                self.output.write(self.memory_root.join(rel), data);
            }
        }

        debug!("bundler"; "harvested {} output files", self.output.len());
        Ok(stats)
    }
}
