//! Project scan: enumerate the packline role files for an invocation.
//!
//! The reference host walks the project tree once and feeds every config
//! fragment, dependency manifest and startup script to the orchestrator,
//! duplicated per requested arch. Paths are kept relative to the project
//! root so fragment depth ordering and error attribution stay stable.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jwalk::WalkDir;

use crate::config::CONFIG_BASENAME;
use crate::debug;
use crate::deps::PACKAGES_BASENAME;
use crate::orchestrator::{InputFile, STARTUP_BASENAME};

/// Directories that never contain packline files.
const SKIP_DIRS: &[&str] = &["node_modules", "dist", ".packline"];

/// Basenames the orchestrator assigns a role to.
const ROLE_BASENAMES: &[&str] = &[CONFIG_BASENAME, PACKAGES_BASENAME, STARTUP_BASENAME];

pub fn scan_role_files(root: &Path, archs: &[String]) -> Result<Vec<InputFile>> {
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .skip_hidden(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .filter(|p| is_role_file(p) && !in_skipped_dir(root, p))
        .collect();
    paths.sort();

    let mut files = Vec::new();
    for path in paths {
        let contents =
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        debug!("scan"; "{}", rel.display());

        for arch in archs {
            files.push(InputFile::new(&rel, arch, contents.clone()));
        }
    }
    Ok(files)
}

fn is_role_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| ROLE_BASENAMES.contains(&name))
}

fn in_skipped_dir(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| SKIP_DIRS.contains(&name))
        })
}
