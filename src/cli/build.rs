//! One-shot build command.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use super::args::{BuildArgs, Cli};
use super::scan;
use crate::bundler::ExternalBundler;
use crate::core::{BuildMode, Invocation};
use crate::orchestrator::{Orchestrator, TargetReport};
use crate::{debug, log};

pub fn run_build(_cli: &Cli, args: &BuildArgs) -> Result<()> {
    let start = Instant::now();
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("Invalid project root {}", args.root.display()))?;

    let invocation = Invocation {
        mode: if args.development {
            BuildMode::Development
        } else {
            BuildMode::Production
        },
        one_shot: true,
        mirror: false,
    };

    let files = scan::scan_role_files(&root, &args.targets)?;
    let bundler = Arc::new(ExternalBundler::new(args.bundler_command(), &root));
    let mut orchestrator = Orchestrator::new(bundler, &root);

    let reports = orchestrator.run_invocation(&files, &invocation)?;
    let failed = report_outcomes(&reports);
    write_artifacts(&reports, &root.join("dist"))?;

    if failed {
        anyhow::bail!("build failed");
    }
    log!("build"; "finished in {:.2?}", start.elapsed());
    Ok(())
}

/// Log every per-target error; true when any target failed.
pub(super) fn report_outcomes(reports: &[TargetReport]) -> bool {
    for report in reports {
        for error in &report.errors {
            log!("error"; "{error}");
        }
        for error in &report.compile_errors {
            log!("error"; "{}: {error}", report.target);
        }
        if report.dependencies_changed {
            log!("build"; "{}: dependency set changed, reinstall before running", report.target);
        }
    }
    reports.iter().any(TargetReport::has_errors)
}

/// Write each target's artifacts under `dist/<target>/`.
pub(super) fn write_artifacts(reports: &[TargetReport], dist: &Path) -> Result<()> {
    for report in reports {
        let target_dir = dist.join(report.target.as_str());
        for artifact in &report.artifacts {
            let path = target_dir.join(&artifact.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, &artifact.data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!("build"; "wrote {}", path.display());
        }
        if !report.artifacts.is_empty() {
            log!("build"; "{}: {} artifact(s)", report.target, report.artifacts.len());
        }
    }
    Ok(())
}
