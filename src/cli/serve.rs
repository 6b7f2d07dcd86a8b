//! Development serve command.

use std::sync::Arc;

use anyhow::{Context, Result};

use super::args::{BuildArgs, Cli};
use super::{build, scan};
use crate::bundler::ExternalBundler;
use crate::core::Invocation;
use crate::log;
use crate::orchestrator::Orchestrator;

pub fn run_serve(_cli: &Cli, args: &BuildArgs, port: u16, host: &str) -> Result<()> {
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("Invalid project root {}", args.root.display()))?;

    let invocation = Invocation::development();
    let files = scan::scan_role_files(&root, &args.targets)?;

    let bundler = Arc::new(ExternalBundler::new(args.bundler_command(), &root));
    let mut orchestrator =
        Orchestrator::new(bundler, &root).with_serve_defaults(host, port);

    let reports = orchestrator.run_invocation(&files, &invocation)?;
    build::report_outcomes(&reports);
    // Server-target artifacts (and startup scripts) still land on disk; the
    // client targets are served from memory.
    build::write_artifacts(&reports, &root.join("dist"))?;

    log!("serve"; "watching for changes, Ctrl+C to stop");
    orchestrator.wait_for_shutdown();
    Ok(())
}
