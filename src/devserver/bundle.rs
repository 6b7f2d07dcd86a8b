//! Per-target bundle middleware.
//!
//! Owns the target's compiler instance, serves its in-memory output under
//! the config's public path, watches the config context directory and
//! recompiles + publishes a hot event when sources change.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde_json::json;
use tiny_http::{Request, Response};

use super::hot::HotChannel;
use super::middleware::{Middleware, make_header};
use crate::bundler::{CompilerInstance, MemoryFs};
use crate::config::AssembledConfig;
use crate::core::Target;
use crate::utils::mime;
use crate::{debug, log};

pub struct BundleMiddleware {
    target: Target,
    /// URL path prefix the output is served under (`/assets/`).
    public_prefix: String,
    /// In-memory root the bundler writes to; URL paths map below it.
    memory_root: PathBuf,
    output: MemoryFs,
    instance: Mutex<Box<dyn CompilerInstance>>,
    hot: Arc<HotChannel>,
    closed: AtomicBool,
    watcher: Mutex<Option<notify::RecommendedWatcher>>,
}

impl BundleMiddleware {
    pub fn new(
        config: &AssembledConfig,
        instance: Box<dyn CompilerInstance>,
        hot: Arc<HotChannel>,
    ) -> Arc<Self> {
        Arc::new(Self {
            target: config.target,
            public_prefix: config.output.public_url_path().to_string(),
            memory_root: config.output.path.clone(),
            output: instance.output().clone(),
            instance: Mutex::new(instance),
            hot,
            closed: AtomicBool::new(false),
            watcher: Mutex::new(None),
        })
    }

    /// Compile once, blocking, and publish the outcome on the hot channel.
    /// Returns the bundler's error list (empty on success).
    pub fn compile(&self) -> Vec<String> {
        let mut instance = self.instance.lock();
        let errors = match instance.run() {
            Ok(stats) => stats.errors,
            Err(e) => vec![e.to_string()],
        };

        if errors.is_empty() {
            debug!("serve"; "{}: compiled", self.target);
            self.hot.publish(&json!({ "action": "built" }).to_string());
        } else {
            log!("error"; "{}: {} compile error(s)", self.target, errors.len());
            self.hot
                .publish(&json!({ "action": "errors", "errors": errors }).to_string());
        }
        errors
    }

    /// Watch a source directory and recompile on changes. A directory that
    /// cannot be watched downgrades to manual rebuilds only.
    pub fn watch(self: &Arc<Self>, dir: &Path) {
        let this = Arc::downgrade(self);
        let watcher =
            notify::recommended_watcher(move |event: Result<notify::Event, notify::Error>| {
                let Ok(event) = event else { return };
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                if let Some(mw) = this.upgrade()
                    && !mw.is_closed()
                {
                    debug!("watch"; "{}: source change, recompiling", mw.target);
                    mw.compile();
                }
            });

        match watcher {
            Ok(mut watcher) => {
                if let Err(e) = watcher.watch(dir, RecursiveMode::Recursive) {
                    debug!("watch"; "{}: cannot watch {}: {e}", self.target, dir.display());
                } else {
                    debug!("watch"; "{}: watching {}", self.target, dir.display());
                    *self.watcher.lock() = Some(watcher);
                }
            }
            Err(e) => debug!("watch"; "{}: watcher unavailable: {e}", self.target),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Middleware for BundleMiddleware {
    fn handle(&self, request: Request) -> Option<Request> {
        if self.is_closed() {
            return Some(request);
        }

        let path = request.url().split('?').next().unwrap_or_default();
        let Some(rel) = path.strip_prefix(&self.public_prefix) else {
            return Some(request);
        };
        let file = self.memory_root.join(rel);
        let Some(data) = self.output.read(&file) else {
            return Some(request);
        };

        let response = Response::from_data(data.to_vec())
            .with_header(make_header("Content-Type", mime::from_path(&file)))
            .with_header(make_header("Access-Control-Allow-Origin", "*"));
        if let Err(e) = request.respond(response) {
            debug!("serve"; "{}: response dropped: {e}", self.target);
        }
        None
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.watcher.lock() = None;
        debug!("serve"; "{}: bundle middleware closed", self.target);
    }
}
