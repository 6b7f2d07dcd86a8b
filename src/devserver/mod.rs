//! Development server lifecycle.
//!
//! One HTTP server is bound lazily for the whole process and outlives build
//! invocations. Each client target contributes one middleware pair (bundle +
//! hot channel); [`DevServerManager::sync_target`] keeps the pair when the
//! target's config fingerprints are unchanged and swaps it (close old,
//! detach by token, attach fresh) when they differ.

mod bundle;
mod hot;
mod middleware;

pub use bundle::BundleMiddleware;
pub use hot::{HotChannel, HotMiddleware};
pub use middleware::{Middleware, MiddlewareStack, MiddlewareToken};

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use crossbeam::channel::{self, Receiver};
use rustc_hash::{FxHashMap, FxHashSet};
use tiny_http::{Response, Server, StatusCode};

use crate::bundler::{Bundler, MemoryFs};
use crate::config::{AssembledConfig, DevServerConfig};
use crate::core::{Target, register_server};
use crate::fingerprint::ContentHash;
use crate::{debug, log};

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// The attached middleware pair for one target, keyed by the fingerprints
/// of the config it was built from. The set ignores enumeration order, so a
/// host walking the tree differently does not force a swap.
struct DevServerState {
    fingerprints: FxHashSet<ContentHash>,
    bundle_token: MiddlewareToken,
    hot_token: MiddlewareToken,
    bundle: Arc<BundleMiddleware>,
}

struct Listener {
    port: u16,
    shutdown_rx: Receiver<()>,
}

pub struct DevServerManager {
    bundler: Arc<dyn Bundler>,
    stack: Arc<MiddlewareStack>,
    states: FxHashMap<Target, DevServerState>,
    listener: Option<Listener>,
}

impl DevServerManager {
    pub fn new(bundler: Arc<dyn Bundler>) -> Self {
        Self {
            bundler,
            stack: Arc::new(MiddlewareStack::new()),
            states: FxHashMap::default(),
            listener: None,
        }
    }

    /// Bring one target's middleware pair in sync with its assembled config.
    ///
    /// Unchanged fingerprints mean no action; changed fingerprints close the
    /// old bundle middleware, detach the pair by token and attach a fresh
    /// pair around a new compiler instance. Returns the initial compile's
    /// error list (empty on success) — compile errors are per-target and
    /// never tear down the server.
    pub fn sync_target(
        &mut self,
        config: &AssembledConfig,
        fingerprints: &[ContentHash],
    ) -> Result<Vec<String>> {
        self.ensure_listening(&config.dev_server)?;

        let incoming: FxHashSet<ContentHash> = fingerprints.iter().copied().collect();
        if let Some(state) = self.states.get(&config.target)
            && state.fingerprints == incoming
        {
            debug!("serve"; "{}: config unchanged, middleware kept", config.target);
            return Ok(Vec::new());
        }

        if let Some(old) = self.states.remove(&config.target) {
            old.bundle.close();
            self.stack.remove(old.bundle_token);
            self.stack.remove(old.hot_token);
            log!("serve"; "{}: config changed, middleware replaced", config.target);
        }

        let instance = self.bundler.instantiate(config, MemoryFs::new())?;
        let hot = HotChannel::new();
        let bundle = BundleMiddleware::new(config, instance, Arc::clone(&hot));

        let errors = bundle.compile();
        if let Some(dir) = &config.context {
            bundle.watch(dir);
        }

        let bundle_token = self.stack.push(Arc::clone(&bundle) as Arc<dyn Middleware>);
        let hot_token = self
            .stack
            .push(Arc::new(HotMiddleware::new(hot, config.target)));
        self.states.insert(
            config.target,
            DevServerState {
                fingerprints: incoming,
                bundle_token,
                hot_token,
                bundle,
            },
        );

        Ok(errors)
    }

    /// Port the server is bound to, once it is listening.
    pub fn port(&self) -> Option<u16> {
        self.listener.as_ref().map(|l| l.port)
    }

    /// Block the calling thread until shutdown is signalled. A manager that
    /// never started listening returns immediately.
    pub fn block_until_shutdown(&self) {
        if let Some(listener) = &self.listener {
            let _ = listener.shutdown_rx.recv();
        }
    }

    fn ensure_listening(&mut self, dev: &DevServerConfig) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }

        let (server, port) = bind_with_retry(&dev.host, dev.port)?;
        let server = Arc::new(server);

        let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
        register_server(Arc::clone(&server), shutdown_tx);

        let stack = Arc::clone(&self.stack);
        let loop_server = Arc::clone(&server);
        thread::spawn(move || run_request_loop(&loop_server, &stack));

        log!("serve"; "{}//{}:{}", dev.protocol, dev.host, port);
        self.listener = Some(Listener { port, shutdown_rx });
        Ok(())
    }

    #[cfg(test)]
    fn middleware_count(&self) -> usize {
        self.stack.len()
    }
}

/// Bind to the configured host and port, retrying on the next ports when
/// the requested one is taken. Port 0 binds an ephemeral port.
fn bind_with_retry(host: &str, base_port: u16) -> Result<(Server, u16)> {
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        match Server::http((host, port)) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                let actual = server
                    .server_addr()
                    .to_ip()
                    .map(|a| a.port())
                    .unwrap_or(port);
                return Ok((server, actual));
            }
            Err(_) if base_port > 0 && offset + 1 < MAX_PORT_RETRIES => continue,
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to bind dev server on {}:{}: {}",
                    host,
                    port,
                    e
                ));
            }
        }
    }
    unreachable!()
}

/// Accept loop: each request runs through the middleware stack on a small
/// worker pool, so a blocking compile or event stream never stalls other
/// requests.
fn run_request_loop(server: &Server, stack: &Arc<MiddlewareStack>) {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .expect("failed to create dev server thread pool");

    for request in server.incoming_requests() {
        if crate::core::is_shutdown() {
            break;
        }
        let stack = Arc::clone(stack);
        pool.spawn(move || {
            if let Some(request) = stack.dispatch(request) {
                let response = Response::empty(StatusCode(404))
                    .with_header(middleware::make_header("Access-Control-Allow-Origin", "*"));
                let _ = request.respond(response);
            }
        });
    }
}
