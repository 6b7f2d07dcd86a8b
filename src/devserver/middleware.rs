//! Token-addressed middleware stack.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tiny_http::{Header, Request};

/// Opaque handle returned by [`MiddlewareStack::push`]; detaching takes the
/// token back instead of poking at stack positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiddlewareToken(u64);

/// A request handler attached to the dev server.
pub trait Middleware: Send + Sync {
    /// Handle the request, or hand it back for the next middleware.
    fn handle(&self, request: Request) -> Option<Request>;

    /// Release resources held by this middleware. In-flight requests may
    /// race a close, so implementations must be idempotent.
    fn close(&self) {}
}

/// Ordered middleware list shared between the request loop and the manager.
/// Mutation is remove-then-insert under the write lock; dispatch snapshots
/// the list so handlers never run while the lock is held.
#[derive(Default)]
pub struct MiddlewareStack {
    entries: RwLock<Vec<(MiddlewareToken, Arc<dyn Middleware>)>>,
    next_token: AtomicU64,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, middleware: Arc<dyn Middleware>) -> MiddlewareToken {
        let token = MiddlewareToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.entries.write().push((token, middleware));
        token
    }

    /// Detach by token. A token that was already detached is a no-op.
    pub fn remove(&self, token: MiddlewareToken) -> Option<Arc<dyn Middleware>> {
        let mut entries = self.entries.write();
        let idx = entries.iter().position(|(t, _)| *t == token)?;
        Some(entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Run the request through the stack in attach order; gives the request
    /// back when no middleware handled it.
    pub fn dispatch(&self, request: Request) -> Option<Request> {
        let snapshot: Vec<Arc<dyn Middleware>> = self
            .entries
            .read()
            .iter()
            .map(|(_, m)| Arc::clone(m))
            .collect();

        let mut request = request;
        for middleware in snapshot {
            request = middleware.handle(request)?;
        }
        Some(request)
    }
}

/// Header constructor for static names and values.
pub(super) fn make_header(key: &str, value: &str) -> Header {
    Header::from_bytes(key.as_bytes(), value.as_bytes()).unwrap()
}
