//! Hot-update event channel.
//!
//! Clients open a long-lived server-sent-events stream on the target's
//! channel path (`/__hot/<target>`); every rebuild publishes one event to
//! all connected streams. The stream body is backed by a channel receiver,
//! so a response thread blocks in `recv` between events.

use std::io::Read;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tiny_http::{Request, Response, StatusCode};

use super::middleware::{Middleware, make_header};
use crate::config::hot_channel_path;
use crate::core::Target;
use crate::debug;
use crate::utils::mime;

/// Broadcast side of the channel, shared between the bundle middleware
/// (publisher) and the hot middleware (subscriber endpoint).
#[derive(Default)]
pub struct HotChannel {
    clients: Mutex<Vec<Sender<String>>>,
}

impl HotChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish one event payload to every connected client. Clients whose
    /// stream has closed are dropped here.
    pub fn publish(&self, payload: &str) {
        let frame = format!("data: {payload}\n\n");
        let mut clients = self.clients.lock();
        clients.retain(|tx| tx.send(frame.clone()).is_ok());
        debug!("hot"; "event published to {} client(s)", clients.len());
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    fn subscribe(&self) -> Receiver<String> {
        let (tx, rx) = channel::unbounded();
        // Comment frame so proxies flush the stream right away.
        let _ = tx.send(":ok\n\n".to_string());
        self.clients.lock().push(tx);
        rx
    }
}

/// Serves the event stream endpoint for one target's channel. The path is
/// target-scoped so multiple client targets can share the server.
pub struct HotMiddleware {
    channel: Arc<HotChannel>,
    path: String,
}

impl HotMiddleware {
    pub fn new(channel: Arc<HotChannel>, target: Target) -> Self {
        Self {
            channel,
            path: hot_channel_path(target),
        }
    }
}

impl Middleware for HotMiddleware {
    fn handle(&self, request: Request) -> Option<Request> {
        let path = request.url().split('?').next().unwrap_or_default();
        if path != self.path {
            return Some(request);
        }

        let stream = EventStream {
            rx: self.channel.subscribe(),
            pending: Vec::new(),
        };
        let response = Response::new(
            StatusCode(200),
            vec![
                make_header("Content-Type", mime::types::EVENT_STREAM),
                make_header("Cache-Control", "no-cache"),
                make_header("Access-Control-Allow-Origin", "*"),
            ],
            stream,
            None,
            None,
        );
        if let Err(e) = request.respond(response) {
            debug!("hot"; "client disconnected: {e}");
        }
        None
    }
}

/// Adapts the per-client receiver into the blocking `Read` the HTTP
/// response body wants. End of stream when the channel closes.
struct EventStream {
    rx: Receiver<String>,
    pending: Vec<u8>,
}

impl Read for EventStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(frame) => self.pending = frame.into_bytes(),
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_subscriber() {
        let channel = HotChannel::new();
        let rx = channel.subscribe();

        assert_eq!(rx.recv().unwrap(), ":ok\n\n");
        channel.publish(r#"{"action":"built"}"#);
        assert_eq!(rx.recv().unwrap(), "data: {\"action\":\"built\"}\n\n");
    }

    #[test]
    fn test_disconnected_clients_pruned_on_publish() {
        let channel = HotChannel::new();
        let rx = channel.subscribe();
        assert_eq!(channel.client_count(), 1);

        drop(rx);
        channel.publish("x");
        assert_eq!(channel.client_count(), 0);
    }

    #[test]
    fn test_event_stream_reads_frames() {
        let channel = HotChannel::new();
        let mut stream = EventStream {
            rx: channel.subscribe(),
            pending: Vec::new(),
        };
        channel.publish("hello");
        drop(channel);

        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, ":ok\n\ndata: hello\n\n");
    }
}
