//! The transport contract: how bytes (or in-process values) become framed
//! [`crate::Message`]s and vice versa, decoupled from the `Pair` protocol.

mod duplex;
mod stream;
mod websocket;

pub use duplex::duplex;
pub use stream::{StreamTransport, TransportEvent};
pub use websocket::WebSocketTransport;

use crate::pair::Pair;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A transport pairs a `Pair`'s `incoming` entry point with its `setSend`
/// slot. Implementors call `pair.set_send(..)` once to install their
/// outbound function, then dispatch every decoded inbound message to
/// `pair.incoming(..)`.
pub trait Transport {
    /// Wires this transport to `pair`, returning a handle that tears the
    /// wiring back down.
    fn attach(self, pair: &Arc<Pair>) -> DisconnectHandle;
}

/// Releases both directions of a transport: replaces the pair's send
/// function with a no-op and aborts the read loop task. Dropping the handle
/// without calling `disconnect` leaves the transport running — send and
/// receive are independently owned so closing one does not require
/// blocking on the other.
pub struct DisconnectHandle {
    pair: Arc<Pair>,
    read_task: JoinHandle<()>,
    disconnected: Arc<AtomicBool>,
}

impl DisconnectHandle {
    pub(crate) fn new(pair: Arc<Pair>, read_task: JoinHandle<()>) -> Self {
        DisconnectHandle {
            pair,
            read_task,
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the pair's send function with a no-op and aborts the read
    /// loop. Idempotent.
    pub fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pair.clear_send();
        self.read_task.abort();
    }
}

impl Drop for DisconnectHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}
