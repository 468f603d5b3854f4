//! In-process duplex transport.
//!
//! [`pair`] returns the server half (a [`Duplex`] to hand to
//! [`Registry::register`](crate::Registry::register)) and a [`MemoryPeer`]
//! that plays the remote client. Useful for in-process subscribers and for
//! driving the registry in tests without sockets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::transport::{Duplex, FrameSink, FrameSource, Inbound};

/// A frame written by the server towards the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

#[derive(Default)]
struct Faults {
    broken: AtomicBool,
    stalled: AtomicBool,
}

/// Create a connected server/peer pair.
pub fn pair() -> (MemoryDuplex, MemoryPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let faults = Arc::new(Faults::default());

    let duplex = MemoryDuplex {
        sink: MemorySink {
            tx: out_tx,
            faults: Arc::clone(&faults),
        },
        source: MemorySource { rx: in_rx },
    };
    let peer = MemoryPeer {
        tx: in_tx,
        rx: out_rx,
        faults,
    };
    (duplex, peer)
}

/// Server half of an in-memory connection.
pub struct MemoryDuplex {
    sink: MemorySink,
    source: MemorySource,
}

impl Duplex for MemoryDuplex {
    type Sink = MemorySink;
    type Source = MemorySource;

    fn split(self) -> (MemorySink, MemorySource) {
        (self.sink, self.source)
    }
}

pub struct MemorySink {
    tx: mpsc::UnboundedSender<Outbound>,
    faults: Arc<Faults>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.faults.stalled.load(Ordering::Acquire) {
            std::future::pending::<()>().await;
        }
        if self.faults.broken.load(Ordering::Acquire) {
            return Err(TransportError::Io("broken pipe".to_string()));
        }
        self.tx
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx
            .send(Outbound::Close)
            .map_err(|_| TransportError::Closed)
    }
}

pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Result<Inbound, TransportError>>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<Inbound, TransportError>> {
        self.rx.recv().await
    }
}

/// The remote end of an in-memory connection.
///
/// Dropping the peer ends the server's read stream and fails later sends,
/// like a client vanishing without a close frame.
pub struct MemoryPeer {
    tx: mpsc::UnboundedSender<Result<Inbound, TransportError>>,
    rx: mpsc::UnboundedReceiver<Outbound>,
    faults: Arc<Faults>,
}

impl MemoryPeer {
    pub fn send_text(&self, text: &str) {
        let _ = self.tx.send(Ok(Inbound::Text(text.to_string())));
    }

    /// Send a close frame to the server.
    pub fn close(&self) {
        let _ = self.tx.send(Ok(Inbound::Close));
    }

    /// Make the server's next read fail with an I/O error.
    pub fn fail_read(&self, reason: &str) {
        let _ = self.tx.send(Err(TransportError::Io(reason.to_string())));
    }

    /// Make every later server write fail, leaving reads untouched.
    pub fn break_writes(&self) {
        self.faults.broken.store(true, Ordering::Release);
    }

    /// Make every later server write hang until its deadline.
    pub fn stall_writes(&self) {
        self.faults.stalled.store(true, Ordering::Release);
    }

    /// Wait for the next frame from the server. `None` once the server side
    /// is released.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }

    /// Next already-delivered frame, if it is a text frame.
    pub fn try_recv_text(&mut self) -> Option<String> {
        match self.try_recv()? {
            Outbound::Text(text) => Some(text),
            Outbound::Close => None,
        }
    }
}
