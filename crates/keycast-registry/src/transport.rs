//! Transport seam between the registry and a concrete duplex socket.
//!
//! A negotiated connection is handed to the registry as a [`Duplex`], which is
//! split once into a write half ([`FrameSink`], shared with broadcasters) and a
//! read half ([`FrameSource`], owned by the connection's lifecycle loop).

use async_trait::async_trait;

use crate::error::TransportError;

/// One inbound frame as seen by the lifecycle loop.
///
/// Payloads are read and discarded; only [`Inbound::Close`] changes state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    /// Ping/pong. Transports answer pings themselves.
    Control,
    /// The peer started the close handshake.
    Close,
}

/// Write half of an accepted connection.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Send `text` as one complete, unfragmented text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Start (or complete) the close handshake and flush.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of an accepted connection.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Wait for the next frame. `None` means the stream ended without a close
    /// frame.
    async fn next_frame(&mut self) -> Option<Result<Inbound, TransportError>>;
}

/// A negotiated duplex connection, ready to be registered.
pub trait Duplex: Send + 'static {
    type Sink: FrameSink;
    type Source: FrameSource;

    fn split(self) -> (Self::Sink, Self::Source);
}
