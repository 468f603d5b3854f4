//! Per-connection control loop.
//!
//! ```text
//! Handshaking ──ok──► Open ──close frame / EOF / error / idle / released──► Closing ──► Closed
//!      │
//!      └─err──► returned to the caller of `register`, registry untouched
//! ```
//!
//! `Handshaking` and the final removal live in [`Registry::register`](crate::Registry::register);
//! this module drives `Open` and `Closing`.

use std::fmt;
use std::time::Duration;

use tracing::{trace, warn};

use crate::handle::ConnectionHandle;
use crate::transport::{FrameSource, Inbound};

/// Why a connection's read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The peer sent a close frame.
    PeerClosed,
    /// The read stream ended without a close frame.
    StreamEnded,
    /// Reading failed; treated exactly like a peer close.
    TransportError,
    /// No frame arrived within the idle timeout.
    IdleTimeout,
    /// A broadcaster released the handle after a failed send.
    Released,
    /// The registry is shutting down.
    Shutdown,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Termination::PeerClosed => "peer_closed",
            Termination::StreamEnded => "stream_ended",
            Termination::TransportError => "transport_error",
            Termination::IdleTimeout => "idle_timeout",
            Termination::Released => "released",
            Termination::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Outcome of waiting for one frame.
enum Read {
    Frame(Inbound),
    Ended,
    Failed,
    Idle,
}

/// Run the `Open` state: read frames until something ends the connection.
pub(crate) async fn read_until_closed<S: FrameSource>(
    handle: &ConnectionHandle,
    source: &mut S,
    idle_timeout: Option<Duration>,
    shutting_down: impl Fn() -> bool,
) -> Termination {
    loop {
        let read = tokio::select! {
            _ = handle.cancelled() => {
                return if shutting_down() {
                    Termination::Shutdown
                } else {
                    Termination::Released
                };
            }
            read = next_frame(handle, source, idle_timeout) => read,
        };

        match read {
            Read::Frame(Inbound::Close) => return Termination::PeerClosed,
            Read::Frame(frame) => {
                // inbound payloads carry no meaning here
                trace!(conn_id = %handle.id(), ?frame, "discarding inbound frame");
            }
            Read::Ended => return Termination::StreamEnded,
            Read::Failed => return Termination::TransportError,
            Read::Idle => return Termination::IdleTimeout,
        }
    }
}

async fn next_frame<S: FrameSource>(
    handle: &ConnectionHandle,
    source: &mut S,
    idle_timeout: Option<Duration>,
) -> Read {
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, source.next_frame()).await {
            Ok(next) => next,
            Err(_) => return Read::Idle,
        },
        None => source.next_frame().await,
    };

    match next {
        Some(Ok(frame)) => Read::Frame(frame),
        Some(Err(e)) => {
            warn!(conn_id = %handle.id(), error = %e, "WS read failed");
            Read::Failed
        }
        None => Read::Ended,
    }
}

/// Run the `Closing` state: Open → Closing, then a best-effort close
/// handshake unless a broadcaster already released the write half.
pub(crate) async fn close(handle: &ConnectionHandle, deadline: Duration) {
    if handle.begin_closing() {
        handle.close(deadline).await;
    }
}
