//! Per-connection record shared by a connection's lifecycle and broadcasters.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;
use uuid::Uuid;

use crate::error::TransportError;
use crate::transport::FrameSink;

// ---------------------------------------------------------------------------
// ConnId
// ---------------------------------------------------------------------------

/// Opaque identifier for one registered connection (UUIDv4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnId(String);

impl ConnId {
    /// Generate a fresh random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ConnState
// ---------------------------------------------------------------------------

/// Observable connection state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    Open = 0,
    Closing = 1,
    /// Terminal. The write half has been (or is being) released.
    Closed = 2,
}

impl ConnState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnState::Open,
            1 => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionHandle
// ---------------------------------------------------------------------------

/// Snapshot of a group member, as returned by membership queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub id: ConnId,
    pub connected_at: DateTime<Utc>,
}

/// The registry's record of one accepted transport.
///
/// Owned jointly (via `Arc`) by the connection's lifecycle task and its group.
/// Either side may release it; [`release`](Self::release) is idempotent.
pub struct ConnectionHandle {
    id: ConnId,
    seq: u64,
    connected_at: DateTime<Utc>,
    state: AtomicU8,
    /// `None` once released.
    sink: Mutex<Option<Box<dyn FrameSink>>>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub(crate) fn new(seq: u64, sink: Box<dyn FrameSink>, cancel: CancellationToken) -> Self {
        Self {
            id: ConnId::new(),
            seq,
            connected_at: Utc::now(),
            state: AtomicU8::new(ConnState::Open as u8),
            sink: Mutex::new(Some(sink)),
            cancel,
        }
    }

    pub fn id(&self) -> &ConnId {
        &self.id
    }

    /// Registry-wide join order; snapshots are sorted by it.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn info(&self) -> MemberInfo {
        MemberInfo {
            id: self.id.clone(),
            connected_at: self.connected_at,
        }
    }

    /// Open → Closing. Returns false if the handle had already left Open.
    pub(crate) fn begin_closing(&self) -> bool {
        self.state
            .compare_exchange(
                ConnState::Open as u8,
                ConnState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Resolves once the handle is released or the registry shuts down.
    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Send one text frame under `deadline`.
    ///
    /// Fails with [`TransportError::Closed`] if the write half is gone.
    pub(crate) async fn send_text(
        &self,
        text: &str,
        deadline: Duration,
    ) -> Result<(), TransportError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::Closed)?;
        match tokio::time::timeout(deadline, sink.send_text(text)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                ms: deadline.as_millis() as u64,
            }),
        }
    }

    /// Best-effort outbound close handshake.
    ///
    /// Only transport close failures and the deadline are absorbed here; they
    /// are expected when the peer has already gone away.
    pub(crate) async fn close(&self, deadline: Duration) {
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return;
        };
        match tokio::time::timeout(deadline, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(conn_id = %self.id, error = %e, "close handshake failed"),
            Err(_) => debug!(conn_id = %self.id, "close handshake timed out"),
        }
    }

    /// Mark the handle Closed, wake its lifecycle and drop the write half.
    ///
    /// Safe to call from the lifecycle and any number of broadcasters; only
    /// the first caller gets `true`.
    pub(crate) async fn release(&self) -> bool {
        self.state.store(ConnState::Closed as u8, Ordering::Release);
        self.cancel.cancel();
        self.sink.lock().await.take().is_some()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("seq", &self.seq)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory;
    use crate::transport::Duplex;

    fn handle() -> (ConnectionHandle, memory::MemoryPeer) {
        let (duplex, peer) = memory::pair();
        let (sink, _source) = duplex.split();
        (
            ConnectionHandle::new(0, Box::new(sink), CancellationToken::new()),
            peer,
        )
    }

    #[test]
    fn conn_ids_are_unique() {
        assert_ne!(ConnId::new(), ConnId::new());
    }

    #[tokio::test]
    async fn member_info_serializes_id_as_string() {
        let (h, _peer) = handle();
        let json = serde_json::to_value(h.info()).unwrap();
        assert_eq!(json["id"], h.id().as_str());
        assert!(json["connected_at"].is_string());
    }

    #[tokio::test]
    async fn new_handle_is_open() {
        let (h, _peer) = handle();
        assert_eq!(h.state(), ConnState::Open);
        assert!(!h.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn begin_closing_only_from_open() {
        let (h, _peer) = handle();
        assert!(h.begin_closing());
        assert_eq!(h.state(), ConnState::Closing);
        assert!(!h.begin_closing());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let (h, _peer) = handle();
        assert!(h.release().await);
        assert!(!h.release().await);
        assert_eq!(h.state(), ConnState::Closed);
        assert!(h.cancel.is_cancelled());
        assert!(!h.begin_closing());
    }

    #[tokio::test]
    async fn send_after_release_reports_closed() {
        let (h, _peer) = handle();
        h.release().await;
        let err = h.send_text("late", Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, TransportError::Closed);
    }

    #[tokio::test]
    async fn send_reaches_peer() {
        let (h, mut peer) = handle();
        h.send_text("hi", Duration::from_secs(1)).await.unwrap();
        assert_eq!(peer.try_recv_text().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn stalled_send_times_out() {
        let (h, peer) = handle();
        peer.stall_writes();
        let err = h.send_text("slow", Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout { ms: 20 });
    }
}
