//! Error types for the keycast-registry crate.

use thiserror::Error;

/// Failures raised by a transport while reading, writing or closing.
///
/// These never leave the connection they occurred on: the registry logs them
/// and turns them into a removal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer or the registry already closed this transport.
    #[error("Transport closed")]
    Closed,

    /// Read, write or flush failure reported by the underlying socket.
    #[error("Transport I/O error: {0}")]
    Io(String),

    /// A send or close did not complete within the write deadline.
    #[error("Transport operation timed out after {ms}ms")]
    Timeout { ms: u64 },
}

/// Errors surfaced to the caller of [`Registry::register`](crate::Registry::register).
///
/// Both variants are raised before the registry is mutated.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The upgrade handshake failed.
    #[error("Handshake failed: {0}")]
    Handshake(#[source] TransportError),

    /// The registry has been shut down and accepts no new connections.
    #[error("Registry is shutting down")]
    ShuttingDown,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RegistryError>;
