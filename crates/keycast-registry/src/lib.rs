//! keycast-registry: keyed fan-out over long-lived duplex connections.
//!
//! Connections are registered under a key and kept in that key's group for
//! as long as they stay open. A broadcast sends one text frame to every
//! connection in the group; recipients that fail are dropped without
//! affecting the others.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::future::ready;
//! use std::sync::Arc;
//! use keycast_registry::{memory, Registry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry: Arc<Registry<i64>> = Arc::new(Registry::new());
//!
//!     let (duplex, mut peer) = memory::pair();
//!     let r = Arc::clone(&registry);
//!     tokio::spawn(async move { r.register(5, ready(Ok(duplex))).await });
//!
//!     registry.broadcast(&5, "hello").await;
//!     println!("{:?}", peer.recv().await);
//! }
//! ```

mod broadcast;
pub mod error;
pub mod group;
pub mod handle;
pub mod lifecycle;
pub mod memory;
pub mod registry;
pub mod transport;

pub use error::{RegistryError, Result, TransportError};
pub use group::Group;
pub use handle::{ConnId, ConnState, ConnectionHandle, MemberInfo};
pub use lifecycle::Termination;
pub use registry::{GroupKey, Registry};
pub use transport::{Duplex, FrameSink, FrameSource, Inbound};
