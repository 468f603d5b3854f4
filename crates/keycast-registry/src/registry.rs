//! Keyed connection registry.
//!
//! ```text
//!                 Arc<Registry<K>>
//!          ┌────────────────────────────┐
//!          │ groups: DashMap<K, Group>  │
//!          │   Group: DashMap<ConnId,   │
//!          │     Arc<ConnectionHandle>> │
//!          └──────────────┬─────────────┘
//!                         │
//!        ┌────────────────┼─────────────────┐
//!        ▼                ▼                 ▼
//!  register(k, ws)  register(k, ws)   broadcast(k, msg)
//!  read loop        read loop         snapshot → send each
//! ```

use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use keycast_core::config::ConnectionsConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcast;
use crate::error::{RegistryError, Result, TransportError};
use crate::group::Group;
use crate::handle::{ConnectionHandle, MemberInfo};
use crate::lifecycle;
use crate::transport::Duplex;

/// Anything usable as a group key. Fixed per registry by its type parameter.
pub trait GroupKey: Eq + Hash + Clone + Debug + Display + Send + Sync + 'static {}

impl<T> GroupKey for T where T: Eq + Hash + Clone + Debug + Display + Send + Sync + 'static {}

/// Maps keys to groups of live connections and fans messages out to them.
///
/// Construct once at startup, share behind an `Arc`, and call
/// [`shutdown`](Self::shutdown) when the host stops.
pub struct Registry<K: GroupKey> {
    groups: DashMap<K, Arc<Group>>,
    config: ConnectionsConfig,
    next_seq: AtomicU64,
    shutdown: CancellationToken,
}

impl<K: GroupKey> Registry<K> {
    /// Create a registry with default connection settings.
    pub fn new() -> Self {
        Self::with_config(ConnectionsConfig::default())
    }

    pub fn with_config(config: ConnectionsConfig) -> Self {
        Self {
            groups: DashMap::new(),
            config,
            next_seq: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ConnectionsConfig {
        &self.config
    }

    /// Register a connection under `key` and serve it until it terminates.
    ///
    /// `handshake` resolves to the negotiated transport. If it fails, or the
    /// registry is shutting down, the error is returned and nothing is
    /// registered. Otherwise this returns `Ok(())` once the connection has
    /// closed and been removed from its group.
    pub async fn register<D, F>(&self, key: K, handshake: F) -> Result<()>
    where
        D: Duplex,
        F: Future<Output = std::result::Result<D, TransportError>>,
    {
        if self.shutdown.is_cancelled() {
            return Err(RegistryError::ShuttingDown);
        }
        let duplex = handshake.await.map_err(RegistryError::Handshake)?;
        if self.shutdown.is_cancelled() {
            return Err(RegistryError::ShuttingDown);
        }

        let (sink, mut source) = duplex.split();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(ConnectionHandle::new(
            seq,
            Box::new(sink),
            self.shutdown.child_token(),
        ));
        let group = self.join(&key, &handle);
        info!(key = %key, conn_id = %handle.id(), members = group.len(), "WS connection registered");

        let reason = lifecycle::read_until_closed(
            &handle,
            &mut source,
            self.config.idle_timeout(),
            || self.shutdown.is_cancelled(),
        )
        .await;
        lifecycle::close(&handle, self.config.send_timeout()).await;

        group.remove(&handle);
        handle.release().await;
        drop(source);
        self.evict_if_empty(&key);

        info!(key = %key, conn_id = %handle.id(), %reason, "WS connection closed");
        Ok(())
    }

    /// Send `message` as one text frame to every connection under `key`.
    ///
    /// An unknown key is a no-op. Failed recipients are dropped from the
    /// group; nothing is reported back.
    pub async fn broadcast(&self, key: &K, message: &str) {
        // clone out of the map so no shard lock is held across the sends
        let Some(group) = self.groups.get(key).map(|g| Arc::clone(g.value())) else {
            debug!(key = %key, "broadcast to unknown key");
            return;
        };

        let report = broadcast::fan_out(&group, message, self.config.send_timeout()).await;
        if report.removed > 0 {
            self.evict_if_empty(key);
        }
    }

    /// Current members under `key`, in join order.
    pub fn members(&self, key: &K) -> Vec<MemberInfo> {
        self.group(key).map(|g| g.members()).unwrap_or_default()
    }

    pub fn member_count(&self, key: &K) -> usize {
        self.group(key).map(|g| g.len()).unwrap_or(0)
    }

    /// Number of keys with a group (empty groups included when eviction is off).
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Total connections across all groups.
    pub fn connection_count(&self) -> usize {
        self.groups.iter().map(|g| g.value().len()).sum()
    }

    /// Close every connection and refuse new registrations.
    ///
    /// Each lifecycle sends a best-effort close frame and removes itself; the
    /// `register` futures then return.
    pub fn shutdown(&self) {
        info!(connections = self.connection_count(), "registry shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn group(&self, key: &K) -> Option<Arc<Group>> {
        self.groups.get(key).map(|g| Arc::clone(g.value()))
    }

    /// Insert `handle` into the group for `key`, creating it if needed.
    ///
    /// The insert happens while the map entry is held, so a concurrent
    /// `evict_if_empty` can never drop the group between lookup and insert.
    fn join(&self, key: &K, handle: &Arc<ConnectionHandle>) -> Arc<Group> {
        let entry = self.groups.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "creating group");
            Arc::new(Group::new())
        });
        entry.value().insert(Arc::clone(handle));
        Arc::clone(entry.value())
    }

    fn evict_if_empty(&self, key: &K) {
        if !self.config.evict_empty_groups {
            return;
        }
        if self.groups.remove_if(key, |_, g| g.is_empty()).is_some() {
            debug!(key = %key, "evicted empty group");
        }
    }
}

impl<K: GroupKey> Default for Registry<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{self, MemoryDuplex, MemoryPeer, Outbound};
    use std::future::ready;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    fn spawn_conn(
        registry: &Arc<Registry<i64>>,
        key: i64,
    ) -> (JoinHandle<Result<()>>, MemoryPeer) {
        let (duplex, peer) = memory::pair();
        let registry = Arc::clone(registry);
        let task = tokio::spawn(async move { registry.register(key, ready(Ok(duplex))).await });
        (task, peer)
    }

    async fn wait_for_members(registry: &Registry<i64>, key: i64, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.member_count(&key) != n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("membership did not converge");
    }

    #[tokio::test]
    async fn broadcast_to_unknown_key_is_silent() {
        let registry: Registry<i64> = Registry::new();
        registry.broadcast(&42, "nobody").await;
        assert_eq!(registry.group_count(), 0);
    }

    #[tokio::test]
    async fn handshake_failure_leaves_registry_untouched() {
        let registry: Registry<i64> = Registry::new();
        let failed = ready(Err::<MemoryDuplex, _>(TransportError::Io("bad upgrade".into())));
        let err = registry.register(1, failed).await.unwrap_err();
        assert!(matches!(err, RegistryError::Handshake(TransportError::Io(_))));
        assert_eq!(registry.group_count(), 0);
    }

    #[tokio::test]
    async fn register_returns_after_peer_close() {
        let registry = Arc::new(Registry::new());
        let (task, peer) = spawn_conn(&registry, 7);
        wait_for_members(&registry, 7, 1).await;

        peer.close();
        task.await.unwrap().unwrap();
        assert_eq!(registry.member_count(&7), 0);
    }

    #[tokio::test]
    async fn peer_close_gets_close_reply() {
        let registry = Arc::new(Registry::new());
        let (task, mut peer) = spawn_conn(&registry, 7);
        wait_for_members(&registry, 7, 1).await;

        peer.close();
        task.await.unwrap().unwrap();
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn empty_group_is_evicted_by_default() {
        let registry = Arc::new(Registry::new());
        let (task, peer) = spawn_conn(&registry, 3);
        wait_for_members(&registry, 3, 1).await;
        assert_eq!(registry.group_count(), 1);

        peer.close();
        task.await.unwrap().unwrap();
        assert_eq!(registry.group_count(), 0);
    }

    #[tokio::test]
    async fn empty_group_is_retained_when_eviction_is_off() {
        let config = ConnectionsConfig {
            evict_empty_groups: false,
            ..ConnectionsConfig::default()
        };
        let registry = Arc::new(Registry::with_config(config));
        let (task, peer) = spawn_conn(&registry, 3);
        wait_for_members(&registry, 3, 1).await;

        peer.close();
        task.await.unwrap().unwrap();
        assert_eq!(registry.group_count(), 1);
        assert_eq!(registry.member_count(&3), 0);

        // a later registration reuses the retained group
        let (_task, _peer) = spawn_conn(&registry, 3);
        wait_for_members(&registry, 3, 1).await;
        assert_eq!(registry.group_count(), 1);
    }

    #[tokio::test]
    async fn failed_send_evicts_group_when_last_member_leaves() {
        let registry = Arc::new(Registry::new());
        let (task, peer) = spawn_conn(&registry, 9);
        wait_for_members(&registry, 9, 1).await;

        peer.break_writes();
        registry.broadcast(&9, "lost").await;

        assert_eq!(registry.member_count(&9), 0);
        // the lifecycle notices the release and finishes on its own
        task.await.unwrap().unwrap();
        assert_eq!(registry.group_count(), 0);
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let registry = Arc::new(Registry::new());
        let (_t1, mut one) = spawn_conn(&registry, 1);
        let (_t2, mut two) = spawn_conn(&registry, 2);
        wait_for_members(&registry, 1, 1).await;
        wait_for_members(&registry, 2, 1).await;

        registry.broadcast(&1, "for one").await;

        assert_eq!(one.try_recv_text().as_deref(), Some("for one"));
        assert_eq!(two.try_recv(), None);
    }

    #[tokio::test]
    async fn members_are_listed_in_join_order() {
        let registry = Arc::new(Registry::new());
        let (_t1, _a) = spawn_conn(&registry, 5);
        wait_for_members(&registry, 5, 1).await;
        let (_t2, _b) = spawn_conn(&registry, 5);
        wait_for_members(&registry, 5, 2).await;

        let members = registry.members(&5);
        assert_eq!(members.len(), 2);
        assert!(members[0].connected_at <= members[1].connected_at);
        assert_eq!(registry.connection_count(), 2);
    }

    #[tokio::test]
    async fn shutdown_closes_connections_and_refuses_new_ones() {
        let registry = Arc::new(Registry::new());
        let (task, mut peer) = spawn_conn(&registry, 1);
        wait_for_members(&registry, 1, 1).await;

        registry.shutdown();
        task.await.unwrap().unwrap();
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        assert_eq!(registry.connection_count(), 0);

        let (duplex, _peer) = memory::pair();
        let err = registry.register(1, ready(Ok(duplex))).await.unwrap_err();
        assert!(matches!(err, RegistryError::ShuttingDown));
    }

    #[tokio::test]
    async fn idle_connection_is_closed() {
        let config = ConnectionsConfig {
            idle_timeout_secs: Some(1),
            ..ConnectionsConfig::default()
        };
        let registry = Arc::new(Registry::with_config(config));
        let (task, _peer) = spawn_conn(&registry, 1);
        wait_for_members(&registry, 1, 1).await;

        tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("idle connection was not closed")
            .unwrap()
            .unwrap();
        assert_eq!(registry.member_count(&1), 0);
    }
}
