use std::sync::Arc;

use dashmap::DashMap;

use crate::handle::{ConnId, ConnectionHandle, MemberInfo};

/// Connections registered under one key.
///
/// Backed by a sharded map, so insert/remove never wait on a broadcast that is
/// iterating a snapshot of the same group.
#[derive(Debug, Default)]
pub struct Group {
    members: DashMap<ConnId, Arc<ConnectionHandle>>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, handle: Arc<ConnectionHandle>) {
        self.members.insert(handle.id().clone(), handle);
    }

    /// Remove `handle` if it is still the member stored under its id.
    ///
    /// Returns false when another caller got there first.
    pub(crate) fn remove(&self, handle: &Arc<ConnectionHandle>) -> bool {
        self.members
            .remove_if(handle.id(), |_, current| Arc::ptr_eq(current, handle))
            .is_some()
    }

    /// Point-in-time copy of the membership, in join order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        let mut handles: Vec<Arc<ConnectionHandle>> =
            self.members.iter().map(|entry| Arc::clone(entry.value())).collect();
        handles.sort_by_key(|h| h.seq());
        handles
    }

    pub fn contains(&self, id: &ConnId) -> bool {
        self.members.contains_key(id)
    }

    pub fn members(&self) -> Vec<MemberInfo> {
        self.snapshot().iter().map(|h| h.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory;
    use crate::transport::Duplex;
    use tokio_util::sync::CancellationToken;

    fn handle(seq: u64) -> Arc<ConnectionHandle> {
        let (duplex, _peer) = memory::pair();
        let (sink, _source) = duplex.split();
        Arc::new(ConnectionHandle::new(seq, Box::new(sink), CancellationToken::new()))
    }

    #[test]
    fn insert_and_remove() {
        let group = Group::new();
        let h = handle(0);
        group.insert(Arc::clone(&h));
        assert_eq!(group.len(), 1);
        assert!(group.contains(h.id()));

        assert!(group.remove(&h));
        assert!(group.is_empty());
    }

    #[test]
    fn second_remove_is_a_no_op() {
        let group = Group::new();
        let h = handle(0);
        group.insert(Arc::clone(&h));
        assert!(group.remove(&h));
        assert!(!group.remove(&h));
    }

    #[test]
    fn snapshot_is_in_join_order() {
        let group = Group::new();
        let handles: Vec<_> = [5, 1, 3].into_iter().map(handle).collect();
        for h in &handles {
            group.insert(Arc::clone(h));
        }
        let seqs: Vec<u64> = group.snapshot().iter().map(|h| h.seq()).collect();
        assert_eq!(seqs, vec![1, 3, 5]);
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let group = Group::new();
        let first = handle(0);
        group.insert(Arc::clone(&first));
        let snapshot = group.snapshot();

        group.insert(handle(1));
        group.remove(&first);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), first.id());
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn members_lists_ids() {
        let group = Group::new();
        let h = handle(0);
        group.insert(Arc::clone(&h));
        let members = group.members();
        assert_eq!(members.len(), 1);
        assert_eq!(&members[0].id, h.id());
    }
}
