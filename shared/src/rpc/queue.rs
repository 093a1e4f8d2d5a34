use std::collections::{BTreeMap, VecDeque};

use crate::{rpc::RpcMessage, types::PeerId};

/// Outgoing calls, queued per destination peer until the next flush
#[derive(Default)]
pub struct RpcQueue {
    outgoing: BTreeMap<PeerId, VecDeque<RpcMessage>>,
}

impl RpcQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, peer: PeerId, message: RpcMessage) {
        self.outgoing.entry(peer).or_default().push_back(message);
    }

    /// Peers with queued calls, in a stable order
    pub fn peers(&self) -> Vec<PeerId> {
        self.outgoing.keys().copied().collect()
    }

    /// Removes every call queued for `peer`, in the order they were issued
    pub fn take(&mut self, peer: &PeerId) -> Vec<RpcMessage> {
        self.outgoing
            .remove(peer)
            .map(|queue| queue.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn remove_peer(&mut self, peer: &PeerId) {
        self.outgoing.remove(peer);
    }

    pub fn queued_for(&self, peer: &PeerId) -> usize {
        self.outgoing.get(peer).map(VecDeque::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
    }
}
