use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::{
    rpc::RpcMessage,
    types::{NetworkId, PeerId, Tick, VariableIndex},
    wire::ReplicatedValue,
};

/// An inbound message whose target object wasn't live when it arrived
#[derive(Clone, Debug, PartialEq)]
pub enum BufferedMessage {
    VariableDelta {
        sender: PeerId,
        tick: Tick,
        variable_index: VariableIndex,
        value: ReplicatedValue,
    },
    Rpc(RpcMessage),
}

struct BufferEntry {
    sequence: u64,
    arrived_at: Instant,
    message: BufferedMessage,
}

/// Messages released for a target that resolved
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolved {
    /// Still within the timeout, oldest first
    pub messages: Vec<BufferedMessage>,
    /// Entries that had already timed out and were discarded
    pub expired: usize,
}

/// Why a message was not buffered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferRefusal {
    Disabled,
    Full,
}

/// Holds messages addressed to objects which haven't spawned yet. Entries
/// replay in arrival order once their target resolves, and expire after
/// `timeout`.
pub struct MessageBuffer {
    enabled: bool,
    timeout: Duration,
    capacity: usize,
    entries: HashMap<NetworkId, VecDeque<BufferEntry>>,
    ttl_queue: VecDeque<(Instant, NetworkId, u64)>,
    next_sequence: u64,
    len: usize,
}

impl MessageBuffer {
    pub fn new(enabled: bool, timeout: Duration, capacity: usize) -> Self {
        Self {
            enabled,
            timeout,
            capacity,
            entries: HashMap::new(),
            ttl_queue: VecDeque::new(),
            next_sequence: 0,
            len: 0,
        }
    }

    pub fn push(
        &mut self,
        network_id: NetworkId,
        message: BufferedMessage,
        now: Instant,
    ) -> Result<(), BufferRefusal> {
        if !self.enabled {
            return Err(BufferRefusal::Disabled);
        }
        if self.len >= self.capacity {
            warn!(
                "early-arrival buffer is full ({} messages), dropping message for object {}",
                self.capacity, network_id
            );
            return Err(BufferRefusal::Full);
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        self.entries
            .entry(network_id)
            .or_default()
            .push_back(BufferEntry {
                sequence,
                arrived_at: now,
                message,
            });
        self.ttl_queue.push_back((now, network_id, sequence));
        self.len += 1;
        debug!("buffered message for unresolved object {}", network_id);
        Ok(())
    }

    /// Removes every message for `network_id`. Unexpired ones are returned
    /// oldest first, timed out ones are only counted.
    pub fn resolve(&mut self, network_id: &NetworkId, now: Instant) -> Resolved {
        let Some(entries) = self.entries.remove(network_id) else {
            return Resolved::default();
        };
        self.len -= entries.len();

        let mut resolved = Resolved::default();
        for entry in entries {
            if now.saturating_duration_since(entry.arrived_at) < self.timeout {
                resolved.messages.push(entry.message);
            } else {
                resolved.expired += 1;
            }
        }
        resolved
    }

    /// Drops every message for `network_id` without replaying it
    pub fn purge(&mut self, network_id: &NetworkId) -> usize {
        let Some(entries) = self.entries.remove(network_id) else {
            return 0;
        };
        self.len -= entries.len();
        entries.len()
    }

    /// Drops messages older than the timeout, returning the target of each
    pub fn sweep(&mut self, now: Instant) -> Vec<NetworkId> {
        let mut expired = Vec::new();

        while let Some((arrived_at, network_id, sequence)) = self.ttl_queue.front().copied() {
            if now.saturating_duration_since(arrived_at) < self.timeout {
                break;
            }
            self.ttl_queue.pop_front();

            // entries per object are in sequence order, so an expired entry
            // which hasn't been resolved or purged is always at the front
            let Some(entries) = self.entries.get_mut(&network_id) else {
                continue;
            };
            if entries.front().map(|entry| entry.sequence) != Some(sequence) {
                continue;
            }
            entries.pop_front();
            if entries.is_empty() {
                self.entries.remove(&network_id);
            }
            self.len -= 1;
            expired.push(network_id);
        }

        expired
    }

    pub fn is_waiting_on(&self, network_id: &NetworkId) -> bool {
        self.entries.contains_key(network_id)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
