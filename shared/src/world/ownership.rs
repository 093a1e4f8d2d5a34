use std::collections::HashMap;

use crate::types::{NetworkId, PeerId};

/// Who may write a replicated variable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WritePermission {
    ServerOnly,
    /// Only the current owner of the object
    OwnerOnly,
    Everyone,
}

impl WritePermission {
    pub fn allows(&self, owner: PeerId, writer: PeerId) -> bool {
        match self {
            WritePermission::ServerOnly => writer.is_server(),
            WritePermission::OwnerOnly => writer == owner,
            WritePermission::Everyone => true,
        }
    }
}

/// Per-variable replication settings, declared once per prefab
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariableSettings {
    pub permission: WritePermission,
    /// Max deltas per second, zero sends on every tick the value changed
    pub send_rate_hz: u32,
    pub reliable: bool,
}

impl Default for VariableSettings {
    fn default() -> Self {
        Self {
            permission: WritePermission::ServerOnly,
            send_rate_hz: 0,
            reliable: true,
        }
    }
}

impl VariableSettings {
    pub fn server_only() -> Self {
        Self::default()
    }

    pub fn owner_only() -> Self {
        Self {
            permission: WritePermission::OwnerOnly,
            ..Self::default()
        }
    }

    pub fn everyone() -> Self {
        Self {
            permission: WritePermission::Everyone,
            ..Self::default()
        }
    }

    pub fn send_rate(mut self, hz: u32) -> Self {
        self.send_rate_hz = hz;
        self
    }

    pub fn unreliable(mut self) -> Self {
        self.reliable = false;
        self
    }
}

/// Maps every live object to its owner. Only the spawn manager writes to it.
#[derive(Default)]
pub struct OwnershipTable {
    owners: HashMap<NetworkId, PeerId>,
}

impl OwnershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self, network_id: &NetworkId) -> Option<PeerId> {
        self.owners.get(network_id).copied()
    }

    /// Whether `writer` may write a variable with `permission` on the object.
    /// A Client whose id isn't known yet may never write.
    pub fn can_write(
        &self,
        network_id: &NetworkId,
        permission: WritePermission,
        writer: Option<PeerId>,
    ) -> bool {
        let (Some(owner), Some(writer)) = (self.owner(network_id), writer) else {
            return false;
        };
        permission.allows(owner, writer)
    }

    /// Objects currently owned by `peer`, in id order
    pub fn owned_by(&self, peer: &PeerId) -> Vec<NetworkId> {
        let mut output: Vec<NetworkId> = self
            .owners
            .iter()
            .filter(|(_, owner)| *owner == peer)
            .map(|(network_id, _)| *network_id)
            .collect();
        output.sort_unstable();
        output
    }

    pub(crate) fn set_owner(&mut self, network_id: NetworkId, owner: PeerId) -> Option<PeerId> {
        self.owners.insert(network_id, owner)
    }

    pub(crate) fn remove(&mut self, network_id: &NetworkId) -> Option<PeerId> {
        self.owners.remove(network_id)
    }
}
