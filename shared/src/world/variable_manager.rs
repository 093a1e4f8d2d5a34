use std::time::Instant;

use log::{trace, warn};

use crate::{
    config::ReplicationConfig,
    observer::ChangeObserver,
    tick_scheduler::SendBudget,
    types::{HostType, NetworkId, PeerId, Tick, VariableIndex},
    wire::ReplicatedValue,
    world::{
        error::VariableError,
        ownership::WritePermission,
        spawn_manager::SpawnManager,
    },
};

/// A delta produced by the owner-side scan
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingDelta {
    pub network_id: NetworkId,
    pub variable_index: VariableIndex,
    pub value: ReplicatedValue,
    pub reliable: bool,
    pub recipients: Vec<PeerId>,
}

/// Result of applying a received delta
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied,
    /// Value was already equal, nothing changed
    Unchanged,
    /// Echo or stale update for a variable this peer may write itself
    Ignored,
}

/// Detects and applies per-variable changes. Holds no objects: they live in
/// the [`SpawnManager`] and are passed in.
pub struct VariableManager {
    host_type: HostType,
    enabled: bool,
    length_cap: Option<usize>,
}

impl VariableManager {
    pub fn new(host_type: HostType, config: &ReplicationConfig) -> Self {
        Self {
            host_type,
            enabled: config.enable_variable_replication,
            length_cap: config.length_cap(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check_length(&self, value: &ReplicatedValue) -> Result<(), VariableError> {
        if let (Some(cap), Some(length)) = (self.length_cap, value.payload_length()) {
            if length > cap {
                return Err(VariableError::LengthExceeded { length, cap });
            }
        }
        Ok(())
    }

    /// Writes a variable locally. Fails without any side effect unless
    /// `local_peer` holds write permission. Returns whether the value changed.
    pub fn write(
        &self,
        spawns: &mut SpawnManager,
        local_peer: Option<PeerId>,
        network_id: NetworkId,
        index: VariableIndex,
        value: ReplicatedValue,
        tick: Tick,
    ) -> Result<bool, VariableError> {
        self.check_length(&value)?;
        let (objects, ownership) = spawns.split_mut();
        let object = objects
            .get_mut(&network_id)
            .ok_or(VariableError::ObjectNotFound { network_id })?;
        let variable = object
            .variable_mut(index)
            .ok_or(VariableError::IndexOutOfRange { network_id, index })?;

        if variable.kind() != value.kind() {
            return Err(VariableError::TypeMismatch {
                network_id,
                index,
                expected: variable.kind(),
                actual: value.kind(),
            });
        }
        if !ownership.can_write(&network_id, variable.permission(), local_peer) {
            warn!(
                "{:?} tried to write variable {} of object {} without permission",
                local_peer, index, network_id
            );
            return Err(VariableError::PermissionViolation {
                network_id,
                index,
                peer: local_peer,
            });
        }

        Ok(variable.write_local(value, tick))
    }

    pub fn observe(
        &self,
        spawns: &mut SpawnManager,
        network_id: NetworkId,
        index: VariableIndex,
        observer: ChangeObserver,
    ) -> Result<(), VariableError> {
        let object = spawns
            .object_mut(&network_id)
            .ok_or(VariableError::ObjectNotFound { network_id })?;
        let variable = object
            .variable_mut(index)
            .ok_or(VariableError::IndexOutOfRange { network_id, index })?;
        variable.add_observer(observer);
        Ok(())
    }

    /// The owner-side scan. Emits one delta per dirty variable whose send
    /// rate allows it, until `budget` runs out; the rest stay dirty for the
    /// next scan.
    pub fn collect_deltas(
        &self,
        spawns: &mut SpawnManager,
        local_peer: Option<PeerId>,
        now: Instant,
        budget: &mut SendBudget,
    ) -> Vec<OutgoingDelta> {
        let mut output = Vec::new();
        if !self.enabled || local_peer.is_none() {
            return output;
        }

        let (objects, ownership) = spawns.split_mut();
        for (network_id, object) in objects.iter_mut() {
            let observers: Vec<PeerId> = object.observers().iter().copied().collect();
            if self.host_type == HostType::Server && observers.is_empty() {
                // nobody to send to yet, the spawn frame will carry the value
                for variable in object.variables_mut() {
                    if variable.is_dirty() {
                        variable.mark_sent(now);
                    }
                }
                continue;
            }

            for (index, variable) in object.variables_mut().iter_mut().enumerate() {
                if !variable.is_dirty() || !variable.rate_allows(now) {
                    continue;
                }

                let may_write = ownership.can_write(network_id, variable.permission(), local_peer);
                let recipients = match self.host_type {
                    HostType::Server => {
                        let origin = variable.origin();
                        if !may_write && origin.is_none() {
                            continue;
                        }
                        observers
                            .iter()
                            .filter(|peer| Some(**peer) != origin)
                            .copied()
                            .collect()
                    }
                    HostType::Client => {
                        if !may_write {
                            continue;
                        }
                        vec![PeerId::SERVER]
                    }
                };

                if recipients.is_empty() {
                    variable.mark_sent(now);
                    continue;
                }
                if !budget.try_take() {
                    trace!("send budget exhausted, deferring remaining deltas");
                    return output;
                }

                output.push(OutgoingDelta {
                    network_id: *network_id,
                    variable_index: index as VariableIndex,
                    value: variable.value().clone(),
                    reliable: variable.settings().reliable,
                    recipients,
                });
                variable.mark_sent(now);
            }
        }

        output
    }

    /// Applies a delta from `sender`, stamped with the sender's `tick`
    pub fn apply_delta(
        &self,
        spawns: &mut SpawnManager,
        local_peer: Option<PeerId>,
        sender: PeerId,
        tick: Tick,
        network_id: NetworkId,
        index: VariableIndex,
        value: ReplicatedValue,
    ) -> Result<DeltaOutcome, VariableError> {
        if !self.enabled {
            trace!("variable replication disabled, ignoring delta for {}", network_id);
            return Ok(DeltaOutcome::Ignored);
        }
        self.check_length(&value)?;

        let (objects, ownership) = spawns.split_mut();
        let object = objects
            .get_mut(&network_id)
            .ok_or(VariableError::ObjectNotFound { network_id })?;
        let variable = object
            .variable_mut(index)
            .ok_or(VariableError::IndexOutOfRange { network_id, index })?;

        if variable.kind() != value.kind() {
            return Err(VariableError::TypeMismatch {
                network_id,
                index,
                expected: variable.kind(),
                actual: value.kind(),
            });
        }

        let permission = variable.permission();
        // the Server relays on behalf of Clients, so its deltas are trusted
        if !sender.is_server() && !ownership.can_write(&network_id, permission, Some(sender)) {
            warn!(
                "rejected delta from {:?} for variable {} of object {}: no write permission",
                sender, index, network_id
            );
            return Err(VariableError::PermissionViolation {
                network_id,
                index,
                peer: Some(sender),
            });
        }

        if ownership.can_write(&network_id, permission, local_peer) {
            let accept =
                permission == WritePermission::Everyone && variable.is_newer_than_known(tick);
            if !accept {
                trace!(
                    "ignoring echo or stale delta for variable {} of object {}",
                    index,
                    network_id
                );
                return Ok(DeltaOutcome::Ignored);
            }
        }

        let relay = self.host_type == HostType::Server;
        if variable.apply_remote(value, tick, sender, relay) {
            Ok(DeltaOutcome::Applied)
        } else {
            Ok(DeltaOutcome::Unchanged)
        }
    }
}
