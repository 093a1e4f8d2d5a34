use log::warn;

use crate::{
    protocol::Protocol,
    rpc::{method_hash, RpcCall, RpcClass, RpcError, RpcMessage},
    types::{HostType, MethodHash, NetworkId, PeerId},
    world::SpawnManager,
};

fn expected_inbound_class(host_type: HostType) -> RpcClass {
    match host_type {
        HostType::Server => RpcClass::ServerRpc,
        HostType::Client => RpcClass::ClientRpc,
    }
}

/// Checks a call on the issuing side before it is queued, returning the
/// method hash to put on the wire
pub fn validate_outgoing(
    protocol: &Protocol,
    spawns: &SpawnManager,
    host_type: HostType,
    local_peer: Option<PeerId>,
    network_id: NetworkId,
    method: &str,
    payload_length: usize,
    length_cap: Option<usize>,
) -> Result<MethodHash, RpcError> {
    let Some(local_peer) = local_peer else {
        return Err(RpcError::NotConnected);
    };
    let object = spawns
        .object(&network_id)
        .ok_or(RpcError::ObjectNotFound { network_id })?;
    let (hash, endpoint) = protocol
        .endpoint_by_name(&object.prefab(), method)
        .ok_or(RpcError::UnknownMethod {
            network_id,
            method_hash: method_hash(method, protocol.hash_width()),
        })?;

    // an outgoing call is the class the other side expects to receive
    if endpoint.class != expected_inbound_class(host_type.invert()) {
        return Err(RpcError::PermissionViolation {
            network_id,
            method_hash: hash,
            peer: local_peer,
            reason: "method cannot be called in this direction",
        });
    }
    if host_type == HostType::Client
        && endpoint.require_ownership
        && spawns.owner(&network_id) != Some(local_peer)
    {
        return Err(RpcError::PermissionViolation {
            network_id,
            method_hash: hash,
            peer: local_peer,
            reason: "caller does not own the object",
        });
    }
    if let Some(cap) = length_cap {
        if payload_length > cap {
            return Err(RpcError::PayloadTooLarge {
                length: payload_length,
                cap,
            });
        }
    }
    Ok(hash)
}

/// Dispatches one received call to its target's handler. The target must
/// already be live; unresolved targets are the caller's to buffer.
pub fn dispatch(
    protocol: &Protocol,
    spawns: &mut SpawnManager,
    host_type: HostType,
    message: &RpcMessage,
) -> Result<RpcCall, RpcError> {
    let network_id = message.target;
    let violation = |reason: &'static str| {
        warn!(
            "rejected rpc {:#x} from {:?} on object {}: {}",
            message.method_hash, message.sender, network_id, reason
        );
        RpcError::PermissionViolation {
            network_id,
            method_hash: message.method_hash,
            peer: message.sender,
            reason,
        }
    };

    if message.class != expected_inbound_class(host_type) {
        return Err(violation("rpc class cannot be received by this peer"));
    }
    if host_type == HostType::Client && !message.sender.is_server() {
        return Err(violation("client rpcs may only come from the server"));
    }

    let owner = spawns.owner(&network_id);
    let object = spawns
        .object_mut(&network_id)
        .ok_or(RpcError::ObjectNotFound { network_id })?;
    let endpoint = protocol
        .endpoint(&object.prefab(), &message.method_hash)
        .ok_or(RpcError::UnknownMethod {
            network_id,
            method_hash: message.method_hash,
        })?;

    if endpoint.class != message.class {
        return Err(violation("method is declared with the other rpc class"));
    }
    if host_type == HostType::Server && endpoint.require_ownership && owner != Some(message.sender)
    {
        return Err(violation("caller does not own the object"));
    }

    let call = RpcCall {
        sender: message.sender,
        network_id,
        method: endpoint.name.clone(),
        payload: message.payload.clone(),
        tick: message.tick,
    };
    if let Some(handler) = object.handler_mut(&message.method_hash) {
        handler(&call).map_err(|reason| RpcError::Handler {
            network_id,
            method: call.method.clone(),
            reason,
        })?;
    }
    Ok(call)
}
