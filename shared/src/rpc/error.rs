use thiserror::Error;

use crate::types::{MethodHash, NetworkId, PeerId};

/// Errors raised while issuing or dispatching an RPC. Each is reported per
/// message and never aborts the rest of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("{peer:?} may not call method {method_hash:#x} on object {network_id}: {reason}")]
    PermissionViolation {
        network_id: NetworkId,
        method_hash: MethodHash,
        peer: PeerId,
        reason: &'static str,
    },

    #[error("Object {network_id} exposes no method {method_hash:#x}")]
    UnknownMethod {
        network_id: NetworkId,
        method_hash: MethodHash,
    },

    #[error("Object {network_id} does not exist")]
    ObjectNotFound { network_id: NetworkId },

    #[error("RPC payload of {length} bytes exceeds the cap of {cap} bytes")]
    PayloadTooLarge { length: usize, cap: usize },

    #[error("Handler for {method} on object {network_id} failed: {reason}")]
    Handler {
        network_id: NetworkId,
        method: String,
        reason: String,
    },

    /// A Client tried to call before its connection was approved
    #[error("Cannot send RPCs before the connection is established")]
    NotConnected,
}
