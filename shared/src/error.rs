use netrep_serde::SerdeErr;
use thiserror::Error;

use crate::{
    config::ConfigError,
    protocol::ProtocolError,
    rpc::RpcError,
    transport::TransportError,
    types::PeerId,
    wire::{DenyReason, MessageType},
    world::{SpawnError, VariableError},
};

/// Every failure a Server or Client can report, either returned from an API
/// call or surfaced through an `ErrorEvent`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Discarded undecodable frame from {peer:?}: {source}")]
    Decode { peer: PeerId, source: SerdeErr },

    /// A well-formed frame this peer should never receive, e.g. a Client
    /// sending a spawn
    #[error("Discarded unexpected {message_type:?} frame from {peer:?}")]
    UnexpectedFrame {
        peer: PeerId,
        message_type: MessageType,
    },

    #[error("Peer {peer:?} is not connected")]
    UnknownPeer { peer: PeerId },

    #[error("Peer {peer:?} has sent {count} undecodable frames")]
    MisbehavingPeer { peer: PeerId, count: u32 },

    /// A connection request from a Client whose Protocol doesn't match
    #[error("Denied connection from {peer:?}: {reason:?}")]
    IncompatiblePeer { peer: PeerId, reason: DenyReason },
}
