use netrep_serde::SerdeErr;

use crate::{
    rpc::{RpcClass, RpcMessage},
    types::{NetworkId, PeerId, PrefabRef, SceneHandle, VariableIndex},
    wire::ReplicatedValue,
};

/// First byte of every frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    ConnectionRequest,
    ConnectionApproved,
    ConnectionDenied,
    Spawn,
    Despawn,
    VariableDelta,
    RpcBatch,
    OwnershipChange,
    TimeSync,
}

impl MessageType {
    pub fn to_byte(&self) -> u8 {
        match self {
            MessageType::ConnectionRequest => 0,
            MessageType::ConnectionApproved => 1,
            MessageType::ConnectionDenied => 2,
            MessageType::Spawn => 3,
            MessageType::Despawn => 4,
            MessageType::VariableDelta => 5,
            MessageType::RpcBatch => 6,
            MessageType::OwnershipChange => 7,
            MessageType::TimeSync => 8,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, SerdeErr> {
        match byte {
            0 => Ok(MessageType::ConnectionRequest),
            1 => Ok(MessageType::ConnectionApproved),
            2 => Ok(MessageType::ConnectionDenied),
            3 => Ok(MessageType::Spawn),
            4 => Ok(MessageType::Despawn),
            5 => Ok(MessageType::VariableDelta),
            6 => Ok(MessageType::RpcBatch),
            7 => Ok(MessageType::OwnershipChange),
            8 => Ok(MessageType::TimeSync),
            tag => Err(SerdeErr::InvalidTag {
                tag,
                type_name: "MessageType",
            }),
        }
    }

    /// Whether frames of this type are handled by the connection layer rather
    /// than the replication engine
    pub fn is_connection_control(&self) -> bool {
        matches!(
            self,
            MessageType::ConnectionRequest
                | MessageType::ConnectionApproved
                | MessageType::ConnectionDenied
                | MessageType::TimeSync
        )
    }
}

/// Why the Server refused a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// Denied by the host through `reject_connection`
    Rejected,
    /// The Client's `protocol_version` differs from the Server's
    ProtocolVersion,
    /// The Client's Protocol fingerprint differs from the Server's
    PrefabMismatch,
}

impl DenyReason {
    pub fn to_byte(&self) -> u8 {
        match self {
            DenyReason::Rejected => 0,
            DenyReason::ProtocolVersion => 1,
            DenyReason::PrefabMismatch => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, SerdeErr> {
        match byte {
            0 => Ok(DenyReason::Rejected),
            1 => Ok(DenyReason::ProtocolVersion),
            2 => Ok(DenyReason::PrefabMismatch),
            tag => Err(SerdeErr::InvalidTag {
                tag,
                type_name: "DenyReason",
            }),
        }
    }
}

/// Everything a receiver needs to materialize a replicated object
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnFrame {
    pub network_id: NetworkId,
    pub owner: PeerId,
    pub prefab: PrefabRef,
    pub is_player_object: bool,
    pub is_scene_object: bool,
    pub destroy_with_scene: bool,
    pub scene: Option<SceneHandle>,
    /// Current value of every variable, in prefab order
    pub values: Vec<ReplicatedValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    ConnectionRequest {
        protocol_version: u32,
        /// [`Protocol::fingerprint`](crate::Protocol::fingerprint) of the Client
        fingerprint: u64,
        payload: Vec<u8>,
    },
    ConnectionApproved {
        client_id: PeerId,
    },
    ConnectionDenied {
        reason: DenyReason,
    },
    Spawn(SpawnFrame),
    Despawn {
        network_id: NetworkId,
    },
    VariableDelta {
        network_id: NetworkId,
        variable_index: VariableIndex,
        value: ReplicatedValue,
    },
    /// Every call flushed to one peer during one tick. Sender and tick of
    /// the contained messages are filled in on receipt.
    RpcBatch {
        class: RpcClass,
        messages: Vec<RpcMessage>,
    },
    OwnershipChange {
        network_id: NetworkId,
        owner: PeerId,
    },
    /// The Server's current tick, carried in the header
    TimeSync,
}

impl Frame {
    pub fn message_type(&self) -> MessageType {
        match self {
            Frame::ConnectionRequest { .. } => MessageType::ConnectionRequest,
            Frame::ConnectionApproved { .. } => MessageType::ConnectionApproved,
            Frame::ConnectionDenied { .. } => MessageType::ConnectionDenied,
            Frame::Spawn(_) => MessageType::Spawn,
            Frame::Despawn { .. } => MessageType::Despawn,
            Frame::VariableDelta { .. } => MessageType::VariableDelta,
            Frame::RpcBatch { .. } => MessageType::RpcBatch,
            Frame::OwnershipChange { .. } => MessageType::OwnershipChange,
            Frame::TimeSync => MessageType::TimeSync,
        }
    }

    /// The object this frame is addressed to, if any
    pub fn network_id(&self) -> Option<NetworkId> {
        match self {
            Frame::Spawn(spawn) => Some(spawn.network_id),
            Frame::Despawn { network_id }
            | Frame::VariableDelta { network_id, .. }
            | Frame::OwnershipChange { network_id, .. } => Some(*network_id),
            _ => None,
        }
    }
}
