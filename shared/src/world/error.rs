use thiserror::Error;

use crate::{
    types::{NetworkId, PeerId, SceneHandle, VariableIndex},
    wire::ValueKind,
    world::object::SpawnState,
};

/// Errors raised by the spawn/despawn lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    /// Every id in the runtime range is live or waiting out its recycle delay
    #[error("No network ids left in range {start}..{end}")]
    IdentifierExhausted { start: NetworkId, end: NetworkId },

    #[error("Object {network_id} does not exist")]
    ObjectNotFound { network_id: NetworkId },

    #[error("Prefab {index} is not registered with the Protocol")]
    PrefabNotFound { index: u16 },

    #[error("Scene {scene} has no object at placement {placement}")]
    SceneObjectNotRegistered {
        scene: SceneHandle,
        placement: u32,
    },

    /// Scene handles share the id space with the scene flag bit
    #[error("Scene handle {scene} does not fit in 31 bits")]
    SceneHandleOutOfRange { scene: SceneHandle },

    #[error("Scene object {network_id} has already been claimed")]
    SceneObjectAlreadyClaimed { network_id: NetworkId },

    #[error("Object {network_id} cannot go from {from:?} to {to:?}")]
    InvalidStateTransition {
        network_id: NetworkId,
        from: SpawnState,
        to: SpawnState,
    },

    /// Only the authoritative host may spawn, despawn or reassign objects
    #[error("{peer:?} is not authoritative and cannot {operation}")]
    NotAuthoritative {
        peer: PeerId,
        operation: &'static str,
    },

    #[error("Object {network_id} is already live")]
    DuplicateNetworkId { network_id: NetworkId },

    /// A received spawn carried values which don't match its prefab
    #[error("Spawn of object {network_id} carried values that don't match its prefab")]
    SpawnValueMismatch { network_id: NetworkId },
}

/// Errors raised while reading or writing replicated variables
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariableError {
    /// The writer does not hold write permission for this variable
    #[error("{peer:?} may not write variable {index} of object {network_id}")]
    PermissionViolation {
        network_id: NetworkId,
        index: VariableIndex,
        peer: Option<PeerId>,
    },

    #[error("Object {network_id} does not exist")]
    ObjectNotFound { network_id: NetworkId },

    #[error("Object {network_id} has no variable at index {index}")]
    IndexOutOfRange {
        network_id: NetworkId,
        index: VariableIndex,
    },

    #[error("Variable {index} of object {network_id} holds {expected:?}, got {actual:?}")]
    TypeMismatch {
        network_id: NetworkId,
        index: VariableIndex,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("Value of {length} bytes exceeds the cap of {cap} bytes")]
    LengthExceeded { length: usize, cap: usize },
}
