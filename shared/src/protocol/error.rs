use thiserror::Error;

use crate::types::MethodHash;

/// Errors that can occur during protocol operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Protocol is locked and cannot be modified
    #[error("Protocol is already locked and cannot be modified. Protocol.lock() has been called and no further changes are allowed")]
    AlreadyLocked,

    /// Two methods of one prefab hash to the same value at the configured width
    #[error("Methods `{first}` and `{second}` of prefab `{prefab}` collide on hash {hash:#x}")]
    MethodHashCollision {
        prefab: String,
        first: String,
        second: String,
        hash: MethodHash,
    },

    #[error("Prefab `{prefab}` declares more than {max} variables")]
    TooManyVariables { prefab: String, max: usize },

    #[error("A Protocol holds at most {max} prefabs")]
    TooManyPrefabs { max: usize },

    #[error("Prefab `{name}` is registered twice")]
    DuplicatePrefab { name: String },
}
