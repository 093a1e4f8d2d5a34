use thiserror::Error;

use netrep_shared::{PeerId, ReplicationError, SpawnError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("Peer {peer:?} has no pending connection")]
    NoPendingConnection { peer: PeerId },

    #[error("Peer {peer:?} is already connected")]
    AlreadyConnected { peer: PeerId },

    #[error("Peer {peer:?} is not a connected Client")]
    NotConnected { peer: PeerId },

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Replication(#[from] ReplicationError),
}
