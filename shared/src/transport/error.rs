use thiserror::Error;

use crate::types::PeerId;

/// Errors a [`Transport`](crate::Transport) may report when sending
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No open link to this peer
    #[error("No open link to {peer:?}")]
    NotConnected { peer: PeerId },

    /// The underlying socket refused the payload
    #[error("Failed to send to {peer:?}: {reason}")]
    SendFailed { peer: PeerId, reason: String },
}
