mod error;

pub use error::TransportError;

use crate::types::PeerId;

/// The delivery layer the engine sends through. Implementations must not
/// block: inbound data is pushed back into the engine by the embedding
/// application via `receive`, `peer_connected` and `peer_disconnected`.
pub trait Transport {
    /// Queues `payload` for delivery to `peer`. Reliable payloads must arrive
    /// once and in order; unreliable ones may be dropped but are never
    /// duplicated.
    fn send(&mut self, peer: PeerId, payload: &[u8], reliable: bool) -> Result<(), TransportError>;

    /// Closes the link to `peer`
    fn disconnect(&mut self, peer: PeerId);
}
