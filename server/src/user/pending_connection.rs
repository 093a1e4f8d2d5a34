use std::time::{Duration, Instant};

/// A Client with an open link that has not been approved yet
#[derive(Clone, Debug)]
pub struct PendingConnection {
    connected_at: Instant,
    request: Option<Vec<u8>>,
}

impl PendingConnection {
    pub fn new(connected_at: Instant) -> Self {
        Self {
            connected_at,
            request: None,
        }
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Whether the Client has sent its connection request
    pub fn has_requested(&self) -> bool {
        self.request.is_some()
    }

    pub fn request_payload(&self) -> Option<&[u8]> {
        self.request.as_deref()
    }

    pub(crate) fn set_request(&mut self, payload: Vec<u8>) {
        self.request = Some(payload);
    }

    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.connected_at) >= timeout
    }
}
