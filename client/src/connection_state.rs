#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Connection request sent, waiting for the Server's answer
    Requesting,
    Connected,
    Rejected,
}
