use std::default::Default;

use netrep_shared::ReplicationConfig;

/// Contains Config properties which will be used by a Client
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    /// Shared replication settings. Must match the Server's.
    pub replication: ReplicationConfig,
    /// Sent with the connection request, for the Server to approve or deny
    pub connection_payload: Vec<u8>,
}
