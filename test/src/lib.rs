pub mod helpers;
pub mod local_transport;
pub mod test_protocol;

pub use helpers::{StepEvents, TestSession};
pub use local_transport::{LinkConditionerConfig, LocalTransport, LocalTransportHub};
pub use test_protocol::protocol;
