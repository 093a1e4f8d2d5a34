mod dispatcher;
mod error;
mod message;
mod queue;

pub use dispatcher::{dispatch, validate_outgoing};
pub use error::RpcError;
pub(crate) use message::Fnv1a;
pub use message::{method_hash, RpcCall, RpcClass, RpcMessage, RpcTarget};
pub use queue::RpcQueue;
