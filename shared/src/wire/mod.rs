mod codec;
mod frame;
mod value;

pub use codec::FrameCodec;
pub use frame::{DenyReason, Frame, MessageType, SpawnFrame};
pub use value::{ReplicatedValue, ValueKind};
