mod message_buffer;

pub use message_buffer::{BufferRefusal, BufferedMessage, MessageBuffer, Resolved};
