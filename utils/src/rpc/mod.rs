pub mod message_codec;
pub mod native;

pub use message_codec::{CodecError, MessageCodec};
pub use native::{MessageReader, MessageWriter};
