use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the little-endian length prefix in front of every frame.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest message the browser will send to a native host (64 MiB).
pub const MAX_INCOMING_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Largest message the browser accepts from a native host (1 MiB).
pub const MAX_OUTGOING_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum CodecError {
    /// The stream closed in the middle of the 4-byte length prefix.
    #[error("stream closed after {received} of 4 length prefix bytes")]
    TruncatedPrefix { received: usize },

    /// The stream closed before the declared payload was fully read.
    #[error("stream closed after {received} of {expected} payload bytes")]
    TruncatedPayload { expected: usize, received: usize },

    /// A frame declared (or would need) more bytes than the configured limit.
    #[error("message of {length} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { length: usize, limit: usize },

    /// The payload was complete but is not valid JSON.
    #[error("invalid message payload: {0}")]
    InvalidPayload(serde_json::Error),

    /// The outgoing value could not be serialized.
    #[error("failed to serialize message: {0}")]
    Serialize(serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True for errors that mean the byte boundary of the next frame is lost.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            CodecError::TruncatedPrefix { .. }
                | CodecError::TruncatedPayload { .. }
                | CodecError::FrameTooLarge { .. }
                | CodecError::Io(_)
        )
    }
}

/// Frame format: [length: u32 little-endian][data: bytes]
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_length: usize,
}

impl MessageCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.min(u32::MAX as usize),
        }
    }

    fn peek_length(src: &BytesMut) -> usize {
        u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize
    }
}

impl Decoder for MessageCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let length = Self::peek_length(src);
        if length > self.max_length {
            return Err(CodecError::FrameTooLarge {
                length,
                limit: self.max_length,
            });
        }

        if src.len() < LENGTH_PREFIX_SIZE + length {
            src.reserve(LENGTH_PREFIX_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(length)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        // Stream closed on a frame boundary.
        if src.is_empty() {
            return Ok(None);
        }

        if src.len() < LENGTH_PREFIX_SIZE {
            return Err(CodecError::TruncatedPrefix {
                received: src.len(),
            });
        }

        Err(CodecError::TruncatedPayload {
            expected: Self::peek_length(src),
            received: src.len() - LENGTH_PREFIX_SIZE,
        })
    }
}

impl Encoder<Vec<u8>> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_length {
            return Err(CodecError::FrameTooLarge {
                length: item.len(),
                limit: self.max_length,
            });
        }

        let length = item.len() as u32;
        dst.reserve(LENGTH_PREFIX_SIZE + item.len());
        dst.put_u32_le(length);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u32_le(payload.len() as u32);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn decodes_complete_frame_and_leaves_the_rest() {
        let mut codec = MessageCodec::new(MAX_INCOMING_MESSAGE_SIZE);
        let mut buf = frame(b"first");
        buf.extend_from_slice(&frame(b"second"));

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first[..], b"first");
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&second[..], b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_whole_payload() {
        let mut codec = MessageCodec::new(MAX_INCOMING_MESSAGE_SIZE);
        let full = frame(b"0123456789");
        let mut buf = BytesMut::from(&full[..7]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 7);

        buf.extend_from_slice(&full[7..]);
        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&payload[..], b"0123456789");
    }

    #[test]
    fn zero_length_frame_is_valid() {
        let mut codec = MessageCodec::new(MAX_INCOMING_MESSAGE_SIZE);
        let mut buf = frame(b"");
        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn eof_on_boundary_is_end_of_stream() {
        let mut codec = MessageCodec::new(MAX_INCOMING_MESSAGE_SIZE);
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn eof_inside_prefix_is_truncated_prefix() {
        let mut codec = MessageCodec::new(MAX_INCOMING_MESSAGE_SIZE);
        let mut buf = BytesMut::from(&[10u8, 0, 0][..]);
        match codec.decode_eof(&mut buf) {
            Err(CodecError::TruncatedPrefix { received }) => assert_eq!(received, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn eof_inside_payload_is_truncated_payload() {
        let mut codec = MessageCodec::new(MAX_INCOMING_MESSAGE_SIZE);
        let mut buf = BytesMut::new();
        buf.put_u32_le(10);
        buf.extend_from_slice(b"abc");

        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(err.is_framing());
        match err {
            CodecError::TruncatedPayload { expected, received } => {
                assert_eq!(expected, 10);
                assert_eq!(received, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn rejects_declared_length_over_limit() {
        let mut codec = MessageCodec::new(16);
        let mut buf = BytesMut::new();
        buf.put_u32_le(17);

        match codec.decode(&mut buf) {
            Err(CodecError::FrameTooLarge { length, limit }) => {
                assert_eq!(length, 17);
                assert_eq!(limit, 16);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn rejects_near_u32_max_prefix_without_allocating() {
        let mut codec = MessageCodec::new(MAX_INCOMING_MESSAGE_SIZE);
        let mut buf = BytesMut::from(&[0xff, 0xff, 0xff, 0xfe][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::FrameTooLarge { .. })
        ));
        assert!(buf.capacity() < 1024);
    }

    #[test]
    fn encode_writes_little_endian_prefix() {
        let mut codec = MessageCodec::new(MAX_INCOMING_MESSAGE_SIZE);
        let mut dst = BytesMut::new();
        codec.encode(b"{\"text\":\"hi\"}".to_vec(), &mut dst).unwrap();

        assert_eq!(&dst[..4], &[13, 0, 0, 0]);
        assert_eq!(&dst[4..], b"{\"text\":\"hi\"}");
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let mut codec = MessageCodec::new(8);
        let mut dst = BytesMut::new();
        let err = codec.encode(vec![b'x'; 9], &mut dst).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { length: 9, limit: 8 }));
        assert!(dst.is_empty());
    }

    #[test]
    fn encoded_frame_decodes_back() {
        let mut codec = MessageCodec::new(MAX_INCOMING_MESSAGE_SIZE);
        let mut buf = BytesMut::new();
        codec.encode("größe ✓".as_bytes().to_vec(), &mut buf).unwrap();

        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(std::str::from_utf8(&payload).unwrap(), "größe ✓");
    }
}
