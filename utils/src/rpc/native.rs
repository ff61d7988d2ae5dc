//! Blocking message streams for the browser native messaging protocol.
//!
//! Each message is a JSON document prefixed with its byte length as a
//! little-endian `u32`. The browser talks to the host over the host's stdin
//! and stdout, so both ends here are plain [`Read`] / [`Write`] handles.

use crate::rpc::message_codec::{
    CodecError, MAX_INCOMING_MESSAGE_SIZE, MAX_OUTGOING_MESSAGE_SIZE, MessageCodec,
};
use bytes::BytesMut;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{ErrorKind, Read, Write};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

const READ_CHUNK_SIZE: usize = 4096;

pub struct MessageReader<R> {
    inner: R,
    codec: MessageCodec,
    buffer: BytesMut,
}

impl<R: Read> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_codec(inner, MessageCodec::new(MAX_INCOMING_MESSAGE_SIZE))
    }

    pub fn with_codec(inner: R, codec: MessageCodec) -> Self {
        Self {
            inner,
            codec,
            buffer: BytesMut::new(),
        }
    }

    /// Blocks until one complete frame has arrived.
    ///
    /// Returns `Ok(None)` when the stream closes cleanly between frames.
    pub fn read_frame(&mut self) -> Result<Option<BytesMut>, CodecError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                trace!("Read frame of {} bytes", frame.len());
                return Ok(Some(frame));
            }

            let mut temp = [0u8; READ_CHUNK_SIZE];
            match self.inner.read(&mut temp) {
                Ok(0) => return self.codec.decode_eof(&mut self.buffer),
                Ok(n) => self.buffer.extend_from_slice(&temp[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads one frame and parses its payload as JSON.
    pub fn read_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        match self.read_frame()? {
            Some(frame) => serde_json::from_slice(&frame)
                .map(Some)
                .map_err(CodecError::InvalidPayload),
            None => Ok(None),
        }
    }

    /// Returns the underlying stream. Bytes already buffered are dropped.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

pub struct MessageWriter<W> {
    inner: W,
    codec: MessageCodec,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_codec(inner, MessageCodec::new(MAX_OUTGOING_MESSAGE_SIZE))
    }

    pub fn with_codec(inner: W, codec: MessageCodec) -> Self {
        Self { inner, codec }
    }

    /// Serializes `message`, writes it as one frame and flushes.
    pub fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), CodecError> {
        let payload = serde_json::to_vec(message).map_err(CodecError::Serialize)?;
        self.write_frame(payload)
    }

    pub fn write_frame(&mut self, payload: Vec<u8>) -> Result<(), CodecError> {
        let mut encoded = BytesMut::new();
        self.codec.encode(payload, &mut encoded)?;

        self.inner.write_all(&encoded)?;
        self.inner.flush()?;
        trace!("Wrote frame of {} bytes", encoded.len());
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
