use crate::lookup::TranscriptLookup;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use utils::rpc::{CodecError, MessageReader, MessageWriter};

/// Substituted when a request carries no usable `video_id`.
pub const NO_ID_RECEIVED: &str = "NO_ID_RECEIVED";

#[derive(Deserialize, Debug, Default)]
struct PartialRequest {
    video_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRequest {
    pub video_id: String,
}

impl TranscriptRequest {
    /// Pulls the video id out of an arbitrary payload. Anything that is not an
    /// object with a string `video_id` falls back to [`NO_ID_RECEIVED`].
    pub fn from_payload(payload: Value) -> Self {
        let partial: PartialRequest = match payload {
            Value::Object(_) => serde_json::from_value(payload).unwrap_or_default(),
            _ => PartialRequest::default(),
        };
        Self {
            video_id: partial
                .video_id
                .unwrap_or_else(|| NO_ID_RECEIVED.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TranscriptResponse {
    pub text: String,
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("failed to read request")]
    Read(#[source] CodecError),

    #[error("failed to send response")]
    Write(#[source] CodecError),
}

pub struct NativeHost<R, W, L> {
    reader: MessageReader<R>,
    writer: MessageWriter<W>,
    lookup: L,
}

impl<R: Read, W: Write, L: TranscriptLookup> NativeHost<R, W, L> {
    pub fn new(input: R, output: W, lookup: L) -> Self {
        Self {
            reader: MessageReader::new(input),
            writer: MessageWriter::new(output),
            lookup,
        }
    }

    /// Serves requests until the browser closes the input stream.
    ///
    /// Returns the number of responses written. Any read or write failure
    /// ends the loop, since the next frame boundary can no longer be trusted.
    pub fn run(&mut self) -> Result<usize, HostError> {
        let mut served = 0;

        loop {
            let payload = match self.reader.read_message::<Value>() {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    info!("Input stream closed after {} responses", served);
                    return Ok(served);
                }
                Err(e) if e.is_framing() => {
                    error!("Lost frame boundary while reading request: {}", e);
                    return Err(HostError::Read(e));
                }
                Err(e) => {
                    error!("Received malformed request: {}", e);
                    return Err(HostError::Read(e));
                }
            };

            let request = TranscriptRequest::from_payload(payload);
            info!("Received video ID: {}", request.video_id);

            let response = self.handle(&request);

            if let Err(e) = self.writer.write_message(&response) {
                error!(
                    "Failed to send response for video ID {}: {}",
                    request.video_id, e
                );
                return Err(HostError::Write(e));
            }

            served += 1;
            info!("Sent response for video ID: {}", request.video_id);
        }
    }

    fn handle(&mut self, request: &TranscriptRequest) -> TranscriptResponse {
        match self.lookup.lookup(&request.video_id) {
            Ok(text) => {
                debug!("Transcript for {} has {} bytes", request.video_id, text.len());
                TranscriptResponse { text }
            }
            Err(e) => {
                warn!("Lookup failed for {}: {}", request.video_id, e);
                TranscriptResponse {
                    text: format!("Error getting transcript: {}", e),
                }
            }
        }
    }

    #[cfg(test)]
    pub fn into_parts(self) -> (R, W, L) {
        let (reader, writer) = (self.reader.into_inner(), self.writer.into_inner());
        (reader, writer, self.lookup)
    }
}
