//! Stream and request errors.

use meridian_messages::CodecError;
use meridian_types::StreamId;
use thiserror::Error;

/// Failure on one framed stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The message exceeds the 20 MiB frame limit. Raised on both the read
    /// and the write path.
    #[error("message size {size} exceeds limit {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("stream i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one sync protocol request.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The stream manager had no stream eligible for the request.
    #[error("no healthy stream available for request")]
    NoAvailableStream,

    /// The assigned stream did not answer within the caller's deadline.
    #[error("request to stream {stream} timed out")]
    Timeout { stream: StreamId },

    /// Transport failure on the assigned stream.
    #[error("stream {stream} failed: {source}")]
    Stream {
        stream: StreamId,
        source: StreamError,
    },

    /// The peer answered with something that does not parse as a response
    /// to the request.
    #[error("malformed response from stream {stream}: {reason}")]
    MalformedResponse { stream: StreamId, reason: String },
}

impl ProtocolError {
    /// The stream this failure is attributed to, when one was assigned.
    pub fn stream(&self) -> Option<&StreamId> {
        match self {
            ProtocolError::NoAvailableStream => None,
            ProtocolError::Timeout { stream }
            | ProtocolError::Stream { stream, .. }
            | ProtocolError::MalformedResponse { stream, .. } => Some(stream),
        }
    }
}
