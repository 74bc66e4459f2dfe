//! Network messages for the sync protocol.
//!
//! Every message travelling on a sync stream is a [`Message`] envelope: a
//! request id (so responses can be matched to in-flight requests) plus an
//! SBOR-encoded payload.

pub mod request;
pub mod response;

// Re-export commonly used types
pub use request::{GetBlockHashesRequest, GetBlocksByHashesRequest};
pub use response::{BlockHashesResponse, BlocksResponse};

use sbor::prelude::*;
use thiserror::Error;

/// Failed to encode or decode a message.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message encoding failed: {0}")]
    Encode(String),
    #[error("message decoding failed: {0}")]
    Decode(String),
}

/// Envelope for one message on a sync stream.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Message {
    /// Correlates a response with the request that caused it.
    pub request_id: u64,
    pub payload: MessagePayload,
}

/// The request and response payloads of the sync protocol.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub enum MessagePayload {
    GetBlockHashesRequest(GetBlockHashesRequest),
    BlockHashesResponse(BlockHashesResponse),
    GetBlocksByHashesRequest(GetBlocksByHashesRequest),
    BlocksResponse(BlocksResponse),
}

impl Message {
    pub fn new(request_id: u64, payload: MessagePayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Encode the envelope for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        basic_encode(self).map_err(|e| CodecError::Encode(format!("{e:?}")))
    }

    /// Decode an envelope from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        basic_decode(bytes).map_err(|e| CodecError::Decode(format!("{e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::BlockHeight;

    #[test]
    fn envelope_roundtrip() {
        let msg = Message::new(
            42,
            MessagePayload::GetBlockHashesRequest(GetBlockHashesRequest {
                heights: vec![BlockHeight(5), BlockHeight(6)],
            }),
        );
        let bytes = msg.encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Message::decode(&[0xff, 0x00, 0x13]).is_err());
    }

    #[test]
    fn response_with_absent_blocks() {
        let msg = Message::new(
            7,
            MessagePayload::BlocksResponse(BlocksResponse {
                blocks: vec![None, None],
            }),
        );
        let bytes = msg.encode().unwrap();
        let decoded = Message::decode(&bytes).unwrap();
        match decoded.payload {
            MessagePayload::BlocksResponse(resp) => assert_eq!(resp.blocks, vec![None, None]),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
