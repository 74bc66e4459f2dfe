//! Response messages (point-to-point).
//!
//! These messages are sent in reply to request messages.

use meridian_types::{Block, Hash};
use sbor::prelude::*;

/// Reply to [`GetBlockHashesRequest`](crate::GetBlockHashesRequest).
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct BlockHashesResponse {
    /// One hash per requested height, positionally aligned with the request.
    /// [`Hash::EMPTY`] means the peer has no block at that height.
    pub hashes: Vec<Hash>,
}

/// Reply to [`GetBlocksByHashesRequest`](crate::GetBlocksByHashesRequest).
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct BlocksResponse {
    /// One entry per requested hash, positionally aligned with the request.
    /// `None` means the peer does not have that block body.
    pub blocks: Vec<Option<Block>>,
}
