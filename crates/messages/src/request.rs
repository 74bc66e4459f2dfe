//! Request messages (point-to-point).
//!
//! These messages are sent directly to a specific peer and expect a response.

use meridian_types::{BlockHeight, Hash};
use sbor::prelude::*;

/// Ask a peer for the block hashes at the given heights.
///
/// The response must carry exactly one hash per requested height, in order.
/// A peer that has no block at a height reports [`Hash::EMPTY`] there.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct GetBlockHashesRequest {
    /// Heights to report hashes for, in ascending order.
    pub heights: Vec<BlockHeight>,
}

/// Ask a peer for the block bodies with the given hashes.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct GetBlocksByHashesRequest {
    /// Hashes of the wanted blocks.
    pub hashes: Vec<Hash>,
}
