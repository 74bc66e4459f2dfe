//! Foundational types for the Meridian node.
//!
//! Everything that crosses a crate boundary lives here: block identity
//! ([`Hash`], [`BlockHeight`]), peer stream identity ([`StreamId`]), and the
//! block structure itself ([`Block`], [`BlockHeader`]).

use sbor::prelude::*;
use std::fmt;

/// A 32-byte content hash.
///
/// The all-zero value is reserved as [`Hash::EMPTY`], meaning "no block".
/// Equality is byte equality; ordering is lexicographic over the bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The distinguished "no block" hash.
    pub const EMPTY: Hash = Hash([0u8; 32]);

    /// Hash arbitrary bytes with blake3.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap raw digest bytes without hashing.
    pub fn from_raw(raw: [u8; 32]) -> Self {
        Self(raw)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the "no block" sentinel.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..", hex::encode(&self.0[..4]))
    }
}

/// Position of a block in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct BlockHeight(pub u64);

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one shard group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct ShardId(pub u32);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one peer stream, compared by value.
///
/// Carries whatever identifier the transport assigns to the underlying
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Header of one block.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct BlockHeader {
    /// Position in the chain.
    pub height: BlockHeight,

    /// Hash of the parent block.
    pub parent_hash: Hash,

    /// State root after applying this block.
    pub state_root: Hash,

    /// Proposer wall-clock timestamp in milliseconds.
    pub timestamp_ms: u64,

    /// Shard this block belongs to.
    pub shard: ShardId,
}

impl BlockHeader {
    /// Compute the identity hash of this header.
    pub fn hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.height.0.to_le_bytes());
        data.extend_from_slice(self.parent_hash.as_bytes());
        data.extend_from_slice(self.state_root.as_bytes());
        data.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        data.extend_from_slice(&self.shard.0.to_le_bytes());
        Hash::from_bytes(&data)
    }
}

/// A full block: header plus opaque transaction payloads.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    /// The block's identity hash (hash of the header).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// The block's height.
    pub fn height(&self) -> BlockHeight {
        self.header.height
    }
}
