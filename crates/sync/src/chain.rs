//! Local chain contracts consumed by the downloader.
//!
//! Block validation and storage belong to the node's chain component; the
//! sync core only reads the current height and hands over fetched blocks.

use meridian_types::{Block, BlockHeight};
use thiserror::Error;

/// Read side of the local chain.
pub trait ChainView: Send + Sync {
    /// Height of the current tip.
    fn current_height(&self) -> BlockHeight;
}

/// Verifies and appends a contiguous block slice to the local chain.
pub trait InsertHelper: Send + Sync {
    /// Returns the number of blocks inserted. On failure the error carries
    /// the count inserted before the failing block.
    fn verify_and_insert_blocks(&self, blocks: &[Block]) -> Result<usize, InsertError>;
}

/// Insertion failure, split by who is to blame.
#[derive(Debug, Clone, Error)]
#[error("insert failed after {inserted} blocks: {kind}")]
pub struct InsertError {
    /// Blocks inserted before the failure.
    pub inserted: usize,
    pub kind: InsertErrorKind,
}

#[derive(Debug, Clone, Error)]
pub enum InsertErrorKind {
    /// The block is cryptographically invalid. The signer is distinct from
    /// the supplying stream, so suppliers are not evicted for this.
    #[error("block signature verification failed")]
    SigVerify,

    /// Any other insertion failure. Treated as corrupted data from the
    /// supplying streams.
    #[error("{0}")]
    Other(String),
}

impl InsertError {
    pub fn sig_verify(inserted: usize) -> Self {
        Self {
            inserted,
            kind: InsertErrorKind::SigVerify,
        }
    }

    pub fn other(inserted: usize, reason: impl Into<String>) -> Self {
        Self {
            inserted,
            kind: InsertErrorKind::Other(reason.into()),
        }
    }

    /// Whether the failure is signature-class.
    pub fn is_sig_verify(&self) -> bool {
        matches!(self.kind, InsertErrorKind::SigVerify)
    }
}
