//! Errors visible at the sync core boundary.

use crate::chain::InsertError;
use meridian_types::Hash;
use thiserror::Error;

/// Failure of one short-range sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Too few healthy streams to start a cycle. The outer loop retries
    /// after its back-off.
    #[error("not enough streams: {available} available, {required} required")]
    NotEnoughStreams { available: usize, required: usize },

    /// The cycle was canceled by shutdown. Nothing is evicted.
    #[error("sync canceled")]
    Canceled,

    /// The fetch manager ran out of trustable streams. Fatal for this cycle.
    #[error("empty whitelist: no trusted stream left to fetch from")]
    EmptyWhitelist,

    /// A target hash has no block record at finalization. This violates the
    /// fetch manager's completion invariant and indicates a core bug.
    #[error("fetched chain is missing block {hash}")]
    MissingBlock { hash: Hash },

    /// Verification or insertion of the fetched chain failed.
    #[error(transparent)]
    Insert(#[from] InsertError),
}

impl SyncError {
    /// Whether this failure was caused by cancellation rather than by peers.
    pub fn is_canceled(&self) -> bool {
        matches!(self, SyncError::Canceled)
    }
}
