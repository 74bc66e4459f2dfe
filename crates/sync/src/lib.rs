//! Short-range block synchronization.
//!
//! This crate implements the sync path used when the local chain is close
//! to the network tip: fetch the next window of blocks from several
//! untrusted peers at once, reconcile their answers by plurality vote over
//! block hashes, and insert the agreed chain locally.
//!
//! # Protocol Overview
//!
//! One cycle runs three steps:
//!
//! 1. **Hash chain**: ask several peers for the hashes of the next
//!    [`NUM_BLOCK_HASHES_PER_REQUEST`] heights and reduce the listings to
//!    the longest prefix a plurality agrees on, plus the whitelist of
//!    streams that agreed on every position.
//!
//! 2. **Block fetch**: download the bodies for the agreed hashes in
//!    batches, restricted to the whitelist. Batches rejected by a bad or
//!    silent peer are re-dispatched to the remaining whitelist; batch size
//!    grows as the whitelist shrinks.
//!
//! 3. **Insert**: verify and append the blocks to the local chain.
//!
//! Misbehavior is attributed to the responsible stream wherever it is
//! detected (wrong-length listings, mismatched block hashes, failed
//! fetches of promised hashes, corrupt inserted data) and punished by
//! evicting that stream for the rest of the cycle.
//!
//! # Architecture
//!
//! ```text
//! Downloader ── boot wait ── trigger loop
//!    │
//!    ▼ sync_once()
//! ShortRangeHelper
//!    │
//!    ├─► get_hash_chain()     ── Concurrency workers ──► SyncProtocol
//!    │        │                                             (peers)
//!    │        ▼
//!    │   HashChainTable ── tally per height ──► (chain, whitelist)
//!    │
//!    ├─► get_blocks_by_hashes() ── Concurrency workers ──► SyncProtocol
//!    │        │                                             (whitelist)
//!    │        ▼
//!    │   BlockFetchManager ── batches, retries ──► ordered blocks
//!    │
//!    └─► InsertHelper::verify_and_insert_blocks()
//! ```
//!
//! All I/O goes through the [`SyncProtocol`](meridian_network::SyncProtocol)
//! capability; the local chain is reached through [`ChainView`] and
//! [`InsertHelper`]. Nothing in this crate outlives a cycle except the
//! [`Downloader`] itself.

mod chain;
mod config;
mod downloader;
mod error;
mod fetch;
mod hash_chain;
mod short_range;
mod status;

pub use chain::{ChainView, InsertError, InsertErrorKind, InsertHelper};
pub use config::{
    SyncConfig, BLOCKS_BY_HASHES_LOWER_CAP, BLOCKS_BY_HASHES_TIMEOUT, BLOCKS_BY_HASHES_UPPER_CAP,
    BLOCK_HASHES_TIMEOUT, NUM_BLOCK_HASHES_PER_REQUEST,
};
pub use downloader::Downloader;
pub use error::SyncError;
pub use status::SyncStatus;
