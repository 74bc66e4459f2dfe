//! Stream-layer contract for block synchronization.
//!
//! The sync core does not talk to sockets. It consumes the [`SyncProtocol`]
//! capability, implemented by the node's stream manager, which owns peer
//! discovery, connection pooling and stream selection. This crate defines
//! that contract, the wire framing every sync stream uses
//! ([`stream::FramedStream`]), and the errors a request can fail with.

mod config;
mod error;
pub mod stream;

pub use config::StreamCaps;
pub use error::{ProtocolError, StreamError};
pub use stream::{FramedStream, MAX_MESSAGE_BYTES};

use async_trait::async_trait;
use meridian_types::{Block, BlockHeight, Hash, StreamId};
use std::time::Duration;
use tokio::sync::broadcast;

/// A hash listing delivered by one peer stream.
#[derive(Debug, Clone)]
pub struct HashesFromStream {
    /// One hash per requested height, positionally aligned.
    pub hashes: Vec<Hash>,
    /// The stream that served the request.
    pub stream: StreamId,
}

/// Block bodies delivered by one peer stream.
#[derive(Debug, Clone)]
pub struct BlocksFromStream {
    /// One entry per requested hash, positionally aligned. `None` means the
    /// peer does not have that body.
    pub blocks: Vec<Option<Block>>,
    /// The stream that served the request.
    pub stream: StreamId,
}

/// The sync protocol capability consumed by the downloader core.
///
/// Request deadlines are chosen by the caller and enforced by the
/// implementation, so that a request that runs out of time still names the
/// stream that stalled (via [`ProtocolError::stream`]).
#[async_trait]
pub trait SyncProtocol: Send + Sync {
    /// Number of currently healthy peer streams.
    fn num_streams(&self) -> usize;

    /// Ask one peer (selected by the implementation) for the block hashes at
    /// the given heights.
    async fn get_block_hashes(
        &self,
        heights: &[BlockHeight],
        deadline: Duration,
    ) -> Result<HashesFromStream, ProtocolError>;

    /// Ask one peer inside `whitelist` for the block bodies with the given
    /// hashes.
    async fn get_blocks_by_hashes(
        &self,
        hashes: &[Hash],
        whitelist: &[StreamId],
        deadline: Duration,
    ) -> Result<BlocksFromStream, ProtocolError>;

    /// Evict a misbehaving stream. The stream is not used again until the
    /// stream manager re-establishes it.
    fn remove_stream(&self, stream: &StreamId);

    /// Subscribe to stream-added events. Used by the boot loop to wait for
    /// enough peers before syncing starts.
    fn subscribe_stream_added(&self) -> broadcast::Receiver<StreamId>;
}
