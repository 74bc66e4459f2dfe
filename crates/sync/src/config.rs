//! Downloader configuration.

use meridian_network::StreamCaps;
use meridian_types::ShardId;
use std::time::Duration;

/// Number of block hashes requested per short-range cycle. Also the upper
/// bound on how far one cycle can advance the local chain.
pub const NUM_BLOCK_HASHES_PER_REQUEST: usize = 20;

/// Lower cap on the number of blocks requested in one batch.
pub const BLOCKS_BY_HASHES_LOWER_CAP: usize = 6;

/// Upper cap on the number of blocks requested in one batch.
pub const BLOCKS_BY_HASHES_UPPER_CAP: usize = 10;

/// Deadline for one block-hashes request.
pub const BLOCK_HASHES_TIMEOUT: Duration = Duration::from_secs(1);

/// Deadline for one blocks-by-hashes request.
pub const BLOCKS_BY_HASHES_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the downloader of one shard.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Shard this downloader serves.
    pub shard: ShardId,

    /// Worker count per sync phase. Also the minimum number of healthy
    /// streams required to start a cycle.
    pub concurrency: usize,

    /// Minimum streams before the boot loop hands control to the sync loop.
    pub init_streams: usize,

    /// When set, the node only serves peers and never syncs itself.
    pub server_only: bool,

    /// Capacity caps passed through to the stream manager.
    pub stream_caps: StreamCaps,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            shard: ShardId(0),
            concurrency: 4,
            init_streams: 4,
            server_only: false,
            stream_caps: StreamCaps::default(),
        }
    }
}

impl SyncConfig {
    pub fn new(shard: ShardId) -> Self {
        Self {
            shard,
            ..Default::default()
        }
    }

    /// Set the per-phase worker count.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the minimum streams required before syncing starts.
    pub fn with_init_streams(mut self, init_streams: usize) -> Self {
        self.init_streams = init_streams;
        self
    }

    /// Run in serve-only mode.
    pub fn with_server_only(mut self, server_only: bool) -> Self {
        self.server_only = server_only;
        self
    }

    /// Set the stream manager caps.
    pub fn with_stream_caps(mut self, caps: StreamCaps) -> Self {
        self.stream_caps = caps;
        self
    }

    /// Clamp nonsense values. A zero concurrency would spawn no workers and
    /// an `init_streams` below `concurrency` would boot a loop whose every
    /// cycle fails the prerequisite check.
    pub fn sanitize(mut self) -> Self {
        if self.concurrency == 0 {
            self.concurrency = 1;
        }
        if self.init_streams < self.concurrency {
            self.init_streams = self.concurrency;
        }
        self
    }
}
