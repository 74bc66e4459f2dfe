//! Short-range sync phases.
//!
//! One cycle runs two fan-out phases against the peer layer. The hash
//! phase asks several peers for the hashes of the next block window and
//! reduces the answers into an agreed chain plus the whitelist of peers
//! that agreed. The fetch phase downloads the bodies for that chain from
//! whitelisted peers only, retrying rejected batches until the window is
//! complete or no trusted peer remains.

use crate::config::{
    BLOCKS_BY_HASHES_TIMEOUT, BLOCK_HASHES_TIMEOUT, NUM_BLOCK_HASHES_PER_REQUEST,
};
use crate::error::SyncError;
use crate::fetch::BlockFetchManager;
use crate::hash_chain::HashChainTable;
use meridian_network::{ProtocolError, SyncProtocol};
use meridian_types::{Block, BlockHeight, Hash, StreamId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a fetch worker waits when all remaining hashes are in flight
/// on other workers.
const FETCH_BACKOFF: Duration = Duration::from_millis(200);

/// Runs the phases of one short-range cycle.
#[derive(Clone)]
pub(crate) struct ShortRangeHelper {
    protocol: Arc<dyn SyncProtocol>,
    concurrency: usize,
    token: CancellationToken,
}

impl ShortRangeHelper {
    pub(crate) fn new(
        protocol: Arc<dyn SyncProtocol>,
        concurrency: usize,
        token: CancellationToken,
    ) -> Self {
        Self {
            protocol,
            concurrency,
            token,
        }
    }

    /// A cycle needs at least one healthy stream per worker.
    pub(crate) fn check_prerequisites(&self) -> Result<(), SyncError> {
        let available = self.protocol.num_streams();
        if available < self.concurrency {
            return Err(SyncError::NotEnoughStreams {
                available,
                required: self.concurrency,
            });
        }
        Ok(())
    }

    /// Hash phase: fan out listing requests and reduce to the longest
    /// agreed prefix starting at `current + 1`.
    ///
    /// Workers do not retry; a failed request simply contributes nothing
    /// to the vote.
    pub(crate) async fn get_hash_chain(
        &self,
        current: BlockHeight,
    ) -> Result<(Vec<Hash>, HashSet<StreamId>), SyncError> {
        let table = Arc::new(HashChainTable::new(prepare_heights(current)));

        let mut workers = JoinSet::new();
        for _ in 0..self.concurrency {
            let helper = self.clone();
            let table = Arc::clone(&table);
            workers.spawn(async move {
                let heights = table.heights().to_vec();
                tokio::select! {
                    _ = helper.token.cancelled() => {}
                    result = helper.request_hashes(&heights) => match result {
                        Ok((hashes, stream)) => table.add_listing(&hashes, &stream),
                        Err(err) => debug!(%err, "block hashes request failed"),
                    }
                }
            });
        }
        while workers.join_next().await.is_some() {}

        if self.token.is_cancelled() {
            return Err(SyncError::Canceled);
        }
        Ok(table.longest_chain())
    }

    /// Fetch phase: download the bodies for `chain` from `whitelist`.
    pub(crate) async fn get_blocks_by_hashes(
        &self,
        chain: &[Hash],
        whitelist: HashSet<StreamId>,
    ) -> Result<Vec<Block>, SyncError> {
        let manager = Arc::new(BlockFetchManager::new(chain.to_vec(), whitelist));
        let first_error: Arc<Mutex<Option<SyncError>>> = Arc::new(Mutex::new(None));
        let phase = self.token.child_token();

        let mut workers = JoinSet::new();
        for _ in 0..self.concurrency {
            let helper = self.clone();
            let manager = Arc::clone(&manager);
            let first_error = Arc::clone(&first_error);
            let phase = phase.clone();
            workers.spawn(async move {
                helper.fetch_worker(manager, phase, first_error).await;
            });
        }
        while workers.join_next().await.is_some() {}

        if let Some(err) = first_error.lock().take() {
            return Err(err);
        }
        if self.token.is_cancelled() {
            return Err(SyncError::Canceled);
        }
        manager.finalize()
    }

    /// Evict every stream in `streams` from the peer layer.
    pub(crate) fn remove_streams<'a>(&self, streams: impl IntoIterator<Item = &'a StreamId>) {
        for stream in streams {
            self.protocol.remove_stream(stream);
        }
    }

    async fn fetch_worker(
        &self,
        manager: Arc<BlockFetchManager>,
        phase: CancellationToken,
        first_error: Arc<Mutex<Option<SyncError>>>,
    ) {
        // Any worker exit ends the phase, so the remaining workers do not
        // keep waiting on work that can no longer complete.
        let _cancel_on_exit = phase.clone().drop_guard();

        loop {
            if phase.is_cancelled() || manager.is_done() {
                return;
            }
            let (batch, whitelist) = match manager.next_batch() {
                Ok(next) => next,
                Err(err) => {
                    let mut slot = first_error.lock();
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                    return;
                }
            };
            if batch.is_empty() {
                // All remaining hashes are in flight on other workers.
                tokio::select! {
                    _ = tokio::time::sleep(FETCH_BACKOFF) => continue,
                    _ = phase.cancelled() => return,
                }
            }

            let result = tokio::select! {
                _ = phase.cancelled() => {
                    manager.reject_batch(&batch, None);
                    return;
                }
                result = self.request_blocks(&batch, &whitelist) => result,
            };
            match result {
                Ok((blocks, stream)) => manager.accept_result(&batch, blocks, &stream),
                Err(err) => {
                    warn!(%err, "blocks by hashes worker failed");
                    manager.reject_batch(&batch, err.stream());
                }
            }
        }
    }

    /// One hash-listing request. A listing whose length does not match the
    /// requested heights is a contract violation: the stream is evicted on
    /// the spot.
    async fn request_hashes(
        &self,
        heights: &[BlockHeight],
    ) -> Result<(Vec<Hash>, StreamId), ProtocolError> {
        let resp = self
            .protocol
            .get_block_hashes(heights, BLOCK_HASHES_TIMEOUT)
            .await?;
        if resp.hashes.len() != heights.len() {
            warn!(
                stream = %resp.stream,
                got = resp.hashes.len(),
                want = heights.len(),
                "peer returned wrong number of block hashes"
            );
            self.protocol.remove_stream(&resp.stream);
            return Err(ProtocolError::MalformedResponse {
                stream: resp.stream,
                reason: "hash count does not match requested heights".into(),
            });
        }
        Ok((resp.hashes, resp.stream))
    }

    /// One blocks request. A payload that fails positional validation is a
    /// contract violation: the stream is evicted on the spot. Transport
    /// failures evict nothing here; the peer layer decides.
    async fn request_blocks(
        &self,
        hashes: &[Hash],
        whitelist: &[StreamId],
    ) -> Result<(Vec<Block>, StreamId), ProtocolError> {
        let resp = self
            .protocol
            .get_blocks_by_hashes(hashes, whitelist, BLOCKS_BY_HASHES_TIMEOUT)
            .await?;
        match validate_blocks(resp.blocks, hashes) {
            Ok(blocks) => Ok((blocks, resp.stream)),
            Err(reason) => {
                warn!(stream = %resp.stream, %reason, "peer returned bad blocks");
                self.protocol.remove_stream(&resp.stream);
                Err(ProtocolError::MalformedResponse {
                    stream: resp.stream,
                    reason,
                })
            }
        }
    }
}

/// The height window of one cycle: `current + 1 ..= current + window`.
fn prepare_heights(current: BlockHeight) -> Vec<BlockHeight> {
    (1..=NUM_BLOCK_HASHES_PER_REQUEST as u64)
        .map(|offset| BlockHeight(current.0 + offset))
        .collect()
}

/// Check a blocks payload against the batch that requested it: same count,
/// no absent body, and each body hashing to the hash it was requested by.
fn validate_blocks(blocks: Vec<Option<Block>>, hashes: &[Hash]) -> Result<Vec<Block>, String> {
    if blocks.len() != hashes.len() {
        return Err(format!(
            "block count {} does not match requested {}",
            blocks.len(),
            hashes.len()
        ));
    }
    let mut validated = Vec::with_capacity(blocks.len());
    for (block, hash) in blocks.into_iter().zip(hashes) {
        let Some(block) = block else {
            return Err(format!("no block body for {hash}"));
        };
        if block.hash() != *hash {
            return Err(format!(
                "block hash {} does not match requested {hash}",
                block.hash()
            ));
        }
        validated.push(block);
    }
    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{BlockHeader, ShardId};

    fn block(height: u64) -> Block {
        Block {
            header: BlockHeader {
                height: BlockHeight(height),
                parent_hash: Hash::EMPTY,
                state_root: Hash::EMPTY,
                timestamp_ms: 0,
                shard: ShardId(0),
            },
            transactions: vec![],
        }
    }

    #[test]
    fn heights_start_after_current() {
        let heights = prepare_heights(BlockHeight(100));
        assert_eq!(heights.len(), NUM_BLOCK_HASHES_PER_REQUEST);
        assert_eq!(heights[0], BlockHeight(101));
        assert_eq!(heights[19], BlockHeight(120));
    }

    #[test]
    fn validate_accepts_matching_payload() {
        let blocks = vec![block(1), block(2)];
        let hashes: Vec<Hash> = blocks.iter().map(Block::hash).collect();
        let payload = blocks.iter().cloned().map(Some).collect();

        let validated = validate_blocks(payload, &hashes).unwrap();
        assert_eq!(validated, blocks);
    }

    #[test]
    fn validate_rejects_wrong_count() {
        let b = block(1);
        let err = validate_blocks(vec![Some(b.clone())], &[b.hash(), block(2).hash()]);
        assert!(err.is_err());
    }

    #[test]
    fn validate_rejects_absent_body() {
        let b = block(1);
        let err = validate_blocks(vec![None], &[b.hash()]);
        assert!(err.is_err());
    }

    #[test]
    fn validate_rejects_mismatched_hash() {
        let err = validate_blocks(vec![Some(block(1))], &[block(2).hash()]);
        assert!(err.is_err());
    }
}
