//! Book-keeping for the block-fetch phase.
//!
//! The manager owns the ordered target hash sequence and tracks, under one
//! lock, which hashes are in flight, which are done, and which streams are
//! still trusted to serve them. Workers pull batches, push results or
//! rejections, and the manager guarantees each hash is dispatched to at most
//! one worker at a time.

use crate::config::{BLOCKS_BY_HASHES_LOWER_CAP, BLOCKS_BY_HASHES_UPPER_CAP};
use crate::error::SyncError;
use meridian_types::{Block, Hash, StreamId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// A fetched block body and the stream that supplied it.
#[derive(Debug, Clone)]
struct BlockRecord {
    block: Block,
    #[allow(dead_code)]
    stream: StreamId,
}

#[derive(Debug)]
struct Inner {
    pending: HashSet<Hash>,
    results: HashMap<Hash, BlockRecord>,
    whitelist: HashSet<StreamId>,
}

/// Shared state of one block-fetch phase.
#[derive(Debug)]
pub(crate) struct BlockFetchManager {
    targets: Vec<Hash>,
    inner: Mutex<Inner>,
}

impl BlockFetchManager {
    pub(crate) fn new(targets: Vec<Hash>, whitelist: HashSet<StreamId>) -> Self {
        Self {
            targets,
            inner: Mutex::new(Inner {
                pending: HashSet::new(),
                results: HashMap::new(),
                whitelist,
            }),
        }
    }

    /// Select the next batch of hashes to fetch and the whitelist snapshot
    /// to fetch it from.
    ///
    /// Selected hashes are marked pending under the same lock, so no two
    /// workers can be handed the same hash. An empty batch means all
    /// remaining work is in flight elsewhere.
    pub(crate) fn next_batch(&self) -> Result<(Vec<Hash>, Vec<StreamId>), SyncError> {
        let mut inner = self.inner.lock();
        if inner.whitelist.is_empty() {
            return Err(SyncError::EmptyWhitelist);
        }

        let size = self.batch_size(inner.whitelist.len());
        let mut batch = Vec::with_capacity(size);
        for hash in &self.targets {
            if batch.len() == size {
                break;
            }
            if !inner.pending.contains(hash) && !inner.results.contains_key(hash) {
                batch.push(*hash);
            }
        }
        for hash in &batch {
            inner.pending.insert(*hash);
        }

        let whitelist = inner.whitelist.iter().cloned().collect();
        Ok((batch, whitelist))
    }

    /// Record a validated batch result.
    pub(crate) fn accept_result(&self, batch: &[Hash], blocks: Vec<Block>, stream: &StreamId) {
        let mut inner = self.inner.lock();
        for (hash, block) in batch.iter().zip(blocks) {
            inner.pending.remove(hash);
            inner.results.insert(
                *hash,
                BlockRecord {
                    block,
                    stream: stream.clone(),
                },
            );
        }
    }

    /// Return a failed batch to the pool and drop the stream that failed it
    /// from the whitelist, when the failure could be attributed to one.
    pub(crate) fn reject_batch(&self, batch: &[Hash], stream: Option<&StreamId>) {
        let mut inner = self.inner.lock();
        if let Some(stream) = stream {
            inner.whitelist.remove(stream);
        }
        for hash in batch {
            inner.pending.remove(hash);
        }
    }

    /// Whether every target hash has a recorded block.
    pub(crate) fn is_done(&self) -> bool {
        let inner = self.inner.lock();
        inner.results.len() == self.targets.len()
    }

    /// Drain the results in target order.
    pub(crate) fn finalize(&self) -> Result<Vec<Block>, SyncError> {
        let mut inner = self.inner.lock();
        let mut blocks = Vec::with_capacity(self.targets.len());
        for hash in &self.targets {
            match inner.results.remove(hash) {
                Some(record) => blocks.push(record.block),
                None => return Err(SyncError::MissingBlock { hash: *hash }),
            }
        }
        Ok(blocks)
    }

    /// Hashes per request: an even split of the targets over the surviving
    /// whitelist, clamped to the configured caps. As the whitelist shrinks,
    /// each remaining stream is asked for more.
    fn batch_size(&self, whitelist_len: usize) -> usize {
        self.targets
            .len()
            .div_ceil(whitelist_len)
            .clamp(BLOCKS_BY_HASHES_LOWER_CAP, BLOCKS_BY_HASHES_UPPER_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{BlockHeader, BlockHeight, ShardId};

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

    fn hashes(n: u8) -> Vec<Hash> {
        (1..=n)
            .map(|tag| {
                let mut raw = [0u8; 32];
                raw[0] = tag;
                Hash::from_raw(raw)
            })
            .collect()
    }

    fn whitelist(names: &[&str]) -> HashSet<StreamId> {
        names.iter().map(|n| StreamId::from(*n)).collect()
    }

    #[test]
    fn batch_size_grows_as_whitelist_shrinks() {
        let manager = BlockFetchManager::new(hashes(20), whitelist(&["a", "b", "c"]));
        // 20 targets over 3 streams rounds up to 7.
        assert_eq!(manager.batch_size(3), 7);
        assert_eq!(manager.batch_size(2), 10);
        // Clamped at the upper cap.
        assert_eq!(manager.batch_size(1), 10);
        // Clamped at the lower cap.
        assert_eq!(manager.batch_size(20), 6);
    }

    #[test]
    fn next_batch_marks_hashes_pending() {
        let targets = hashes(20);
        let manager = BlockFetchManager::new(targets.clone(), whitelist(&["a", "b"]));

        let (first, wl) = manager.next_batch().unwrap();
        assert_eq!(first, targets[..10].to_vec());
        assert_eq!(wl.len(), 2);

        // The second batch must not overlap the first.
        let (second, _) = manager.next_batch().unwrap();
        assert_eq!(second, targets[10..20].to_vec());

        // Everything is in flight now.
        let (third, _) = manager.next_batch().unwrap();
        assert!(third.is_empty());
    }

    #[test]
    fn empty_whitelist_fails_next_batch() {
        let manager = BlockFetchManager::new(hashes(3), HashSet::new());
        assert!(matches!(
            manager.next_batch(),
            Err(SyncError::EmptyWhitelist)
        ));
    }

    #[test]
    fn rejected_batch_is_requeued_without_the_stream() {
        let targets = hashes(6);
        let manager = BlockFetchManager::new(targets.clone(), whitelist(&["a", "b"]));

        let (batch, _) = manager.next_batch().unwrap();
        assert_eq!(batch, targets);
        manager.reject_batch(&batch, Some(&StreamId::from("a")));

        // The same hashes come back, and the whitelist no longer offers "a".
        let (again, wl) = manager.next_batch().unwrap();
        assert_eq!(again, batch);
        assert_eq!(wl, vec![StreamId::from("b")]);
    }

    #[test]
    fn reject_without_stream_keeps_whitelist() {
        let manager = BlockFetchManager::new(hashes(6), whitelist(&["a"]));
        let (batch, _) = manager.next_batch().unwrap();
        manager.reject_batch(&batch, None);

        let (again, wl) = manager.next_batch().unwrap();
        assert_eq!(again, batch);
        assert_eq!(wl, vec![StreamId::from("a")]);
    }

    #[test]
    fn accept_and_finalize_in_target_order() {
        let targets = hashes(6);
        let manager = BlockFetchManager::new(targets.clone(), whitelist(&["a"]));
        assert!(!manager.is_done());

        // Deliver in reverse order; finalize must re-align to target order.
        let (batch, _) = manager.next_batch().unwrap();
        let blocks: Vec<Block> = (1..=6).rev().map(block).collect();
        let reversed: Vec<Hash> = batch.iter().rev().copied().collect();
        manager.accept_result(&reversed, blocks, &StreamId::from("a"));
        assert!(manager.is_done());

        let finalized = manager.finalize().unwrap();
        assert_eq!(finalized.len(), 6);
        for (i, block) in finalized.iter().enumerate() {
            assert_eq!(block.height(), BlockHeight(i as u64 + 1));
        }
    }

    #[test]
    fn finalize_detects_missing_block() {
        let targets = hashes(2);
        let manager = BlockFetchManager::new(targets.clone(), whitelist(&["a"]));
        manager.accept_result(&targets[..1], vec![block(1)], &StreamId::from("a"));

        match manager.finalize() {
            Err(SyncError::MissingBlock { hash }) => assert_eq!(hash, targets[1]),
            other => panic!("expected MissingBlock, got {other:?}"),
        }
    }
}
