//! The per-shard downloader.
//!
//! Owns the outer sync loop: wait for enough peers, then run short-range
//! cycles on a ticker and on demand, retrying after failures. Each cycle
//! advances the local chain by at most one block window.

use crate::chain::{ChainView, InsertHelper};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::short_range::ShortRangeHelper;
use crate::status::SyncStatus;
use meridian_network::SyncProtocol;
use meridian_types::{Hash, StreamId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Interval of the periodic sync trigger.
const TRIGGER_INTERVAL: Duration = Duration::from_secs(10);

/// Interval of the boot loop's stream-count re-check.
const BOOT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Back-off before re-triggering after a failed cycle.
const RETRY_DELAY: Duration = Duration::from_secs(5);

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Downloader for the sync task of one shard.
pub struct Downloader {
    chain: Arc<dyn ChainView>,
    insert: Arc<dyn InsertHelper>,
    protocol: Arc<dyn SyncProtocol>,
    config: SyncConfig,
    status: SyncStatus,

    download_tx: mpsc::Sender<()>,
    download_rx: Mutex<Option<mpsc::Receiver<()>>>,
    shutdown: CancellationToken,

    started: broadcast::Sender<()>,
    finished: broadcast::Sender<()>,
}

impl Downloader {
    pub fn new(
        chain: Arc<dyn ChainView>,
        insert: Arc<dyn InsertHelper>,
        protocol: Arc<dyn SyncProtocol>,
        config: SyncConfig,
    ) -> Self {
        let config = config.sanitize();
        let (download_tx, download_rx) = mpsc::channel(1);
        let (started, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (finished, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            chain,
            insert,
            protocol,
            config,
            status: SyncStatus::new(),
            download_tx,
            download_rx: Mutex::new(Some(download_rx)),
            shutdown: CancellationToken::new(),
            started,
            finished,
        }
    }

    /// Run the boot wait and the sync loop until [`close`](Self::close) is
    /// called. Returns immediately in server-only mode and on a second
    /// call. Intended to be spawned by the caller:
    ///
    /// ```ignore
    /// let downloader = Arc::new(Downloader::new(chain, insert, protocol, config));
    /// let runner = Arc::clone(&downloader);
    /// tokio::spawn(async move { runner.run().await });
    /// ```
    pub async fn run(&self) {
        if self.config.server_only {
            return;
        }
        let Some(download_rx) = self.download_rx.lock().take() else {
            return;
        };
        if self.wait_for_boot().await {
            self.run_loop(download_rx).await;
        }
    }

    /// Stop the loop and cancel any in-flight cycle.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Ask the loop to run a cycle soon. Non-blocking: when a trigger is
    /// already queued this one is dropped.
    pub fn trigger_sync(&self) {
        let _ = self.download_tx.try_send(());
    }

    /// Number of currently connected peer streams.
    pub fn num_peers(&self) -> usize {
        self.protocol.num_streams()
    }

    /// Returns `(in_progress, target_height)`. When idle, the target is
    /// the current local height.
    pub fn sync_status(&self) -> (bool, u64) {
        let (syncing, target) = self.status.get();
        if syncing {
            (true, target)
        } else {
            (false, self.chain.current_height().0)
        }
    }

    /// Fires `()` whenever a download starts.
    pub fn subscribe_download_started(&self) -> broadcast::Receiver<()> {
        self.started.subscribe()
    }

    /// Fires `()` whenever a download finishes.
    pub fn subscribe_download_finished(&self) -> broadcast::Receiver<()> {
        self.finished.subscribe()
    }

    /// Run one short-range sync cycle.
    ///
    /// Returns the number of blocks inserted. `Ok(0)` means the peers hold
    /// nothing past the local tip.
    pub async fn sync_once(&self) -> Result<usize, SyncError> {
        let helper = ShortRangeHelper::new(
            Arc::clone(&self.protocol),
            self.config.concurrency,
            self.shutdown.child_token(),
        );
        helper.check_prerequisites()?;

        let current = self.chain.current_height();
        let (chain, whitelist) = helper.get_hash_chain(current).await?;
        if chain.is_empty() {
            return Ok(0);
        }

        self.start_syncing(current.0 + chain.len() as u64 - 1);
        let result = self.fetch_and_insert(&helper, &chain, &whitelist).await;
        self.finish_syncing();
        result
    }

    async fn fetch_and_insert(
        &self,
        helper: &ShortRangeHelper,
        chain: &[Hash],
        whitelist: &HashSet<StreamId>,
    ) -> Result<usize, SyncError> {
        let blocks = match helper.get_blocks_by_hashes(chain, whitelist.clone()).await {
            Ok(blocks) => blocks,
            Err(err) => {
                if !err.is_canceled() {
                    // These peers promised the hashes and could not serve them.
                    helper.remove_streams(whitelist);
                }
                return Err(err);
            }
        };

        match self.insert.verify_and_insert_blocks(&blocks) {
            Ok(_) => Ok(blocks.len()),
            Err(err) => {
                if !err.is_sig_verify() {
                    // The supplied data is corrupt.
                    helper.remove_streams(whitelist);
                }
                Err(SyncError::Insert(err))
            }
        }
    }

    /// Wait until the stream manager has discovered `init_streams` peers.
    /// Returns `false` when shut down while waiting.
    async fn wait_for_boot(&self) -> bool {
        let mut added = self.protocol.subscribe_stream_added();
        let mut events_open = true;
        let mut check = interval(BOOT_CHECK_INTERVAL);
        check.tick().await;

        loop {
            if self.protocol.num_streams() >= self.config.init_streams {
                return true;
            }
            info!(
                streams = self.protocol.num_streams(),
                required = self.config.init_streams,
                shard = %self.config.shard,
                "waiting for initial bootstrap discovery"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = check.tick() => {}
                event = added.recv(), if events_open => {
                    if let Err(broadcast::error::RecvError::Closed) = event {
                        events_open = false;
                    }
                }
            }
        }
    }

    async fn run_loop(&self, mut download_rx: mpsc::Receiver<()>) {
        // The first tick fires immediately and kicks off the initial cycle.
        let mut ticker = interval(TRIGGER_INTERVAL);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => self.trigger_sync(),
                Some(()) = download_rx.recv() => {
                    match self.sync_once().await {
                        Ok(added) => {
                            info!(
                                blocks_added = added,
                                height = self.chain.current_height().0,
                                shard = %self.config.shard,
                                "sync finished"
                            );
                            if added != 0 {
                                // The tip moved; more may be right behind it.
                                self.trigger_sync();
                            }
                        }
                        Err(err) if err.is_canceled() => return,
                        Err(err) => {
                            warn!(%err, shard = %self.config.shard, "failed to download");
                            self.retry_later();
                        }
                    }
                }
            }
        }
    }

    fn retry_later(&self) {
        let tx = self.download_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = sleep(RETRY_DELAY) => {
                    let _ = tx.try_send(());
                }
            }
        });
    }

    fn start_syncing(&self, target: u64) {
        self.status.start_syncing();
        self.status.set_target(target);
        let _ = self.started.send(());
    }

    fn finish_syncing(&self) {
        self.status.finish_syncing();
        let _ = self.finished.send(());
    }
}
