//! Queryable sync status.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Inner {
    syncing: bool,
    target: u64,
}

/// Current sync progress, shared between the download loop and status
/// queries.
#[derive(Debug, Default)]
pub struct SyncStatus {
    inner: Mutex<Inner>,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a download as in progress.
    pub fn start_syncing(&self) {
        self.inner.lock().syncing = true;
    }

    /// Publish the height this download is expected to reach.
    pub fn set_target(&self, target: u64) {
        self.inner.lock().target = target;
    }

    /// Mark the download as finished. The last target remains queryable
    /// until the next download starts.
    pub fn finish_syncing(&self) {
        self.inner.lock().syncing = false;
    }

    /// Returns `(in_progress, target_height)`.
    pub fn get(&self) -> (bool, u64) {
        let inner = self.inner.lock();
        (inner.syncing, inner.target)
    }
}
