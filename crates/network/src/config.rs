//! Stream manager configuration.

/// Capacity caps passed through to the stream manager.
///
/// The manager discovers peers until `hi` streams are connected, triggers
/// discovery of `disc_batch` more whenever the count drops below `soft_lo`,
/// and refuses to evict below `hard_lo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCaps {
    /// Discovery is re-triggered below this count.
    pub soft_lo: usize,
    /// Eviction never drops the count below this.
    pub hard_lo: usize,
    /// No new streams are accepted above this count.
    pub hi: usize,
    /// Peers discovered per discovery round.
    pub disc_batch: usize,
}

impl Default for StreamCaps {
    fn default() -> Self {
        Self {
            soft_lo: 8,
            hard_lo: 6,
            hi: 12,
            disc_batch: 8,
        }
    }
}
