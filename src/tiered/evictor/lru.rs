//! The LRU evict strategy.

use super::{take_until_covered, EvictCandidate, Evictor};
use crate::tiered::dir::StorageDir;

/// Evicts the least recently used blocks first.
#[derive(Debug, Default, Clone, Copy)]
pub struct LruEvictor;

impl Evictor for LruEvictor {
    #[inline]
    fn select_victims(&self, dir: &StorageDir, bytes_to_free: u64) -> Option<Vec<EvictCandidate>> {
        // `evictable_blocks` is already in access order.
        take_until_covered(dir.evictable_blocks(), bytes_to_free)
    }
}
