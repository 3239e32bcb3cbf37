use super::{take_until_covered, EvictCandidate, Evictor};
use crate::tiered::dir::StorageDir;

/// Evicts the largest blocks first, freeing the space with the fewest
/// evictions. Ties keep access order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LargestFirstEvictor;

impl Evictor for LargestFirstEvictor {
    #[inline]
    fn select_victims(&self, dir: &StorageDir, bytes_to_free: u64) -> Option<Vec<EvictCandidate>> {
        let mut candidates = dir.evictable_blocks();
        // Stable sort
        candidates.sort_by(|a, b| b.size.cmp(&a.size));
        take_until_covered(candidates, bytes_to_free)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::LargestFirstEvictor;
    use crate::tiered::dir::StorageDir;
    use crate::tiered::evictor::Evictor;
    use crate::tiered::ufs::LocalUnderFileSystem;

    #[test]
    fn test_largest_victims() {
        let tempdir = tempfile::tempdir().unwrap();
        let dir = StorageDir::new(0, tempdir.path(), 1000, Arc::new(LocalUnderFileSystem));
        for (block_id, size) in [(1_u64, 100_u64), (2, 300), (3, 200), (4, 300)] {
            assert!(dir.request_space(7, size));
            assert!(dir.allocate_temp_block(7, block_id, size));
            assert!(dir.commit_received_block(7, block_id));
        }

        let victims: Vec<_> = LargestFirstEvictor
            .select_victims(&dir, 301)
            .unwrap()
            .iter()
            .map(|c| c.block_id)
            .collect();
        assert_eq!(victims, vec![2, 4]);
        assert!(LargestFirstEvictor.select_victims(&dir, 901).is_none());
    }
}
