//! The storage tier, the directories of one storage medium class.

use std::collections::HashSet;
use std::sync::Arc;

use clippy_utilities::OverflowArithmetic;
use tracing::{debug, error, info, warn};

use super::alias::StorageLevelAlias;
use super::dir::StorageDir;
use super::evictor::{EvictCandidate, Evictor};
use super::ufs::UnderFileSystem;
use crate::block::{BlockId, UserId, EVICT_USER_ID};
use crate::common::error::{Context, StoreResult};
use crate::config::StorageTierConfig;

/// An ordered array of `StorageDir`s sharing one storage medium class.
///
/// When none of its directories has room, a tier evicts blocks of one
/// directory into the next tier, or drops them when the next tier cannot take
/// them or there is no next tier.
#[derive(Debug)]
pub struct StorageTier {
    /// The level of this tier, 0 is the fastest
    level: usize,
    /// The storage medium class
    alias: StorageLevelAlias,
    /// The directories, fixed after construction
    dirs: Vec<Arc<StorageDir>>,
    /// The next, slower tier
    next: Option<Arc<StorageTier>>,
    /// The strategy choosing blocks to evict
    evictor: Arc<dyn Evictor>,
}

impl StorageTier {
    /// Create a tier from its configuration.
    #[inline]
    #[must_use]
    pub fn new(
        level: usize,
        config: &StorageTierConfig,
        next: Option<Arc<StorageTier>>,
        evictor: Arc<dyn Evictor>,
        ufs: &Arc<dyn UnderFileSystem>,
    ) -> Self {
        let dirs = config
            .dirs
            .iter()
            .enumerate()
            .map(|(index, dir)| {
                Arc::new(StorageDir::new(
                    index,
                    &dir.path,
                    dir.capacity_bytes,
                    Arc::clone(ufs),
                ))
            })
            .collect();
        Self {
            level,
            alias: config.alias,
            dirs,
            next,
            evictor,
        }
    }

    /// Create the folders of every directory.
    #[inline]
    pub fn initialize(&self) -> StoreResult<()> {
        for dir in &self.dirs {
            dir.initialize().with_context(|| {
                format!("failed to initialize tier {} ({})", self.level, self.alias)
            })?;
        }
        info!(
            "Tier {} ({}) initialized with {} dirs and {} bytes",
            self.level,
            self.alias,
            self.dirs.len(),
            self.capacity_bytes()
        );
        Ok(())
    }

    /// The directories not excluded, in index order.
    fn eligible_dirs<'a>(
        &'a self,
        excluded_dir_indices: &'a HashSet<usize>,
    ) -> impl Iterator<Item = &'a Arc<StorageDir>> + 'a {
        self.dirs
            .iter()
            .filter(move |dir| !excluded_dir_indices.contains(&dir.index()))
    }

    /// Reserve `bytes` for `user_id` in the first directory with room,
    /// evicting blocks if none has.
    ///
    /// Directories whose index is in `excluded_dir_indices` are never used.
    /// Blocks dropped from the hierarchy while making room are appended to
    /// `removed_block_ids`, even if the request fails in the end.
    #[inline]
    pub fn request_space(
        &self,
        user_id: UserId,
        bytes: u64,
        excluded_dir_indices: &HashSet<usize>,
        removed_block_ids: &mut Vec<BlockId>,
    ) -> Option<Arc<StorageDir>> {
        for dir in self.eligible_dirs(excluded_dir_indices) {
            if dir.request_space(user_id, bytes) {
                return Some(Arc::clone(dir));
            }
        }

        for dir in self.eligible_dirs(excluded_dir_indices) {
            if self.evict_for(dir, user_id, bytes, removed_block_ids) {
                return Some(Arc::clone(dir));
            }
        }

        warn!(
            "Tier {} ({}) cannot provide {bytes} bytes for user {user_id}",
            self.level, self.alias
        );
        None
    }

    /// Reserve `bytes` for `user_id` in `dir` only, evicting blocks of `dir`
    /// if needed.
    ///
    /// Fail if `dir` is not a directory of this tier or its index is in
    /// `excluded_dir_indices`.
    #[inline]
    pub fn request_space_in_dir(
        &self,
        dir: &Arc<StorageDir>,
        user_id: UserId,
        bytes: u64,
        excluded_dir_indices: &HashSet<usize>,
        removed_block_ids: &mut Vec<BlockId>,
    ) -> bool {
        let owned = self
            .dirs
            .get(dir.index())
            .map_or(false, |own| Arc::ptr_eq(own, dir));
        if !owned {
            error!(
                "Storage dir {} does not belong to tier {}",
                dir.dir_path().display(),
                self.level
            );
            return false;
        }
        if excluded_dir_indices.contains(&dir.index()) {
            error!(
                "Storage dir {} of tier {} is both pinned and excluded",
                dir.index(),
                self.level
            );
            return false;
        }
        if dir.request_space(user_id, bytes) {
            return true;
        }
        self.evict_for(dir, user_id, bytes, removed_block_ids)
    }

    /// Evict blocks of `dir` until it can reserve `bytes`, then reserve them.
    fn evict_for(
        &self,
        dir: &StorageDir,
        user_id: UserId,
        bytes: u64,
        removed_block_ids: &mut Vec<BlockId>,
    ) -> bool {
        if bytes > dir.capacity_bytes() {
            return false;
        }
        let bytes_to_free = bytes.saturating_sub(dir.available_bytes());
        let Some(victims) = self.evictor.select_victims(dir, bytes_to_free) else {
            debug!(
                "Storage dir {} of tier {} cannot free {bytes_to_free} bytes",
                dir.index(),
                self.level
            );
            return false;
        };
        self.free_space(dir, &victims, removed_block_ids);
        dir.request_space(user_id, bytes)
    }

    /// Move each victim into the next tier, or drop it.
    ///
    /// Nothing is rolled back: victims already gone stay gone whatever
    /// happens to the following ones.
    fn free_space(
        &self,
        dir: &StorageDir,
        victims: &[EvictCandidate],
        removed_block_ids: &mut Vec<BlockId>,
    ) {
        for victim in victims {
            if let Some(ref next) = self.next {
                let dst = next.request_space(
                    EVICT_USER_ID,
                    victim.size,
                    &HashSet::new(),
                    removed_block_ids,
                );
                if let Some(dst) = dst {
                    match dir.move_block(victim.block_id, &dst, EVICT_USER_ID) {
                        Ok(true) => {
                            debug!(
                                "Block {} moved from tier {} to tier {}",
                                victim.block_id,
                                self.level,
                                next.level
                            );
                        }
                        Ok(false) => {
                            dst.return_space(EVICT_USER_ID, victim.size);
                        }
                        Err(e) => {
                            dst.return_space(EVICT_USER_ID, victim.size);
                            error!("Failed to move block {}, error is {e}", victim.block_id);
                        }
                    }
                    continue;
                }
                warn!(
                    "Tier {} has no room for block {}, dropping it",
                    next.level, victim.block_id
                );
            }
            match dir.delete_block(victim.block_id) {
                Ok(true) => {
                    debug!("Block {} dropped from tier {}", victim.block_id, self.level);
                    removed_block_ids.push(victim.block_id);
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to delete block {}, error is {e}", victim.block_id);
                }
            }
        }
    }

    /// The directory holding the committed block `block_id`.
    #[inline]
    #[must_use]
    pub fn get_storage_dir_by_block_id(&self, block_id: BlockId) -> Option<Arc<StorageDir>> {
        self.dirs
            .iter()
            .find(|dir| dir.contains_block(block_id))
            .map(Arc::clone)
    }

    /// The directory at `index`.
    #[inline]
    #[must_use]
    pub fn get_storage_dir_by_index(&self, index: usize) -> Option<Arc<StorageDir>> {
        self.dirs.get(index).map(Arc::clone)
    }

    /// The directories in index order.
    #[inline]
    #[must_use]
    pub fn storage_dirs(&self) -> &[Arc<StorageDir>] {
        &self.dirs
    }

    /// Whether no tier follows this one.
    #[inline]
    #[must_use]
    pub fn is_last_tier(&self) -> bool {
        self.next.is_none()
    }

    /// The next, slower tier.
    #[inline]
    #[must_use]
    pub fn next_tier(&self) -> Option<&Arc<StorageTier>> {
        self.next.as_ref()
    }

    /// Whether a committed block is in any directory of this tier.
    #[inline]
    #[must_use]
    pub fn contains_block(&self, block_id: BlockId) -> bool {
        self.dirs.iter().any(|dir| dir.contains_block(block_id))
    }

    /// The level, 0 is the fastest.
    #[inline]
    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    /// The storage medium class.
    #[inline]
    #[must_use]
    pub fn alias(&self) -> StorageLevelAlias {
        self.alias
    }

    /// The used bytes over all directories.
    #[inline]
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.dirs
            .iter()
            .fold(0, |acc: u64, dir| acc.overflow_add(dir.used_bytes()))
    }

    /// The capacity over all directories.
    #[inline]
    #[must_use]
    pub fn capacity_bytes(&self) -> u64 {
        self.dirs
            .iter()
            .fold(0, |acc: u64, dir| acc.overflow_add(dir.capacity_bytes()))
    }

    /// The free bytes over all directories.
    #[inline]
    #[must_use]
    pub fn available_bytes(&self) -> u64 {
        self.dirs
            .iter()
            .fold(0, |acc: u64, dir| acc.overflow_add(dir.available_bytes()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::StorageTier;
    use crate::config::{StorageDirConfig, StorageTierConfig};
    use crate::tiered::alias::StorageLevelAlias;
    use crate::tiered::evictor::LruEvictor;
    use crate::tiered::ufs::{LocalUnderFileSystem, UnderFileSystem};

    fn create_tier(capacities: &[u64]) -> (tempfile::TempDir, StorageTier) {
        let tempdir = tempfile::tempdir().unwrap();
        let config = StorageTierConfig {
            alias: StorageLevelAlias::SSD,
            dirs: capacities
                .iter()
                .enumerate()
                .map(|(i, &capacity_bytes)| StorageDirConfig {
                    path: tempdir.path().join(format!("ssd{i}")),
                    capacity_bytes,
                })
                .collect(),
        };
        let ufs: Arc<dyn UnderFileSystem> = Arc::new(LocalUnderFileSystem);
        let tier = StorageTier::new(0, &config, None, Arc::new(LruEvictor), &ufs);
        tier.initialize().unwrap();
        (tempdir, tier)
    }

    #[test]
    fn test_select_in_index_order() {
        let (_tempdir, tier) = create_tier(&[100, 200, 300]);
        let mut removed = Vec::new();
        let none = HashSet::new();

        let dir = tier.request_space(1, 80, &none, &mut removed).unwrap();
        assert_eq!(dir.index(), 0);
        // 20 bytes left in dir 0.
        let dir = tier.request_space(1, 50, &none, &mut removed).unwrap();
        assert_eq!(dir.index(), 1);
        let dir = tier.request_space(1, 20, &none, &mut removed).unwrap();
        assert_eq!(dir.index(), 0);

        let excluded: HashSet<usize> = [1].into_iter().collect();
        let dir = tier.request_space(1, 100, &excluded, &mut removed).unwrap();
        assert_eq!(dir.index(), 2);
        assert_eq!(tier.used_bytes(), 250);
        assert_eq!(tier.capacity_bytes(), 600);
        assert_eq!(tier.available_bytes(), 350);
        assert!(removed.is_empty());
    }

    #[test]
    fn test_exhausted_leaves_accounting() {
        let (_tempdir, tier) = create_tier(&[100, 100]);
        let mut removed = Vec::new();
        let none = HashSet::new();
        assert!(tier.request_space(1, 60, &none, &mut removed).is_some());
        assert!(tier.request_space(1, 60, &none, &mut removed).is_some());
        // Only reservations, nothing can be evicted.
        assert!(tier.request_space(1, 41, &none, &mut removed).is_none());
        assert!(tier.request_space(1, 101, &none, &mut removed).is_none());
        assert_eq!(tier.used_bytes(), 120);
        assert!(removed.is_empty());
    }

    #[test]
    fn test_lookup_by_index() {
        let (_tempdir, tier) = create_tier(&[100, 100]);
        let dir = tier.get_storage_dir_by_index(1).unwrap();
        assert!(Arc::ptr_eq(&dir, &tier.storage_dirs()[1]));
        assert!(tier.get_storage_dir_by_index(2).is_none());
        assert!(tier.get_storage_dir_by_block_id(1).is_none());
        assert!(tier.is_last_tier());
        assert!(tier.next_tier().is_none());
        assert_eq!(tier.alias(), StorageLevelAlias::SSD);
        assert_eq!(tier.level(), 0);
    }

    #[test]
    fn test_pinned_dir_checks() {
        let (_tempdir, tier) = create_tier(&[100, 100]);
        let (_other_tempdir, other) = create_tier(&[100]);
        let mut removed = Vec::new();
        let dir = tier.get_storage_dir_by_index(1).unwrap();
        let excluded: HashSet<usize> = [1].into_iter().collect();

        assert!(!tier.request_space_in_dir(&dir, 1, 10, &excluded, &mut removed));
        let foreign = other.get_storage_dir_by_index(0).unwrap();
        assert!(!tier.request_space_in_dir(&foreign, 1, 10, &HashSet::new(), &mut removed));
        assert!(tier.request_space_in_dir(&dir, 1, 10, &HashSet::new(), &mut removed));
        assert_eq!(dir.used_bytes(), 10);
    }
}
