//! The tier hierarchy, the composition root of the tiered store.

use std::collections::HashSet;
use std::sync::Arc;

use clippy_utilities::OverflowArithmetic;
use tracing::{error, info};

use super::dir::StorageDir;
use super::tier::StorageTier;
use super::ufs::{LocalUnderFileSystem, UnderFileSystem};
use crate::block::{BlockId, BlockLockManager, UserId};
use crate::common::error::{StoreError, StoreResult};
use crate::config::TieredStoreConfig;

/// The tiers of a worker, fastest first, and the block locks shared by the
/// callers reading and writing their blocks.
#[derive(Debug)]
pub struct TierHierarchy {
    /// The tiers, index is the level
    tiers: Vec<Arc<StorageTier>>,
    /// The per-block locks
    lock_manager: BlockLockManager,
}

impl TierHierarchy {
    /// Build the hierarchy on the local filesystem.
    #[inline]
    pub fn new(config: &TieredStoreConfig) -> StoreResult<Self> {
        Self::with_ufs(config, Arc::new(LocalUnderFileSystem))
    }

    /// Build the hierarchy on the given under filesystem.
    ///
    /// Tiers are built slowest first so that each one can hold the next.
    #[inline]
    pub fn with_ufs(
        config: &TieredStoreConfig,
        ufs: Arc<dyn UnderFileSystem>,
    ) -> StoreResult<Self> {
        if config.tiers.is_empty() {
            return Err(StoreError::argument_invalid("no storage tier is configured"));
        }
        let evictor = config.evict_strategy.build();
        let mut tiers = Vec::with_capacity(config.tiers.len());
        let mut next: Option<Arc<StorageTier>> = None;
        for (level, tier_config) in config.tiers.iter().enumerate().rev() {
            let tier = Arc::new(StorageTier::new(
                level,
                tier_config,
                next.take(),
                Arc::clone(&evictor),
                &ufs,
            ));
            tiers.push(Arc::clone(&tier));
            next = Some(tier);
        }
        tiers.reverse();
        Ok(Self {
            tiers,
            lock_manager: BlockLockManager::new(),
        })
    }

    /// Create the folders of every tier. An error here must abort the worker.
    #[inline]
    pub fn initialize(&self) -> StoreResult<()> {
        for tier in &self.tiers {
            tier.initialize()?;
        }
        info!(
            "Tiered store initialized with {} tiers and {} bytes",
            self.tiers.len(),
            self.total_capacity_bytes()
        );
        Ok(())
    }

    /// Reserve `bytes` for `user_id` in the tier at `level`, see
    /// `StorageTier::request_space`.
    #[inline]
    pub fn request_space(
        &self,
        level: usize,
        user_id: UserId,
        bytes: u64,
        excluded_dir_indices: &HashSet<usize>,
        removed_block_ids: &mut Vec<BlockId>,
    ) -> Option<Arc<StorageDir>> {
        let Some(tier) = self.tiers.get(level) else {
            error!("Cannot request space in tier {level}: not exists");
            return None;
        };
        tier.request_space(user_id, bytes, excluded_dir_indices, removed_block_ids)
    }

    /// The tier at `level`.
    #[inline]
    #[must_use]
    pub fn tier(&self, level: usize) -> Option<&Arc<StorageTier>> {
        self.tiers.get(level)
    }

    /// The tiers, fastest first.
    #[inline]
    #[must_use]
    pub fn tiers(&self) -> &[Arc<StorageTier>] {
        &self.tiers
    }

    /// The per-block locks.
    #[inline]
    #[must_use]
    pub fn lock_manager(&self) -> &BlockLockManager {
        &self.lock_manager
    }

    /// The directory holding the committed block `block_id`, in any tier.
    #[inline]
    #[must_use]
    pub fn get_storage_dir_by_block_id(&self, block_id: BlockId) -> Option<Arc<StorageDir>> {
        self.tiers
            .iter()
            .find_map(|tier| tier.get_storage_dir_by_block_id(block_id))
    }

    /// Release everything `user_id` holds in every directory.
    #[inline]
    pub fn cleanup_user(&self, user_id: UserId) -> StoreResult<()> {
        for tier in &self.tiers {
            for dir in tier.storage_dirs() {
                dir.cleanup_user(user_id)?;
            }
        }
        Ok(())
    }

    /// The capacity of all tiers.
    #[inline]
    #[must_use]
    pub fn total_capacity_bytes(&self) -> u64 {
        self.tiers
            .iter()
            .fold(0, |acc: u64, tier| acc.overflow_add(tier.capacity_bytes()))
    }

    /// The used bytes of all tiers.
    #[inline]
    #[must_use]
    pub fn total_used_bytes(&self) -> u64 {
        self.tiers
            .iter()
            .fold(0, |acc: u64, tier| acc.overflow_add(tier.used_bytes()))
    }
}
