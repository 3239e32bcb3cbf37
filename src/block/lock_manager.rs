//! The registry of per-block locks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use super::lock::BlockLock;
use super::BlockId;

/// Owns the existence of every block lock.
///
/// Locks are created and removed explicitly. The manager never acquires the
/// locks it hands out, callers take and release guards on the returned handle.
#[derive(Debug, Default)]
pub struct BlockLockManager {
    /// A map from a block ID to its lock
    locks: Mutex<HashMap<BlockId, Arc<BlockLock>>>,
}

impl BlockLockManager {
    /// Create an empty `BlockLockManager`.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the lock of `block_id`.
    /// Return false if the lock already exists, the existing lock is untouched.
    #[inline]
    pub fn add_lock(&self, block_id: BlockId) -> bool {
        let mut locks = self.locks.lock();
        if locks.contains_key(&block_id) {
            error!("Cannot add lock for block {block_id}: already exists");
            return false;
        }
        locks.insert(block_id, Arc::new(BlockLock::new(block_id)));
        true
    }

    /// Get the lock of `block_id`, never creates one.
    #[inline]
    pub fn get_lock(&self, block_id: BlockId) -> Option<Arc<BlockLock>> {
        let locks = self.locks.lock();
        if let Some(lock) = locks.get(&block_id) {
            Some(Arc::clone(lock))
        } else {
            error!("Cannot get lock for block {block_id}: not exists");
            None
        }
    }

    /// Remove the lock of `block_id`.
    /// Return false if there is no such lock.
    ///
    /// The lock must not be held by anyone when it is removed.
    #[inline]
    pub fn remove_lock(&self, block_id: BlockId) -> bool {
        let removed = self.locks.lock().remove(&block_id);
        match removed {
            Some(lock) => {
                let holders = Arc::strong_count(&lock).saturating_sub(1);
                if holders > 0 {
                    debug!("Removed lock for block {block_id} while {holders} handles are alive");
                }
                true
            }
            None => {
                error!("Cannot remove lock for block {block_id}: not exists");
                false
            }
        }
    }

    /// The number of existing locks.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no lock exists.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
