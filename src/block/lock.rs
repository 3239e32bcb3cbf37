use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::BlockId;

/// The read guard of a `BlockLock`, the lock is released when it is dropped.
pub type BlockReadGuard<'a> = RwLockReadGuard<'a, ()>;

/// The write guard of a `BlockLock`, the lock is released when it is dropped.
pub type BlockWriteGuard<'a> = RwLockWriteGuard<'a, ()>;

/// The read/write lock of a single block.
///
/// Readers of the block bytes take a shared guard, writers an exclusive one.
/// Whether the lock exists at all is decided by `BlockLockManager`.
#[derive(Debug)]
pub struct BlockLock {
    /// The block this lock protects
    block_id: BlockId,
    /// The inner lock
    inner: RwLock<()>,
}

impl BlockLock {
    /// Create a new unlocked `BlockLock` for `block_id`.
    #[inline]
    #[must_use]
    pub fn new(block_id: BlockId) -> Self {
        Self {
            block_id,
            inner: RwLock::new(()),
        }
    }

    /// The block this lock protects.
    #[inline]
    #[must_use]
    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// Acquire a shared guard, blocking until no writer holds the lock.
    #[inline]
    pub fn read(&self) -> BlockReadGuard<'_> {
        self.inner.read()
    }

    /// Acquire an exclusive guard, blocking until the lock is free.
    #[inline]
    pub fn write(&self) -> BlockWriteGuard<'_> {
        self.inner.write()
    }

    /// Try to acquire a shared guard without blocking.
    #[inline]
    pub fn try_read(&self) -> Option<BlockReadGuard<'_>> {
        self.inner.try_read()
    }

    /// Try to acquire an exclusive guard without blocking.
    #[inline]
    pub fn try_write(&self) -> Option<BlockWriteGuard<'_>> {
        self.inner.try_write()
    }

    /// Whether any guard is currently held.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}
