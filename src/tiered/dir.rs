//! The storage directory, one capacity bounded allocation unit of a tier.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clippy_utilities::OverflowArithmetic;
use hashlink::LinkedHashMap;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::evictor::EvictCandidate;
use super::ufs::UnderFileSystem;
use crate::block::{BlockId, UserId};
use crate::common::error::{Context, StoreError, StoreResult};

/// The folder holding committed block files
const DATA_FOLDER: &str = "data";
/// The folder holding one temp folder per user
const USERS_FOLDER: &str = "users";

/// The accounting state of a `StorageDir`, guarded by its mutex.
///
/// `used_bytes == Σ blocks + Σ user_allocated`, temp blocks only attribute
/// part of a user's allocation to a block id.
#[derive(Debug, Default)]
struct DirState {
    /// Bytes used by committed blocks and reservations
    used_bytes: u64,
    /// Committed blocks and their sizes, least recently used first
    blocks: LinkedHashMap<BlockId, u64>,
    /// User -> temp block -> allocated bytes
    temp_blocks: HashMap<UserId, HashMap<BlockId, u64>>,
    /// User -> bytes reserved and not yet committed or returned
    user_allocated: HashMap<UserId, u64>,
    /// Block -> users reading it, locked blocks are never evicted
    locked_blocks: HashMap<BlockId, HashSet<UserId>>,
    /// Temp blocks whose files are being moved into the data folder
    committing: HashSet<BlockId>,
    /// Committed blocks whose files are being deleted or moved out
    claimed: HashSet<BlockId>,
}

impl DirState {
    /// Bytes reserved by `user_id`.
    fn allocated(&self, user_id: UserId) -> u64 {
        self.user_allocated.get(&user_id).copied().unwrap_or(0)
    }

    /// Bytes of `user_id`'s reservation attributed to temp blocks.
    fn temp_total(&self, user_id: UserId) -> u64 {
        self.temp_blocks
            .get(&user_id)
            .map_or(0, |temps| temps.values().fold(0_u64, |acc, b| acc.overflow_add(*b)))
    }

    /// The allocated bytes of a temp block of `user_id`.
    fn temp_allocated(&self, user_id: UserId, block_id: BlockId) -> Option<u64> {
        self.temp_blocks
            .get(&user_id)
            .and_then(|temps| temps.get(&block_id))
            .copied()
    }

    /// Bytes of `user_id`'s reservation not yet attributed to a temp block.
    fn unattributed(&self, user_id: UserId) -> u64 {
        self.allocated(user_id).saturating_sub(self.temp_total(user_id))
    }

    /// The temp entry of a block, whoever owns it.
    fn temp_owner(&self, block_id: BlockId) -> Option<UserId> {
        self.temp_blocks
            .iter()
            .find(|&(_, temps)| temps.contains_key(&block_id))
            .map(|(user_id, _)| *user_id)
    }

    /// Add `bytes` to the reservation of `user_id`.
    fn reserve(&mut self, user_id: UserId, bytes: u64) {
        self.used_bytes = self.used_bytes.overflow_add(bytes);
        let allocated = self.user_allocated.entry(user_id).or_insert(0);
        *allocated = allocated.overflow_add(bytes);
    }

    /// Take `bytes` out of the reservation of `user_id`.
    fn release(&mut self, user_id: UserId, bytes: u64) {
        let allocated = self.allocated(user_id);
        let released = allocated.min(bytes);
        let left = allocated.overflow_sub(released);
        if left == 0 {
            self.user_allocated.remove(&user_id);
        } else {
            self.user_allocated.insert(user_id, left);
        }
        self.used_bytes = self.used_bytes.overflow_sub(released);
    }

    /// Take a temp entry out of the temp view.
    fn take_temp(&mut self, user_id: UserId, block_id: BlockId) -> Option<u64> {
        let temps = self.temp_blocks.get_mut(&user_id)?;
        let bytes = temps.remove(&block_id)?;
        if temps.is_empty() {
            self.temp_blocks.remove(&user_id);
        }
        Some(bytes)
    }

    /// Put a temp entry into the temp view.
    fn put_temp(&mut self, user_id: UserId, block_id: BlockId, bytes: u64) {
        self.temp_blocks
            .entry(user_id)
            .or_default()
            .insert(block_id, bytes);
    }

    /// Remove a committed block and its bytes.
    fn take_block(&mut self, block_id: BlockId) -> Option<u64> {
        let size = self.blocks.remove(&block_id)?;
        self.used_bytes = self.used_bytes.overflow_sub(size);
        self.locked_blocks.remove(&block_id);
        self.claimed.remove(&block_id);
        Some(size)
    }
}

/// One physical folder of a tier with a fixed capacity.
///
/// Space is first reserved per user with `request_space`, attributed to temp
/// blocks while they are written, and turned into committed blocks by
/// `cache_block`. All accounting goes through one mutex per directory and no
/// file I/O happens while it is held.
#[derive(Debug)]
pub struct StorageDir {
    /// The index of this directory in its tier
    index: usize,
    /// The root folder
    dir_path: PathBuf,
    /// The folder of committed blocks
    data_path: PathBuf,
    /// The folder of per-user temp folders
    users_path: PathBuf,
    /// The capacity in bytes
    capacity_bytes: u64,
    /// The under filesystem the folders live on
    ufs: Arc<dyn UnderFileSystem>,
    /// The accounting state
    state: Mutex<DirState>,
}

impl StorageDir {
    /// Create a `StorageDir` rooted at `dir_path`, nothing is created on disk
    /// before `initialize`.
    #[inline]
    #[must_use]
    pub fn new(
        index: usize,
        dir_path: impl AsRef<Path>,
        capacity_bytes: u64,
        ufs: Arc<dyn UnderFileSystem>,
    ) -> Self {
        let dir_path = dir_path.as_ref().to_path_buf();
        Self {
            index,
            data_path: dir_path.join(DATA_FOLDER),
            users_path: dir_path.join(USERS_FOLDER),
            dir_path,
            capacity_bytes,
            ufs,
            state: Mutex::new(DirState::default()),
        }
    }

    /// Create the data and user folders.
    #[inline]
    pub fn initialize(&self) -> StoreResult<()> {
        self.ufs
            .mkdirs(&self.data_path, true)
            .with_context(|| format!("failed to initialize storage dir {}", self.index))?;
        self.ufs
            .mkdirs(&self.users_path, true)
            .with_context(|| format!("failed to initialize storage dir {}", self.index))?;
        Ok(())
    }

    /// Reserve `bytes` for `user_id` if the directory has that much room.
    /// Nothing changes when it does not.
    #[inline]
    pub fn request_space(&self, user_id: UserId, bytes: u64) -> bool {
        let mut state = self.state.lock();
        let available = self.capacity_bytes.overflow_sub(state.used_bytes);
        if available < bytes {
            debug!(
                "Storage dir {} cannot reserve {bytes} bytes for user {user_id}, {available} bytes available",
                self.dir_path.display()
            );
            return false;
        }
        state.reserve(user_id, bytes);
        true
    }

    /// Return `bytes` of the reservation of `user_id` that are not attributed
    /// to any temp block.
    #[inline]
    pub fn return_space(&self, user_id: UserId, bytes: u64) -> bool {
        let mut state = self.state.lock();
        let unattributed = state.unattributed(user_id);
        if unattributed < bytes {
            error!(
                "Cannot return {bytes} bytes for user {user_id} in {}: only {unattributed} bytes are free to return",
                self.dir_path.display()
            );
            return false;
        }
        state.release(user_id, bytes);
        true
    }

    /// Record a temp block of `bytes` taken from the reservation of `user_id`.
    /// Fail if the block already has an entry here or the reservation is too
    /// small.
    #[inline]
    pub fn allocate_temp_block(&self, user_id: UserId, block_id: BlockId, bytes: u64) -> bool {
        let mut state = self.state.lock();
        if state.blocks.contains_key(&block_id)
            || state.temp_owner(block_id).is_some()
            || state.committing.contains(&block_id)
        {
            error!(
                "Cannot allocate temp block {block_id} in {}: already exists",
                self.dir_path.display()
            );
            return false;
        }
        let unattributed = state.unattributed(user_id);
        if unattributed < bytes {
            error!(
                "Cannot allocate temp block {block_id} with {bytes} bytes for user {user_id}: only {unattributed} bytes reserved"
            );
            return false;
        }
        state.put_temp(user_id, block_id, bytes);
        true
    }

    /// Set the allocated bytes of a temp block to `new_total`, creating the
    /// entry if needed. Growth is taken from the reservation of `user_id`,
    /// shrinking is refused.
    #[inline]
    pub fn update_temp_block_allocated_bytes(
        &self,
        user_id: UserId,
        block_id: BlockId,
        new_total: u64,
    ) -> bool {
        let mut state = self.state.lock();
        if state.committing.contains(&block_id) {
            error!("Cannot update temp block {block_id} of user {user_id}: being committed");
            return false;
        }
        let current = match state.temp_allocated(user_id, block_id) {
            Some(current) => current,
            None => {
                if state.blocks.contains_key(&block_id) || state.temp_owner(block_id).is_some() {
                    error!(
                        "Cannot update temp block {block_id} of user {user_id}: owned by another entry"
                    );
                    return false;
                }
                0
            }
        };
        if new_total < current {
            error!(
                "Cannot shrink temp block {block_id} of user {user_id} from {current} to {new_total} bytes"
            );
            return false;
        }
        let growth = new_total.overflow_sub(current);
        let unattributed = state.unattributed(user_id);
        if unattributed < growth {
            error!(
                "Cannot grow temp block {block_id} of user {user_id} by {growth} bytes: only {unattributed} bytes reserved"
            );
            return false;
        }
        state.put_temp(user_id, block_id, new_total);
        true
    }

    /// Commit the temp block `block_id` of `user_id`.
    ///
    /// The temp file is moved into the data folder and its real length
    /// becomes the block size, unused allocated bytes go back to the free
    /// space. Return `Ok(false)` if there is no such temp block, or if it is
    /// dropped by `cleanup_user` while its file is moved.
    ///
    /// The temp entry is kept until the block is committed.
    #[inline]
    pub fn cache_block(&self, user_id: UserId, block_id: BlockId) -> StoreResult<bool> {
        let allocated = {
            let mut state = self.state.lock();
            let Some(allocated) = state.temp_allocated(user_id, block_id) else {
                error!(
                    "Cannot cache block {block_id} of user {user_id} in {}: no temp block",
                    self.dir_path.display()
                );
                return Ok(false);
            };
            if !state.committing.insert(block_id) {
                warn!("Cannot cache block {block_id} of user {user_id}: already being committed");
                return Ok(false);
            }
            allocated
        };

        let dst = self.block_file_path(block_id);
        let committed = self.commit_file(user_id, block_id, allocated, &dst);

        let mut state = self.state.lock();
        state.committing.remove(&block_id);
        let actual = committed?;
        let Some(allocated) = state.take_temp(user_id, block_id) else {
            drop(state);
            warn!("Temp block {block_id} of user {user_id} was dropped while being committed");
            self.ufs.delete(&dst, false)?;
            return Ok(false);
        };
        state.release(user_id, allocated);
        state.used_bytes = state.used_bytes.overflow_add(actual);
        state.blocks.insert(block_id, actual);
        Ok(true)
    }

    /// Move the temp file of a block to `dst`, return its length.
    fn commit_file(
        &self,
        user_id: UserId,
        block_id: BlockId,
        allocated: u64,
        dst: &Path,
    ) -> StoreResult<u64> {
        let src = self.user_temp_file_path(user_id, block_id);
        let Some(actual) = self.ufs.file_len(&src)? else {
            return Err(StoreError::TempFileNotFound {
                block_id,
                path: src,
                context: vec![],
            });
        };
        if actual > allocated {
            return Err(StoreError::BlockSizeExceeded {
                block_id,
                allocated,
                actual,
                context: vec![],
            });
        }
        self.ufs.rename(&src, dst)?;
        Ok(actual)
    }

    /// Remove a committed block from the accounting, its file is untouched.
    #[inline]
    pub fn remove_block(&self, block_id: BlockId) -> bool {
        let mut state = self.state.lock();
        if state.claimed.contains(&block_id) {
            warn!("Cannot remove block {block_id}: it is being evicted");
            return false;
        }
        if state.take_block(block_id).is_some() {
            true
        } else {
            error!(
                "Cannot remove block {block_id} from {}: not exists",
                self.dir_path.display()
            );
            false
        }
    }

    /// Claim a committed block before deleting or moving its file.
    /// Locked and already claimed blocks cannot be claimed.
    fn claim_block(&self, block_id: BlockId, action: &str) -> Option<u64> {
        let mut state = self.state.lock();
        let Some(size) = state.blocks.get(&block_id).copied() else {
            error!(
                "Cannot {action} block {block_id} from {}: not exists",
                self.dir_path.display()
            );
            return None;
        };
        if state.locked_blocks.contains_key(&block_id) {
            warn!("Cannot {action} block {block_id}: it is locked");
            return None;
        }
        if !state.claimed.insert(block_id) {
            warn!("Cannot {action} block {block_id}: it is being evicted");
            return None;
        }
        Some(size)
    }

    /// Give back a claim taken by `claim_block`.
    fn release_claim(&self, block_id: BlockId) {
        self.state.lock().claimed.remove(&block_id);
    }

    /// Delete a committed block and its file. Locked blocks are kept.
    #[inline]
    pub fn delete_block(&self, block_id: BlockId) -> StoreResult<bool> {
        if self.claim_block(block_id, "delete").is_none() {
            return Ok(false);
        }
        if let Err(e) = self.ufs.delete(&self.block_file_path(block_id), false) {
            self.release_claim(block_id);
            return Err(e);
        }
        Ok(self.state.lock().take_block(block_id).is_some())
    }

    /// Move a committed block into `dst`, which must already hold a
    /// reservation of `user_id` covering the block size.
    ///
    /// Return `Ok(false)` if the block is absent, locked or being evicted, or
    /// if `dst` cannot take it; the block then stays here.
    #[inline]
    pub fn move_block(
        &self,
        block_id: BlockId,
        dst: &StorageDir,
        user_id: UserId,
    ) -> StoreResult<bool> {
        let Some(size) = self.claim_block(block_id, "move") else {
            return Ok(false);
        };
        // The incoming block is a temp block of `user_id` in `dst` until its
        // file has arrived.
        if !dst.allocate_temp_block(user_id, block_id, size) {
            self.release_claim(block_id);
            return Ok(false);
        }

        let src_path = self.block_file_path(block_id);
        let dst_path = dst.block_file_path(block_id);
        if let Err(e) = self.ufs.rename(&src_path, &dst_path) {
            dst.state.lock().take_temp(user_id, block_id);
            self.release_claim(block_id);
            return Err(e);
        }
        if !dst.commit_received_block(user_id, block_id) {
            let restored = self.ufs.rename(&dst_path, &src_path);
            self.release_claim(block_id);
            restored?;
            return Ok(false);
        }
        Ok(self.state.lock().take_block(block_id).is_some())
    }

    /// Turn the temp entry of `block_id` into a committed block of the same
    /// size, its file must already be in the data folder.
    pub(crate) fn commit_received_block(&self, user_id: UserId, block_id: BlockId) -> bool {
        let mut state = self.state.lock();
        let Some(size) = state.take_temp(user_id, block_id) else {
            error!(
                "Cannot receive block {block_id} of user {user_id} in {}: no temp block",
                self.dir_path.display()
            );
            return false;
        };
        state.release(user_id, size);
        state.used_bytes = state.used_bytes.overflow_add(size);
        state.blocks.insert(block_id, size);
        true
    }

    /// Mark a committed block as most recently used.
    #[inline]
    pub fn access_block(&self, block_id: BlockId) -> bool {
        self.state.lock().blocks.to_back(&block_id).is_some()
    }

    /// Lock a committed block for `user_id` so it cannot be evicted.
    /// Fail if the block is absent or already being evicted.
    #[inline]
    pub fn lock_block(&self, block_id: BlockId, user_id: UserId) -> bool {
        let mut state = self.state.lock();
        if !state.blocks.contains_key(&block_id) {
            error!("Cannot lock block {block_id} for user {user_id}: not exists");
            return false;
        }
        if state.claimed.contains(&block_id) {
            warn!("Cannot lock block {block_id} for user {user_id}: it is being evicted");
            return false;
        }
        state
            .locked_blocks
            .entry(block_id)
            .or_default()
            .insert(user_id);
        true
    }

    /// Release the lock `user_id` holds on a block.
    #[inline]
    pub fn unlock_block(&self, block_id: BlockId, user_id: UserId) -> bool {
        let mut state = self.state.lock();
        let Some(users) = state.locked_blocks.get_mut(&block_id) else {
            error!("Cannot unlock block {block_id} for user {user_id}: not locked");
            return false;
        };
        let unlocked = users.remove(&user_id);
        if users.is_empty() {
            state.locked_blocks.remove(&block_id);
        }
        unlocked
    }

    /// Whether any user holds a lock on the block.
    #[inline]
    #[must_use]
    pub fn is_block_locked(&self, block_id: BlockId) -> bool {
        self.state.lock().locked_blocks.contains_key(&block_id)
    }

    /// Drop every temp block, reservation and lock of `user_id`, and delete
    /// its temp folder.
    #[inline]
    pub fn cleanup_user(&self, user_id: UserId) -> StoreResult<()> {
        {
            let mut state = self.state.lock();
            state.temp_blocks.remove(&user_id);
            let allocated = state.allocated(user_id);
            state.release(user_id, allocated);
            state.locked_blocks.retain(|_, users| {
                users.remove(&user_id);
                !users.is_empty()
            });
        }
        self.ufs.delete(&self.user_temp_path(user_id), true)
    }

    /// Committed blocks neither locked nor being evicted, least recently used
    /// first.
    #[inline]
    #[must_use]
    pub fn evictable_blocks(&self) -> Vec<EvictCandidate> {
        let state = self.state.lock();
        state
            .blocks
            .iter()
            .filter(|&(block_id, _)| {
                !state.locked_blocks.contains_key(block_id) && !state.claimed.contains(block_id)
            })
            .map(|(block_id, size)| EvictCandidate {
                block_id: *block_id,
                size: *size,
            })
            .collect()
    }

    /// The index of this directory in its tier.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The root folder.
    #[inline]
    #[must_use]
    pub fn dir_path(&self) -> &Path {
        &self.dir_path
    }

    /// The folder of committed blocks.
    #[inline]
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// The temp folder of `user_id`.
    #[inline]
    #[must_use]
    pub fn user_temp_path(&self, user_id: UserId) -> PathBuf {
        self.users_path.join(user_id.to_string())
    }

    /// The temp file a user writes block `block_id` into.
    #[inline]
    #[must_use]
    pub fn user_temp_file_path(&self, user_id: UserId, block_id: BlockId) -> PathBuf {
        self.user_temp_path(user_id).join(block_id.to_string())
    }

    /// The file of the committed block `block_id`.
    #[inline]
    #[must_use]
    pub fn block_file_path(&self, block_id: BlockId) -> PathBuf {
        self.data_path.join(block_id.to_string())
    }

    /// The capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// The used bytes, committed blocks plus reservations.
    #[inline]
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.state.lock().used_bytes
    }

    /// The free bytes.
    #[inline]
    #[must_use]
    pub fn available_bytes(&self) -> u64 {
        self.capacity_bytes.overflow_sub(self.used_bytes())
    }

    /// Whether a committed block is in this directory.
    #[inline]
    #[must_use]
    pub fn contains_block(&self, block_id: BlockId) -> bool {
        self.state.lock().blocks.contains_key(&block_id)
    }

    /// The size of a committed block.
    #[inline]
    #[must_use]
    pub fn block_size(&self, block_id: BlockId) -> Option<u64> {
        self.state.lock().blocks.get(&block_id).copied()
    }

    /// The ids of committed blocks, least recently used first.
    #[inline]
    #[must_use]
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.state.lock().blocks.keys().copied().collect()
    }

    /// The bytes reserved by `user_id`, including those of its temp blocks.
    #[inline]
    #[must_use]
    pub fn user_allocated_bytes(&self, user_id: UserId) -> u64 {
        self.state.lock().allocated(user_id)
    }

    /// The allocated bytes of a temp block.
    #[inline]
    #[must_use]
    pub fn temp_block_allocated_bytes(&self, user_id: UserId, block_id: BlockId) -> Option<u64> {
        self.state.lock().temp_allocated(user_id, block_id)
    }
}
