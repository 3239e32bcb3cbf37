//! Block identifiers, per-block locks and the local block file handler.

/// The local block file handler.
pub mod handler;
/// The per-block lock object.
pub mod lock;
/// The registry of per-block locks.
pub mod lock_manager;

pub use handler::BlockFileHandler;
pub use lock::BlockLock;
pub use lock_manager::BlockLockManager;

/// The id of a block, unique across the whole tier hierarchy.
pub type BlockId = u64;

/// The id of a user (client session) owning temp blocks and reserved space.
pub type UserId = u64;

/// The user that owns space reserved while evicting blocks into a lower tier.
pub const EVICT_USER_ID: UserId = u64::MAX;
