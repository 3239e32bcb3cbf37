//! The tiered block store.
//!
//! A `TierHierarchy` holds `StorageTier`s from fastest to slowest, each tier
//! holds `StorageDir`s. Space requests that do not fit evict blocks down the
//! hierarchy.

/// The storage medium classes.
pub mod alias;
/// The storage directory.
pub mod dir;
/// The evict strategies.
pub mod evictor;
/// The tier hierarchy.
pub mod hierarchy;
/// The storage tier.
pub mod tier;
/// The under filesystem.
pub mod ufs;


pub use alias::StorageLevelAlias;
pub use dir::StorageDir;
pub use evictor::{EvictCandidate, EvictStrategy, Evictor, LargestFirstEvictor, LruEvictor};
pub use hierarchy::TierHierarchy;
pub use tier::StorageTier;
pub use ufs::{LocalUnderFileSystem, UnderFileSystem};
