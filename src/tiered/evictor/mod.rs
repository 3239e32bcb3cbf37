//! The evict strategies.
//! A strategy picks the blocks of a directory to free a number of bytes.

mod largest;
mod lru;

use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

pub use largest::LargestFirstEvictor;
pub use lru::LruEvictor;
use serde::{Deserialize, Serialize};

use super::dir::StorageDir;
use crate::block::BlockId;
use crate::common::error::StoreError;

/// A committed block that may be evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictCandidate {
    /// The block id
    pub block_id: BlockId,
    /// The block size in bytes
    pub size: u64,
}

/// The evict strategy trait.
pub trait Evictor: Debug + Send + Sync {
    /// Choose blocks of `dir` whose removal frees at least `bytes_to_free`
    /// bytes. Return `None` if the evictable blocks of `dir` are not enough.
    ///
    /// Locked blocks are never chosen.
    fn select_victims(&self, dir: &StorageDir, bytes_to_free: u64) -> Option<Vec<EvictCandidate>>;
}

/// Take candidates in the given order until `bytes_to_free` is covered.
fn take_until_covered(
    candidates: impl IntoIterator<Item = EvictCandidate>,
    bytes_to_free: u64,
) -> Option<Vec<EvictCandidate>> {
    let mut victims = Vec::new();
    let mut freed = 0_u64;
    for candidate in candidates {
        if freed >= bytes_to_free {
            break;
        }
        freed = freed.saturating_add(candidate.size);
        victims.push(candidate);
    }
    (freed >= bytes_to_free).then_some(victims)
}

/// The configured evict strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictStrategy {
    /// Least recently used blocks first
    Lru,
    /// Largest blocks first
    LargestFirst,
}

impl EvictStrategy {
    /// Build the evictor of this strategy.
    #[inline]
    #[must_use]
    pub fn build(self) -> Arc<dyn Evictor> {
        match self {
            Self::Lru => Arc::new(LruEvictor),
            Self::LargestFirst => Arc::new(LargestFirstEvictor),
        }
    }
}

impl FromStr for EvictStrategy {
    type Err = StoreError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "largest" | "largest_first" => Ok(Self::LargestFirst),
            _ => Err(StoreError::argument_invalid(format!(
                "evict strategy {s} is not supported"
            ))),
        }
    }
}
