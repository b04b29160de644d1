//! Content-addressed feature cache.
//!
//! The cache is the only shared mutable state in the pipeline. All
//! access goes through [`FeatureCache::get_or_compute`], which
//! guarantees at-most-one computation per key under concurrency and
//! never exposes a partially written entry.

pub mod disk;
pub mod entry;
pub mod key;
pub mod memory;

use std::sync::atomic::{AtomicU64, Ordering};

use voxlid_features::FeatureTensor;
use voxlid_foundation::error::{CacheError, VoxlidError};

pub use disk::DiskFeatureCache;
pub use key::CacheKey;
pub use memory::MemoryFeatureCache;

pub type ComputeFn<'a> = &'a mut dyn FnMut() -> Result<Vec<FeatureTensor>, VoxlidError>;

/// Persistent (or test-double) store mapping cache keys to the chunk
/// tensors of one recording.
pub trait FeatureCache: Send + Sync {
    /// Return the cached tensors for `key`, computing and storing them
    /// on a miss. Concurrent callers with the same key block on the
    /// first computation instead of recomputing; unrelated keys
    /// proceed in parallel. A corrupt stored entry counts as a miss
    /// and is overwritten.
    fn get_or_compute(
        &self,
        key: &CacheKey,
        compute: ComputeFn<'_>,
    ) -> Result<Vec<FeatureTensor>, VoxlidError>;

    /// Explicit invalidation of one key. Unknown keys are a no-op.
    fn purge(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Drop every entry.
    fn purge_all(&self) -> Result<(), CacheError>;

    fn stats(&self) -> CacheStatsSnapshot;
}

/// Hit/miss counters, shared by both cache implementations.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
}
