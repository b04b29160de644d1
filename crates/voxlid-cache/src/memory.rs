//! In-memory cache with the same contract as the disk store. Backs
//! tests that should not touch durable storage.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use voxlid_features::FeatureTensor;
use voxlid_foundation::error::{CacheError, VoxlidError};

use crate::key::CacheKey;
use crate::{CacheStats, CacheStatsSnapshot, ComputeFn, FeatureCache};

#[derive(Default)]
pub struct MemoryFeatureCache {
    entries: Mutex<HashMap<CacheKey, Vec<FeatureTensor>>>,
    inflight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    stats: CacheStats,
}

impl MemoryFeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Same waiter-aware discipline as the disk store: the in-flight
    /// entry is dropped only by its last holder.
    fn release_gate(&self, key: &CacheKey, gate: &Arc<Mutex<()>>) {
        let mut table = self.inflight.lock();
        let last_holder = match table.get(key) {
            Some(entry) => Arc::ptr_eq(entry, gate) && Arc::strong_count(gate) <= 2,
            None => false,
        };
        if last_holder {
            table.remove(key);
        }
    }
}

impl FeatureCache for MemoryFeatureCache {
    fn get_or_compute(
        &self,
        key: &CacheKey,
        compute: ComputeFn<'_>,
    ) -> Result<Vec<FeatureTensor>, VoxlidError> {
        if let Some(tensors) = self.entries.lock().get(key) {
            self.stats.record_hit();
            return Ok(tensors.clone());
        }

        let gate = {
            let mut table = self.inflight.lock();
            Arc::clone(table.entry(key.clone()).or_default())
        };
        let _guard = gate.lock();

        if let Some(tensors) = self.entries.lock().get(key) {
            let tensors = tensors.clone();
            self.release_gate(key, &gate);
            self.stats.record_hit();
            return Ok(tensors);
        }

        let result = compute();
        let tensors = match result {
            Ok(tensors) => tensors,
            Err(e) => {
                self.release_gate(key, &gate);
                return Err(e);
            }
        };
        self.entries.lock().insert(key.clone(), tensors.clone());
        self.release_gate(key, &gate);
        self.stats.record_miss();
        Ok(tensors)
    }

    fn purge(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn purge_all(&self) -> Result<(), CacheError> {
        self.entries.lock().clear();
        Ok(())
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}
