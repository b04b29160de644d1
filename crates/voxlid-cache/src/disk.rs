//! Durable cache rooted at a directory, one file per key.
//!
//! Entries live at `<root>/<key[..2]>/<key>.vlf`. Writes go to a
//! temporary file in the destination directory and are renamed into
//! place, so a crash mid-write leaves no observable entry. A per-key
//! in-flight table serializes concurrent computation of one key while
//! leaving unrelated keys fully parallel.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use voxlid_features::FeatureTensor;
use voxlid_foundation::error::{CacheError, VoxlidError};

use crate::entry;
use crate::key::CacheKey;
use crate::{CacheStats, CacheStatsSnapshot, ComputeFn, FeatureCache};

pub struct DiskFeatureCache {
    root: PathBuf,
    inflight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    stats: CacheStats,
}

impl DiskFeatureCache {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| CacheError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            inflight: Mutex::new(HashMap::new()),
            stats: CacheStats::default(),
        })
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(&key.as_str()[..2])
            .join(format!("{}.vlf", key))
    }

    /// Read an entry if present and intact. A corrupt entry is logged
    /// and reported as a miss so the caller recomputes and overwrites
    /// it; only real I/O failures are errors.
    fn read_valid(&self, key: &CacheKey) -> Result<Option<Vec<FeatureTensor>>, CacheError> {
        let path = self.entry_path(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        match entry::decode(&bytes) {
            Ok(tensors) => Ok(Some(tensors)),
            Err(detail) => {
                tracing::warn!(%key, %detail, "corrupt cache entry, recomputing");
                Ok(None)
            }
        }
    }

    fn publish(&self, key: &CacheKey, tensors: &[FeatureTensor]) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        let dir = path.parent().expect("entry path always has a parent");
        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(&io_err)?;
        // Temp file in the destination directory so the final rename
        // stays on one filesystem and is atomic.
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(&io_err)?;
        tmp.write_all(&entry::encode(tensors)).map_err(&io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn gate_for(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut table = self.inflight.lock();
        Arc::clone(table.entry(key.clone()).or_default())
    }

    /// Drop the in-flight entry only once no other thread still holds
    /// this gate. Earlier-arriving waiters keep serializing on it, so
    /// a failed computation cannot let a retry and a newcomer run
    /// concurrently for the same key.
    fn release_gate(&self, key: &CacheKey, gate: &Arc<Mutex<()>>) {
        let mut table = self.inflight.lock();
        // Holders are the table entry plus us; clones are only taken
        // under the table lock, so the count cannot grow here.
        let last_holder = match table.get(key) {
            Some(entry) => Arc::ptr_eq(entry, gate) && Arc::strong_count(gate) <= 2,
            None => false,
        };
        if last_holder {
            table.remove(key);
        }
    }
}

impl FeatureCache for DiskFeatureCache {
    fn get_or_compute(
        &self,
        key: &CacheKey,
        compute: ComputeFn<'_>,
    ) -> Result<Vec<FeatureTensor>, VoxlidError> {
        if let Some(tensors) = self.read_valid(key)? {
            self.stats.record_hit();
            return Ok(tensors);
        }

        let gate = self.gate_for(key);
        let _guard = gate.lock();

        // Another caller may have published while we waited.
        if let Some(tensors) = self.read_valid(key)? {
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
        if let Err(e) = self.publish(key, &tensors) {
            self.release_gate(key, &gate);
            return Err(e.into());
        }
        self.release_gate(key, &gate);
        self.stats.record_miss();
        tracing::debug!(%key, tensors = tensors.len(), "cache entry computed and published");
        Ok(tensors)
    }

    fn purge(&self, key: &CacheKey) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    fn purge_all(&self) -> Result<(), CacheError> {
        std::fs::remove_dir_all(&self.root).map_err(|source| CacheError::Io {
            path: self.root.clone(),
            source,
        })?;
        std::fs::create_dir_all(&self.root).map_err(|source| CacheError::Io {
            path: self.root.clone(),
            source,
        })
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tensor(seed: f32) -> FeatureTensor {
        let mut t = FeatureTensor::new(4);
        for f in 0..6 {
            let row: Vec<f32> = (0..4).map(|b| seed + f as f32 + b as f32 * 0.25).collect();
            t.push_frame(&row);
        }
        t
    }

    fn key(n: u32) -> CacheKey {
        CacheKey::derive(&format!("rec{}", n), "fp")
    }

    #[test]
    fn miss_then_hit_computes_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::open(dir.path()).unwrap();
        let calls = AtomicUsize::new(0);
        let k = key(1);

        for _ in 0..3 {
            let got = cache
                .get_or_compute(&k, &mut || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![tensor(1.0)])
                })
                .unwrap();
            assert_eq!(got, vec![tensor(1.0)]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }

    #[test]
    fn concurrent_same_key_computes_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::open(dir.path()).unwrap();
        let calls = AtomicUsize::new(0);
        let k = key(2);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let got = cache
                        .get_or_compute(&k, &mut || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            // Widen the race window.
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(vec![tensor(2.0)])
                        })
                        .unwrap();
                    assert_eq!(got, vec![tensor(2.0)]);
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_keys_do_not_block_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::open(dir.path()).unwrap();

        std::thread::scope(|scope| {
            for n in 0..4u32 {
                let cache = &cache;
                scope.spawn(move || {
                    let k = key(10 + n);
                    let got = cache
                        .get_or_compute(&k, &mut || Ok(vec![tensor(n as f32)]))
                        .unwrap();
                    assert_eq!(got, vec![tensor(n as f32)]);
                });
            }
        });
        assert_eq!(cache.stats().misses, 4);
    }

    #[test]
    fn round_trip_equals_direct_computation() {
        let dir = tempfile::tempdir().unwrap();
        let k = key(3);
        let direct = vec![tensor(3.0), tensor(-1.0)];

        {
            let cache = DiskFeatureCache::open(dir.path()).unwrap();
            cache
                .get_or_compute(&k, &mut || Ok(direct.clone()))
                .unwrap();
        }
        // Fresh handle, as a later experiment run would open.
        let cache = DiskFeatureCache::open(dir.path()).unwrap();
        let got = cache
            .get_or_compute(&k, &mut || panic!("must not recompute"))
            .unwrap();
        assert_eq!(got, direct);
    }

    #[test]
    fn corrupt_entry_is_recomputed_and_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::open(dir.path()).unwrap();
        let k = key(4);
        cache
            .get_or_compute(&k, &mut || Ok(vec![tensor(4.0)]))
            .unwrap();

        // Flip a payload byte in place.
        let path = cache.entry_path(&k);
        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let calls = AtomicUsize::new(0);
        let got = cache
            .get_or_compute(&k, &mut || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![tensor(4.0)])
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(got, vec![tensor(4.0)]);

        // The overwrite is durable.
        let again = cache
            .get_or_compute(&k, &mut || panic!("must not recompute"))
            .unwrap();
        assert_eq!(again, vec![tensor(4.0)]);
    }

    #[test]
    fn purge_invalidates_one_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::open(dir.path()).unwrap();
        let k = key(5);
        cache
            .get_or_compute(&k, &mut || Ok(vec![tensor(5.0)]))
            .unwrap();
        cache.purge(&k).unwrap();

        let calls = AtomicUsize::new(0);
        cache
            .get_or_compute(&k, &mut || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![tensor(5.0)])
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Purging an unknown key is fine.
        cache.purge(&key(999)).unwrap();
    }

    #[test]
    fn purge_all_clears_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::open(dir.path()).unwrap();
        for n in 0..3 {
            cache
                .get_or_compute(&key(n), &mut || Ok(vec![tensor(n as f32)]))
                .unwrap();
        }
        cache.purge_all().unwrap();

        let calls = AtomicUsize::new(0);
        for n in 0..3 {
            cache
                .get_or_compute(&key(n), &mut || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![tensor(n as f32)])
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_computation_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::open(dir.path()).unwrap();
        let k = key(6);

        let err = cache.get_or_compute(&k, &mut || {
            Err(voxlid_foundation::error::FeatureError::Degenerate("nan".into()).into())
        });
        assert!(err.is_err());

        // The key is still computable afterwards.
        let got = cache
            .get_or_compute(&k, &mut || Ok(vec![tensor(6.0)]))
            .unwrap();
        assert_eq!(got, vec![tensor(6.0)]);
    }

    #[test]
    fn failed_compute_keeps_same_key_work_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::open(dir.path()).unwrap();
        let k = key(8);
        let in_flight = AtomicUsize::new(0);
        let overlaps = AtomicUsize::new(0);

        let attempt = |start_delay_ms: u64| {
            std::thread::sleep(std::time::Duration::from_millis(start_delay_ms));
            let _ = cache.get_or_compute(&k, &mut || {
                if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(std::time::Duration::from_millis(30));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Err(voxlid_foundation::error::FeatureError::Degenerate("nan".into()).into())
            });
        };

        // Two immediate callers serialize on one gate; the late caller
        // arrives while the first retry runs after the initial failure
        // and must join the same queue rather than compute in parallel.
        std::thread::scope(|scope| {
            scope.spawn(|| attempt(0));
            scope.spawn(|| attempt(0));
            scope.spawn(|| attempt(45));
        });
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_chunk_list_is_a_valid_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::open(dir.path()).unwrap();
        let k = key(7);

        cache.get_or_compute(&k, &mut || Ok(Vec::new())).unwrap();
        let got = cache
            .get_or_compute(&k, &mut || panic!("must not recompute"))
            .unwrap();
        assert!(got.is_empty());
    }
}
