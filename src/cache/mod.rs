//! Gram matrix cache
//!
//! Holds training Gram matrices between fit calls of one estimator so that
//! refitting on identical data skips kernel evaluation. Entries are keyed by
//! the kernel spec fingerprint, a content fingerprint of the samples and the
//! sample count. The cache belongs to a single estimator instance; nothing is
//! shared process-wide.

use crate::core::{GramMatrix, SparseVector};
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default number of Gram matrices kept alive
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    spec: u64,
    data: u64,
    n_samples: usize,
}

/// LRU cache of training Gram matrices
pub struct KernelCache {
    cache: LruCache<CacheKey, Arc<GramMatrix>>,
    hits: u64,
    misses: u64,
}

impl KernelCache {
    /// Create a new cache holding at most `capacity` matrices
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up the Gram matrix of `n_samples` samples.
    ///
    /// An entry whose shape is not `n_samples × n_samples` is dropped and
    /// counted as a miss.
    pub fn get(&mut self, spec: u64, data: u64, n_samples: usize) -> Option<Arc<GramMatrix>> {
        let key = CacheKey {
            spec,
            data,
            n_samples,
        };
        let found = self
            .cache
            .get(&key)
            .filter(|m| m.n_rows() == n_samples && m.n_cols() == n_samples)
            .map(Arc::clone);
        match found {
            Some(matrix) => {
                self.hits += 1;
                Some(matrix)
            }
            None => {
                self.cache.pop(&key);
                self.misses += 1;
                None
            }
        }
    }

    /// Store a Gram matrix, keyed by its side length
    pub fn put(&mut self, spec: u64, data: u64, matrix: Arc<GramMatrix>) {
        let key = CacheKey {
            spec,
            data,
            n_samples: matrix.n_rows(),
        };
        self.cache.put(key, matrix);
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity: self.cache.cap().get(),
            size: self.cache.len(),
        }
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

impl Default for KernelCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
}

/// Content fingerprint of a sample matrix
pub fn data_fingerprint(samples: &[SparseVector]) -> u64 {
    let mut hasher = DefaultHasher::new();
    samples.len().hash(&mut hasher);
    for sample in samples {
        sample.indices.hash(&mut hasher);
        for value in &sample.values {
            value.to_bits().hash(&mut hasher);
        }
    }
    hasher.finish()
}
