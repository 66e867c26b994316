//! A generic LRU cache over a stateful computation (§4.10), keyed by a
//! caller-supplied string and backed by the `lru` crate.
//!
//! The cache is deliberately generic over the cached value rather than tied
//! to `TickResult`: [`crate::engine`] is the only current caller, but the
//! key/witness machinery has nothing tick-specific about it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::num::NonZeroUsize;

use lru::LruCache;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Running counters for a [`Cache`]'s lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    /// Lookups that found an existing entry.
    pub hits: u64,
    /// Lookups that required computing a fresh entry.
    pub misses: u64,
    /// Entries evicted to stay within capacity.
    pub evictions: u64,
    /// Times `invalidate` was called.
    pub invalidations: u64,
    /// Witnesses checked by `validate_witnesses`.
    pub witness_validations: u64,
    /// Witness checks that found a mismatch.
    pub witness_failures: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or `0.0` if both are zero.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Witness<T> {
    input_key: String,
    output: T,
}

/// An LRU cache over values of type `T`, with optional witness sampling for
/// later re-validation.
///
/// `T` must be cheap to clone (stored entries are cloned out on hit) and
/// comparable (witness validation re-checks stored equality).
pub struct Cache<T: Clone + PartialEq> {
    enabled: bool,
    witness_sample_rate: f64,
    store: LruCache<String, T>,
    witness_rng: StdRng,
    witnesses: Vec<Witness<T>>,
    stats: CacheStats,
}

impl<T: Clone + PartialEq> Cache<T> {
    /// Construct a cache with the given capacity, enabled flag, witness
    /// sample rate, and an RNG seed for witness sampling.
    ///
    /// The witness RNG is independent of any simulation RNG by construction:
    /// callers provide a dedicated seed rather than threading the
    /// simulation's seeded generator through.
    pub fn new(capacity: usize, enabled: bool, witness_sample_rate: f64, witness_seed: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1");
        Cache {
            enabled,
            witness_sample_rate,
            store: LruCache::new(capacity),
            witness_rng: StdRng::seed_from_u64(witness_seed),
            witnesses: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    /// Current running statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Look up `key`; on a hit, return the cached value (marking it
    /// most-recently-used). On a miss, compute via `compute`, insert,
    /// evicting the least-recently-used entry if at capacity, and
    /// optionally record a witness. If the cache is disabled, `compute` runs
    /// unconditionally and no state is touched.
    pub fn get_or_compute<F: FnOnce() -> T>(&mut self, key: &str, compute: F) -> T {
        if !self.enabled {
            return compute();
        }

        if let Some(hit) = self.store.get(key) {
            self.stats.hits += 1;
            return hit.clone();
        }

        self.stats.misses += 1;
        let value = compute();

        // `push` returns the displaced entry only when one was evicted to
        // make room; the key is known absent here since `get` just missed.
        if self.store.push(key.to_string(), value.clone()).is_some() {
            self.stats.evictions += 1;
        }

        if self.witness_rng.gen::<f64>() < self.witness_sample_rate {
            self.witnesses.push(Witness {
                input_key: key.to_string(),
                output: value.clone(),
            });
        }

        value
    }

    /// Clear the cache and all recorded witnesses. `reason` is logged, not
    /// stored.
    pub fn invalidate(&mut self, reason: &str) {
        tracing::debug!(reason, "invalidating tick-result cache");
        self.store.clear();
        self.witnesses.clear();
        self.stats.invalidations += 1;
    }

    /// Re-check every recorded witness against the value currently stored
    /// for its key (if still present), incrementing `witness_validations`
    /// and `witness_failures` accordingly. A witness whose key has since
    /// been evicted is skipped (not present for a direct comparison, so
    /// there is nothing to fail).
    pub fn validate_witnesses(&mut self) {
        for witness in &self.witnesses {
            let Some(current) = self.store.peek(&witness.input_key) else {
                continue;
            };
            self.stats.witness_validations += 1;
            if current != &witness.output {
                self.stats.witness_failures += 1;
                tracing::warn!(key = %witness.input_key, "cache witness mismatch");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_cache_always_computes() {
        let mut cache: Cache<i32> = Cache::new(4, false, 0.0, 1);
        let mut calls = 0;
        cache.get_or_compute("a", || {
            calls += 1;
            1
        });
        cache.get_or_compute("a", || {
            calls += 1;
            1
        });
        assert_eq!(calls, 2);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn repeated_key_is_a_hit() {
        let mut cache: Cache<i32> = Cache::new(4, true, 0.0, 1);
        cache.get_or_compute("a", || 1);
        cache.get_or_compute("a", || 2);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn eviction_is_counted_past_capacity() {
        let mut cache: Cache<i32> = Cache::new(2, true, 0.0, 1);
        cache.get_or_compute("a", || 1);
        cache.get_or_compute("b", || 2);
        cache.get_or_compute("c", || 3);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn invalidate_clears_store_and_counts() {
        let mut cache: Cache<i32> = Cache::new(4, true, 0.0, 1);
        cache.get_or_compute("a", || 1);
        cache.invalidate("test");
        assert_eq!(cache.stats().invalidations, 1);
        // cleared, so the next lookup is a miss again.
        cache.get_or_compute("a", || 2);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn witness_sampling_at_full_rate_records_every_miss() {
        let mut cache: Cache<i32> = Cache::new(4, true, 1.0, 1);
        cache.get_or_compute("a", || 1);
        cache.validate_witnesses();
        assert_eq!(cache.stats().witness_validations, 1);
        assert_eq!(cache.stats().witness_failures, 0);
    }

    #[test]
    fn hit_rate_is_zero_when_no_lookups_happened() {
        let cache: Cache<i32> = Cache::new(4, true, 0.0, 1);
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_reflects_hits_over_total() {
        let mut cache: Cache<i32> = Cache::new(4, true, 0.0, 1);
        cache.get_or_compute("a", || 1);
        cache.get_or_compute("a", || 1);
        cache.get_or_compute("b", || 2);
        assert_eq!(cache.stats().hit_rate(), 1.0 / 3.0);
    }
}
