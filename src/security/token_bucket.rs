//! Token bucket rate limiting.
//!
//! A bucket starts full and refills continuously at `rate` tokens per second
//! up to `capacity`. Refill is computed lazily from the elapsed time on each
//! call; there is no background timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single-entity token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Take one token as of `now`.
    ///
    /// The whole read-modify-write happens under the bucket's lock.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        if now > state.last_refill {
            state.last_refill = now;
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// One token bucket per key, created on first use.
///
/// Every bucket shares the same rate and capacity. Entries are never evicted.
#[derive(Debug)]
pub struct KeyedLimiter {
    rate: f64,
    capacity: f64,
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl KeyedLimiter {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate,
            capacity,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Return the bucket for `key`, creating it if needed.
    pub fn get_limiter(&self, key: &str) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = buckets.get(key) {
            return Arc::clone(bucket);
        }
        let bucket = Arc::new(TokenBucket::new(self.rate, self.capacity));
        buckets.insert(key.to_owned(), Arc::clone(&bucket));
        bucket
    }

    /// Take one token from `key`'s bucket.
    ///
    /// The registry lock is released before the bucket is locked, so
    /// different keys never wait on each other's buckets.
    pub fn allow(&self, key: &str) -> bool {
        self.get_limiter(key).allow()
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
