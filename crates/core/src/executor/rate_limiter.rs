//! Token bucket rate limiter for provider calls.
//!
//! Implements per-provider rate limiting using the token bucket algorithm.
//! Each provider gets one bucket holding up to `qps` tokens, refilled
//! continuously at `qps` tokens per second, so a short burst up to the
//! capacity is allowed while the sustained dispatch rate stays at or under
//! `qps`. An empty bucket is backpressure, never an error: acquiring
//! suspends the caller until the refill catches up.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::constants::DEFAULT_QPS;
use crate::types::ProviderId;

/// Token bucket for a single provider.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens.
    tokens: f64,
    /// Last time the bucket was updated.
    last_update: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
}

impl TokenBucket {
    fn new(config: RateLimitConfig) -> Self {
        let capacity = f64::from(config.qps.max(1));
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: capacity,
            capacity,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        let new_tokens = elapsed * self.rate;

        self.tokens = (self.tokens + new_tokens).min(self.capacity);
        self.last_update = now;
    }

    /// Try to acquire a token immediately.
    /// Returns true if a token was available, false otherwise.
    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Calculate the wait time until a token becomes available.
    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let tokens_needed = 1.0 - self.tokens;
            let seconds_needed = tokens_needed / self.rate;
            Duration::from_secs_f64(seconds_needed)
        }
    }
}

/// Rate limiter configuration for a provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained queries per second; doubles as the burst capacity.
    pub qps: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { qps: DEFAULT_QPS }
    }
}

/// Token bucket rate limiter for multiple providers.
///
/// Thread-safe rate limiter that maintains per-provider token buckets.
/// Buckets are created on-demand with default settings, or can be
/// pre-configured from a provider's declared limits.
pub struct RateLimiter {
    /// Per-provider token buckets.
    buckets: Mutex<HashMap<String, TokenBucket>>,
    /// Per-provider configuration overrides.
    configs: Mutex<HashMap<String, RateLimitConfig>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    ///
    /// The worst case of recovering here is slightly incorrect rate
    /// limiting, which beats panicking every caller.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Lock the configs mutex, recovering from poison if necessary.
    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure rate limits for a specific provider.
    pub fn configure(&self, provider: &ProviderId, config: RateLimitConfig) {
        let mut configs = self.lock_configs();
        configs.insert(provider.to_string(), config);
        drop(configs); // Release configs lock before acquiring buckets lock

        // Drop any existing bucket so the next acquire rebuilds it with the
        // new settings.
        let mut buckets = self.lock_buckets();
        buckets.remove(provider.as_str());
    }

    /// Acquire a token for the given provider.
    ///
    /// This method will wait (asynchronously) until a token is available.
    /// If the provider doesn't have a bucket yet, one is created from its
    /// configured settings, or defaults.
    pub async fn acquire(&self, provider: &ProviderId) {
        loop {
            let wait_time = {
                let mut buckets = self.lock_buckets();

                let bucket = buckets
                    .entry(provider.to_string())
                    .or_insert_with(|| self.create_bucket(provider));

                if bucket.try_acquire() {
                    debug!("Rate limiter: acquired token for '{}'", provider);
                    return;
                }

                bucket.time_until_available()
            };

            if wait_time > Duration::ZERO {
                debug!(
                    "Rate limiter: waiting {:?} for provider '{}'",
                    wait_time, provider
                );
                tokio::time::sleep(wait_time).await;
            }
        }
    }

    /// Try to acquire a token without waiting.
    ///
    /// Returns true if a token was acquired, false if rate limited.
    pub fn try_acquire(&self, provider: &ProviderId) -> bool {
        let mut buckets = self.lock_buckets();

        let bucket = buckets
            .entry(provider.to_string())
            .or_insert_with(|| self.create_bucket(provider));

        bucket.try_acquire()
    }

    /// Get the remaining tokens for a provider.
    pub fn remaining_tokens(&self, provider: &ProviderId) -> f64 {
        let mut buckets = self.lock_buckets();

        if let Some(bucket) = buckets.get_mut(provider.as_str()) {
            bucket.refill();
            bucket.tokens
        } else {
            let configs = self.lock_configs();
            f64::from(
                configs
                    .get(provider.as_str())
                    .copied()
                    .unwrap_or_default()
                    .qps
                    .max(1),
            )
        }
    }

    /// Reset the bucket for a provider to full capacity.
    pub fn reset(&self, provider: &ProviderId) {
        let mut buckets = self.lock_buckets();
        buckets.remove(provider.as_str());
    }

    /// Create a bucket for a provider, using custom config if available.
    fn create_bucket(&self, provider: &ProviderId) -> TokenBucket {
        let configs = self.lock_configs();

        match configs.get(provider.as_str()) {
            Some(config) => TokenBucket::new(*config),
            None => TokenBucket::new(RateLimitConfig::default()),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> ProviderId {
        ProviderId::new(name)
    }

    #[test]
    fn test_token_bucket_burst_up_to_qps() {
        let mut bucket = TokenBucket::new(RateLimitConfig { qps: 3 });

        for _ in 0..3 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_token_bucket_refill() {
        let mut bucket = TokenBucket::new(RateLimitConfig { qps: 1 });

        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        // Manually advance time by simulating elapsed time
        bucket.last_update = Instant::now() - Duration::from_secs(2);

        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_refill_never_exceeds_capacity() {
        let mut bucket = TokenBucket::new(RateLimitConfig { qps: 2 });
        bucket.last_update = Instant::now() - Duration::from_secs(60);
        bucket.refill();
        assert!(bucket.tokens <= 2.0 + f64::EPSILON);
    }

    #[test]
    fn test_rate_limiter_uses_configured_qps() {
        let limiter = RateLimiter::new();
        let p = provider("configured");

        limiter.configure(&p, RateLimitConfig { qps: 2 });

        assert!(limiter.try_acquire(&p));
        assert!(limiter.try_acquire(&p));
        assert!(!limiter.try_acquire(&p));
    }

    #[test]
    fn test_rate_limiter_default_for_unknown_provider() {
        let limiter = RateLimiter::new();
        let p = provider("unknown");

        for _ in 0..DEFAULT_QPS {
            assert!(limiter.try_acquire(&p));
        }
        assert!(!limiter.try_acquire(&p));
    }

    #[test]
    fn test_rate_limiter_per_provider_isolation() {
        let limiter = RateLimiter::new();
        let a = provider("a");
        let b = provider("b");
        limiter.configure(&a, RateLimitConfig { qps: 1 });
        limiter.configure(&b, RateLimitConfig { qps: 1 });

        assert!(limiter.try_acquire(&a));
        assert!(!limiter.try_acquire(&a));
        assert!(limiter.try_acquire(&b));
    }

    #[test]
    fn test_reconfigure_resets_bucket() {
        let limiter = RateLimiter::new();
        let p = provider("resized");
        limiter.configure(&p, RateLimitConfig { qps: 1 });
        assert!(limiter.try_acquire(&p));
        assert!(!limiter.try_acquire(&p));

        limiter.configure(&p, RateLimitConfig { qps: 3 });
        assert!(limiter.try_acquire(&p));
        assert!(limiter.try_acquire(&p));
    }

    #[test]
    fn test_remaining_tokens() {
        let limiter = RateLimiter::new();
        let p = provider("remaining");
        limiter.configure(&p, RateLimitConfig { qps: 5 });

        assert!((limiter.remaining_tokens(&p) - 5.0).abs() < 0.01);

        limiter.try_acquire(&p);
        limiter.try_acquire(&p);
        assert!((limiter.remaining_tokens(&p) - 3.0).abs() < 0.1);
    }

    #[test]
    fn test_reset_restores_capacity() {
        let limiter = RateLimiter::new();
        let p = provider("reset");
        limiter.configure(&p, RateLimitConfig { qps: 1 });
        assert!(limiter.try_acquire(&p));
        assert!(!limiter.try_acquire(&p));

        limiter.reset(&p);
        assert!(limiter.try_acquire(&p));
    }

    #[tokio::test]
    async fn test_async_acquire_waits_for_refill() {
        let limiter = RateLimiter::new();
        let p = provider("async");
        limiter.configure(&p, RateLimitConfig { qps: 20 });

        for _ in 0..20 {
            limiter.acquire(&p).await;
        }

        // Bucket is empty; the 21st token arrives after ~1/20s.
        let start = Instant::now();
        limiter.acquire(&p).await;
        assert!(start.elapsed().as_millis() >= 20);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_all_complete() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new());
        let p = provider("concurrent");
        limiter.configure(&p, RateLimitConfig { qps: 50 });

        let mut handles = Vec::new();
        for _ in 0..30 {
            let limiter = limiter.clone();
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(&p).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
