//! Per-channel rate limiting with adaptive throttling
//!
//! Marketplaces publish request quotas per account. Every configured channel
//! gets its own [`TokenBucket`] sized from `requests_per_minute`; the
//! [`AdaptiveRateLimiter`] shrinks a bucket when the marketplace answers
//! HTTP 429 and slowly grows it back on successful calls.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use salesync_channels::rate_limit::AdaptiveRateLimiter;
//! use salesync_core::domain::ChannelId;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let limiter = AdaptiveRateLimiter::new();
//! let channel = ChannelId::new(1)?;
//! limiter.register(channel, 120);
//! limiter.acquire(channel).await;
//! // ... call the marketplace ...
//! limiter.on_success(channel);
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use salesync_core::domain::ChannelId;
use tracing::{debug, info, warn};

/// Requests per minute assumed for channels that were never registered
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Successful calls needed before the capacity grows again
const RECOVERY_INTERVAL: u64 = 100;

/// Capacity growth per recovery step (5%)
const RECOVERY_FACTOR: f64 = 0.05;

// ============================================================================
// TokenBucket
// ============================================================================

#[derive(Debug)]
struct BucketState {
    /// Fractional token count for smooth refill
    tokens: f64,
    last_refill: Instant,
    /// Capacity after throttle adjustments, never above `capacity`
    effective_capacity: u32,
    success_count: u64,
}

/// Token bucket guarding one channel
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    /// Tokens added per second
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
                effective_capacity: capacity,
                success_count: 0,
            }),
        }
    }

    /// Bucket allowing `requests_per_minute` calls, refilled continuously
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::new(requests_per_minute, f64::from(requests_per_minute) / 60.0)
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(state: &mut BucketState, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens =
                (state.tokens + elapsed * refill_rate).min(f64::from(state.effective_capacity));
            state.last_refill = now;
        }
    }

    /// Takes one token if available
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until the next token becomes available
    pub fn time_until_available(&self) -> Duration {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);
        if state.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if self.refill_rate <= 0.0 {
            return Duration::MAX;
        }
        Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rate)
    }

    /// Current token count after refill
    pub fn available_tokens(&self) -> f64 {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);
        state.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn effective_capacity(&self) -> u32 {
        self.lock().effective_capacity
    }

    /// Grows the effective capacity by 5% every 100 successes
    pub fn on_success(&self) {
        let mut state = self.lock();
        state.success_count += 1;
        if state.success_count % RECOVERY_INTERVAL != 0 || state.effective_capacity >= self.capacity
        {
            return;
        }

        let step = ((f64::from(state.effective_capacity) * RECOVERY_FACTOR).ceil() as u32).max(1);
        let grown = (state.effective_capacity + step).min(self.capacity);
        debug!(
            from = state.effective_capacity,
            to = grown,
            "Recovering channel capacity"
        );
        state.effective_capacity = grown;
    }

    /// Halves the effective capacity (minimum 1) and drops excess tokens
    pub fn on_throttle(&self) {
        let mut state = self.lock();
        let reduced = (state.effective_capacity / 2).max(1);
        state.effective_capacity = reduced;
        state.tokens = state.tokens.min(f64::from(reduced));
        state.success_count = 0;
    }
}

// ============================================================================
// AdaptiveRateLimiter
// ============================================================================

/// Token buckets for every channel, shared by all adapters
#[derive(Debug, Default)]
pub struct AdaptiveRateLimiter {
    buckets: DashMap<ChannelId, TokenBucket>,
}

impl AdaptiveRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or resizes) the bucket of a channel
    pub fn register(&self, channel_id: ChannelId, requests_per_minute: u32) {
        self.buckets
            .insert(channel_id, TokenBucket::per_minute(requests_per_minute));
        debug!(channel_id = %channel_id, requests_per_minute, "Registered channel rate limit");
    }

    /// Waits until a token for `channel_id` is available and takes it
    pub async fn acquire(&self, channel_id: ChannelId) {
        loop {
            let wait = {
                let bucket = self
                    .buckets
                    .entry(channel_id)
                    .or_insert_with(|| TokenBucket::per_minute(DEFAULT_REQUESTS_PER_MINUTE));
                if bucket.try_acquire() {
                    return;
                }
                bucket.time_until_available()
            };

            let wait = wait.clamp(Duration::from_millis(10), Duration::from_secs(60));
            debug!(channel_id = %channel_id, wait_ms = wait.as_millis() as u64, "Rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up after `max_wait`
    ///
    /// Returns `false` when no token became available in time; nothing is
    /// taken from the bucket in that case.
    pub async fn acquire_within(&self, channel_id: ChannelId, max_wait: Duration) -> bool {
        tokio::time::timeout(max_wait, self.acquire(channel_id))
            .await
            .is_ok()
    }

    pub fn on_success(&self, channel_id: ChannelId) {
        if let Some(bucket) = self.buckets.get(&channel_id) {
            bucket.on_success();
        }
    }

    pub fn on_throttle(&self, channel_id: ChannelId) {
        if let Some(bucket) = self.buckets.get(&channel_id) {
            bucket.on_throttle();
            warn!(
                channel_id = %channel_id,
                effective_capacity = bucket.effective_capacity(),
                "Channel throttled, capacity reduced"
            );
        }
    }

    /// Effective capacity of a channel's bucket, if registered
    pub fn effective_capacity(&self, channel_id: ChannelId) -> Option<u32> {
        self.buckets
            .get(&channel_id)
            .map(|bucket| bucket.effective_capacity())
    }
}

/// Parses a `Retry-After` header value in seconds
///
/// HTTP-date values and garbage fall back to `default`.
pub fn parse_retry_after(value: Option<&str>, default: Duration) -> Duration {
    match value.map(str::trim).and_then(|v| v.parse::<u64>().ok()) {
        Some(secs) => Duration::from_secs(secs),
        None => {
            if let Some(raw) = value {
                info!(value = raw, "Unparseable Retry-After header, using default");
            }
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: i64) -> ChannelId {
        ChannelId::new(id).unwrap()
    }

    // ====================================================================
    // TokenBucket
    // ====================================================================

    #[test]
    fn test_bucket_starts_full() {
        let bucket = TokenBucket::new(10, 1.0);
        assert_eq!(bucket.capacity(), 10);
        assert_eq!(bucket.effective_capacity(), 10);
        assert!(bucket.available_tokens() >= 10.0 - f64::EPSILON);
    }

    #[test]
    fn test_try_acquire_fails_when_empty() {
        let bucket = TokenBucket::new(2, 0.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        assert_eq!(bucket.time_until_available(), Duration::MAX);
    }

    #[test]
    fn test_refill_over_time() {
        let bucket = TokenBucket::new(5, 100.0);
        for _ in 0..5 {
            bucket.try_acquire();
        }
        assert!(!bucket.try_acquire());

        std::thread::sleep(Duration::from_millis(20));
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_time_until_available() {
        let bucket = TokenBucket::new(1, 1.0);
        assert_eq!(bucket.time_until_available(), Duration::ZERO);
        bucket.try_acquire();
        let wait = bucket.time_until_available();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(1100));
    }

    #[test]
    fn test_per_minute_refill_rate() {
        let bucket = TokenBucket::per_minute(120);
        assert_eq!(bucket.capacity(), 120);
        for _ in 0..120 {
            assert!(bucket.try_acquire());
        }
        // 2 tokens per second
        assert!(bucket.time_until_available() <= Duration::from_millis(600));
    }

    #[test]
    fn test_throttle_halves_down_to_one() {
        let bucket = TokenBucket::new(4, 1.0);
        bucket.on_throttle();
        assert_eq!(bucket.effective_capacity(), 2);
        bucket.on_throttle();
        assert_eq!(bucket.effective_capacity(), 1);
        bucket.on_throttle();
        assert_eq!(bucket.effective_capacity(), 1);
        assert!(bucket.available_tokens() <= 1.0);
    }

    #[test]
    fn test_success_recovers_but_never_exceeds_capacity() {
        let bucket = TokenBucket::new(100, 1.0);
        bucket.on_throttle();
        assert_eq!(bucket.effective_capacity(), 50);

        for _ in 0..100 {
            bucket.on_success();
        }
        assert_eq!(bucket.effective_capacity(), 53);

        for _ in 0..10_000 {
            bucket.on_success();
        }
        assert_eq!(bucket.effective_capacity(), 100);
    }

    #[test]
    fn test_throttle_resets_success_counter() {
        let bucket = TokenBucket::new(100, 1.0);
        bucket.on_throttle();
        for _ in 0..99 {
            bucket.on_success();
        }
        bucket.on_throttle();
        assert_eq!(bucket.effective_capacity(), 25);
        bucket.on_success();
        assert_eq!(bucket.effective_capacity(), 25);
    }

    // ====================================================================
    // AdaptiveRateLimiter
    // ====================================================================

    #[tokio::test]
    async fn test_acquire_unregistered_channel_uses_default_bucket() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.acquire(channel(9)).await;
        assert_eq!(
            limiter.effective_capacity(channel(9)),
            Some(DEFAULT_REQUESTS_PER_MINUTE)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register(channel(1), 1);
        limiter.acquire(channel(1)).await;

        let started = tokio::time::Instant::now();
        let waiter = tokio::time::timeout(Duration::from_secs(5), limiter.acquire(channel(1)));
        // One token per minute: a 5 second budget is not enough
        assert!(waiter.await.is_err());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_gives_up() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register(channel(1), 1);
        assert!(limiter.acquire_within(channel(1), Duration::ZERO).await);
        assert!(
            !limiter
                .acquire_within(channel(1), Duration::from_secs(10))
                .await
        );
        // Other channels are unaffected
        assert!(limiter.acquire_within(channel(2), Duration::ZERO).await);
    }

    #[test]
    fn test_channels_are_independent() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register(channel(1), 100);
        limiter.register(channel(2), 100);

        limiter.on_throttle(channel(1));
        assert_eq!(limiter.effective_capacity(channel(1)), Some(50));
        assert_eq!(limiter.effective_capacity(channel(2)), Some(100));

        for _ in 0..100 {
            limiter.on_success(channel(1));
        }
        assert_eq!(limiter.effective_capacity(channel(1)), Some(53));
        assert_eq!(limiter.effective_capacity(channel(3)), None);
    }

    #[test]
    fn test_parse_retry_after() {
        let default = Duration::from_secs(30);
        assert_eq!(parse_retry_after(Some("120"), default), Duration::from_secs(120));
        assert_eq!(parse_retry_after(Some("  5 "), default), Duration::from_secs(5));
        assert_eq!(parse_retry_after(Some("0"), default), Duration::ZERO);
        assert_eq!(
            parse_retry_after(Some("Wed, 21 Oct 2026 07:28:00 GMT"), default),
            default
        );
        assert_eq!(parse_retry_after(None, default), default);
    }
}
