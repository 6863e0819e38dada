/// Admission control for the refresh endpoint
///
/// One process-wide token bucket, independent of caller identity. Refill is
/// greedy: tokens trickle back one at a time at `refill_tokens / period`
/// instead of arriving in a burst at period boundaries.
///
/// The limiter is built once at startup and shared through actix `Data`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::configuration::RateLimitSettings;

/// Outcome of a consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionProbe {
    pub consumed: bool,
    pub remaining_tokens: u64,
    /// Zero when `consumed` is true.
    pub nanos_to_wait_for_refill: u64,
}

impl ConsumptionProbe {
    pub fn retry_after(&self) -> Duration {
        Duration::from_nanos(self.nanos_to_wait_for_refill)
    }
}

/// Integer token bucket. `remainder` carries the fractional token produced
/// by elapsed time, scaled by the period, so no refill is lost to rounding.
struct TokenBucket {
    tokens: u64,
    remainder: u128,
    last_refill: Instant,
    capacity: u64,
    refill_tokens: u64,
    period_nanos: u128,
}

impl TokenBucket {
    fn new(capacity: u64, refill_tokens: u64, period: Duration, now: Instant) -> Self {
        Self {
            tokens: capacity,
            remainder: 0,
            last_refill: now,
            capacity,
            refill_tokens,
            period_nanos: period.as_nanos().max(1),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_nanos();
        self.last_refill = self.last_refill.max(now);

        if self.tokens >= self.capacity {
            self.remainder = 0;
            return;
        }

        let accumulated = elapsed * self.refill_tokens as u128 + self.remainder;
        let fresh = accumulated / self.period_nanos;
        self.remainder = accumulated % self.period_nanos;

        let fresh = u64::try_from(fresh).unwrap_or(u64::MAX);
        self.tokens = self.tokens.saturating_add(fresh).min(self.capacity);
        if self.tokens == self.capacity {
            self.remainder = 0;
        }
    }

    fn try_consume(&mut self, amount: u64, now: Instant) -> ConsumptionProbe {
        self.refill(now);

        if self.tokens >= amount {
            self.tokens -= amount;
            return ConsumptionProbe {
                consumed: true,
                remaining_tokens: self.tokens,
                nanos_to_wait_for_refill: 0,
            };
        }

        let deficit = (amount - self.tokens) as u128;
        let needed = (deficit * self.period_nanos).saturating_sub(self.remainder);
        let refill_rate = self.refill_tokens as u128;
        let wait = (needed + refill_rate - 1) / refill_rate;

        ConsumptionProbe {
            consumed: false,
            remaining_tokens: self.tokens,
            nanos_to_wait_for_refill: u64::try_from(wait).unwrap_or(u64::MAX),
        }
    }
}

pub struct RefreshRateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RefreshRateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self::starting_at(settings, Instant::now())
    }

    fn starting_at(settings: &RateLimitSettings, now: Instant) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(
                settings.capacity,
                settings.refill_tokens,
                Duration::from_secs(settings.refill_period_secs),
                now,
            )),
        }
    }

    /// Try to take `amount` tokens; never blocks waiting for a refill.
    pub fn try_consume(&self, amount: u64) -> ConsumptionProbe {
        self.try_consume_at(amount, Instant::now())
    }

    fn try_consume_at(&self, amount: u64, now: Instant) -> ConsumptionProbe {
        // The bucket holds plain integers, so a poisoned lock still guards consistent state.
        let mut bucket = self.bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        bucket.try_consume(amount, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn settings() -> RateLimitSettings {
        RateLimitSettings {
            capacity: 3,
            refill_tokens: 3,
            refill_period_secs: 30,
        }
    }

    #[test]
    fn test_capacity_then_reject() {
        let limiter = RefreshRateLimiter::new(&settings());

        for expected_remaining in [2, 1, 0] {
            let probe = limiter.try_consume(1);
            assert!(probe.consumed);
            assert_eq!(probe.remaining_tokens, expected_remaining);
        }

        let probe = limiter.try_consume(1);
        assert!(!probe.consumed);
        assert_eq!(probe.remaining_tokens, 0);
        assert!(probe.nanos_to_wait_for_refill > 0);
    }

    #[test]
    fn test_wait_is_one_refill_interval() {
        let start = Instant::now();
        let limiter = RefreshRateLimiter::starting_at(&settings(), start);
        for _ in 0..3 {
            assert!(limiter.try_consume_at(1, start).consumed);
        }

        let probe = limiter.try_consume_at(1, start);
        // 3 tokens per 30s: one token every 10s.
        assert_eq!(probe.retry_after(), Duration::from_secs(10));
    }

    #[test]
    fn test_greedy_refill_is_incremental() {
        let start = Instant::now();
        let limiter = RefreshRateLimiter::starting_at(&settings(), start);
        for _ in 0..3 {
            assert!(limiter.try_consume_at(1, start).consumed);
        }

        let later = start + Duration::from_secs(4);
        let probe = limiter.try_consume_at(1, later);
        assert!(!probe.consumed);
        assert_eq!(probe.retry_after(), Duration::from_secs(6));

        let probe = limiter.try_consume_at(1, start + Duration::from_secs(10));
        assert!(probe.consumed);
        assert_eq!(probe.remaining_tokens, 0);
    }

    #[test]
    fn test_refill_never_exceeds_capacity() {
        let start = Instant::now();
        let limiter = RefreshRateLimiter::starting_at(&settings(), start);
        assert!(limiter.try_consume_at(1, start).consumed);

        let probe = limiter.try_consume_at(1, start + Duration::from_secs(3600));
        assert!(probe.consumed);
        assert_eq!(probe.remaining_tokens, 2);
    }

    #[test]
    fn test_concurrent_consumers_never_overdraw() {
        let limiter = Arc::new(RefreshRateLimiter::new(&RateLimitSettings {
            capacity: 50,
            refill_tokens: 1,
            refill_period_secs: 3600,
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..20).filter(|_| limiter.try_consume(1).consumed).count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
    }
}
