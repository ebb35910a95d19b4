//! Outbound request spacing on top of governor.
//!
//! The market-data API tolerates roughly one request every couple of seconds.
//! [`RequestSpacer`] holds a single-permit GCRA limiter so concurrent callers are
//! serialised and successive requests are at least `min_interval` apart.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Enforces a minimum interval between outbound requests.
pub struct RequestSpacer {
    /// `None` when spacing is disabled (zero interval)
    limiter: Option<DefaultDirectRateLimiter>,
    min_interval: Duration,
    requests: AtomicU64,
    failures: AtomicU64,
}

/// Request counters for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpacerStats {
    pub requests: u64,
    pub failures: u64,
}

impl RequestSpacer {
    pub fn new(min_interval: Duration) -> Self {
        // Burst of one: the limiter state is a single "earliest next call" instant
        let limiter = Quota::with_period(min_interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));

        Self {
            limiter,
            min_interval,
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next request may be sent and claim the slot.
    #[instrument(skip(self))]
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            let started = Instant::now();
            limiter.until_ready().await;
            let waited = started.elapsed();
            if !waited.is_zero() {
                debug!("Spaced outbound request by {:?}", waited);
            }
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SpacerStats {
        SpacerStats {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_request_is_immediate() {
        let spacer = RequestSpacer::new(Duration::from_secs(5));
        let start = Instant::now();
        spacer.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(spacer.stats().requests, 1);
    }

    #[tokio::test]
    async fn test_successive_requests_are_spaced() {
        let spacer = RequestSpacer::new(Duration::from_millis(60));
        let start = Instant::now();

        for _ in 0..3 {
            spacer.acquire().await;
        }

        // Two gaps of at least 60ms each
        assert!(start.elapsed() >= Duration::from_millis(110), "{:?}", start.elapsed());
        assert_eq!(spacer.stats().requests, 3);
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_serialised() {
        let spacer = Arc::new(RequestSpacer::new(Duration::from_millis(50)));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let spacer = spacer.clone();
                tokio::spawn(async move {
                    spacer.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        assert!(start.elapsed() >= Duration::from_millis(140));
        for pair in finished.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(40), "{:?}", pair[1] - pair[0]);
        }
    }

    #[tokio::test]
    async fn test_zero_interval_disables_spacing() {
        let spacer = RequestSpacer::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..20 {
            spacer.acquire().await;
        }
        spacer.record_failure();

        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(spacer.stats(), SpacerStats { requests: 20, failures: 1 });
    }
}
