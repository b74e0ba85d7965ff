// src/ingest/rate_limit.rs
//! Per-adapter request pacing: a minimum delay between consecutive upstream requests.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::ingest::types::SourceClass;

/// Minimum inter-request delay for each adapter class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub arxiv: Duration,
    pub rss: Duration,
    pub crossref: Duration,
    pub other: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            arxiv: Duration::from_secs(3),
            rss: Duration::from_secs(2),
            crossref: Duration::from_millis(500),
            other: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    /// No pacing at all (tests, fixtures).
    pub fn none() -> Self {
        Self {
            arxiv: Duration::ZERO,
            rss: Duration::ZERO,
            crossref: Duration::ZERO,
            other: Duration::ZERO,
        }
    }

    pub fn for_class(&self, class: SourceClass) -> Duration {
        match class {
            SourceClass::Arxiv => self.arxiv,
            SourceClass::Rss => self.rss,
            SourceClass::CrossRef => self.crossref,
            SourceClass::Other => self.other,
        }
    }
}

/// Async pacer owned by one adapter invocation. Callers are serialized: a second
/// `acquire` waits until `min_interval` has passed since the previous one returned.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for permission to issue the next request. The first call never waits.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn consecutive_acquires_are_spaced() {
        let pacer = RateLimiter::new(Duration::from_secs(3));
        let t0 = Instant::now();
        pacer.acquire().await;
        assert_eq!(t0.elapsed(), Duration::ZERO);
        pacer.acquire().await;
        pacer.acquire().await;
        assert!(t0.elapsed() >= Duration::from_secs(6));
        assert!(t0.elapsed() < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn independent_pacers_do_not_wait_on_each_other() {
        let slow = RateLimiter::new(Duration::from_secs(10));
        let fast = RateLimiter::new(Duration::from_millis(100));
        slow.acquire().await;

        let t0 = Instant::now();
        let slow_second = async {
            slow.acquire().await;
            t0.elapsed()
        };
        let fast_two = async {
            fast.acquire().await;
            fast.acquire().await;
            t0.elapsed()
        };
        let (slow_at, fast_at) = tokio::join!(slow_second, fast_two);
        assert!(fast_at < Duration::from_secs(1));
        assert!(slow_at >= Duration::from_secs(10));
    }

    #[test]
    fn default_pacing_follows_upstream_limits() {
        let p = Pacing::default();
        assert_eq!(p.for_class(SourceClass::Arxiv), Duration::from_secs(3));
        assert_eq!(p.for_class(SourceClass::Rss), Duration::from_secs(2));
        assert_eq!(p.for_class(SourceClass::CrossRef), Duration::from_millis(500));
        assert_eq!(Pacing::none().for_class(SourceClass::Arxiv), Duration::ZERO);
    }
}
