// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;

use crate::error::{FetchError, FetchFailure};
use crate::ingest::rate_limit::RateLimiter;
use crate::model::SourceRecord;

/// Inclusive publication window a run asks adapters for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `days` days leading up to `now`.
    pub fn last_days(days: u32, now: DateTime<Utc>) -> Self {
        Self {
            start: now - ChronoDuration::days(i64::from(days)),
            end: now,
        }
    }

    /// Like [`FetchWindow::last_days`], `None` when the start is not representable.
    pub fn checked_last_days(days: u32, now: DateTime<Utc>) -> Option<Self> {
        let span = ChronoDuration::try_days(i64::from(days))?;
        let start = now.checked_sub_signed(span)?;
        Some(Self { start, end: now })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Whole days covered, rounded down.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Adapter class. Pacing is configured per class, mirroring each upstream's
/// published limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceClass {
    Arxiv,
    Rss,
    CrossRef,
    Other,
}

impl fmt::Display for SourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceClass::Arxiv => "arxiv",
            SourceClass::Rss => "rss",
            SourceClass::CrossRef => "crossref",
            SourceClass::Other => "other",
        };
        f.write_str(s)
    }
}

/// Successful adapter output. `skipped` and `failed_requests` are the side channel for
/// partial problems; they never turn the batch into an error.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub records: Vec<SourceRecord>,
    pub skipped: usize,
    pub failed_requests: usize,
}

#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// Adapter identity used in logs, metrics and the run summary.
    fn name(&self) -> &str;
    fn class(&self) -> SourceClass;
    /// Fetch records published in `window`. Every upstream request must be preceded by
    /// `pacer.acquire().await`.
    async fn fetch(&self, window: &FetchWindow, pacer: &RateLimiter)
        -> Result<FetchBatch, FetchError>;
}

/// Bookkeeping for adapters that issue several sequential sub-requests.
#[derive(Debug, Default)]
pub struct SubRequestTally {
    attempted: usize,
    failed: usize,
    last_error: Option<String>,
}

impl SubRequestTally {
    pub fn ok(&mut self) {
        self.attempted += 1;
    }

    pub fn failed(&mut self, err: &FetchFailure) {
        self.attempted += 1;
        self.failed += 1;
        self.last_error = Some(err.to_string());
    }

    /// Fails the adapter only when every attempted sub-request failed.
    pub fn finish(self, adapter: &str, mut batch: FetchBatch) -> Result<FetchBatch, FetchError> {
        if self.attempted > 0 && self.failed == self.attempted {
            return Err(FetchError::new(
                adapter,
                FetchFailure::AllRequestsFailed {
                    attempted: self.attempted,
                    last: self.last_error.unwrap_or_default(),
                },
            ));
        }
        batch.failed_requests = self.failed;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_bounds_are_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 3, 8, 0, 0, 0).unwrap();
        let w = FetchWindow::last_days(7, now);
        assert_eq!(w.days(), 7);
        assert!(w.contains(now));
        assert!(w.contains(w.start));
        assert!(!w.contains(w.start - ChronoDuration::seconds(1)));
        assert_eq!(FetchWindow::checked_last_days(7, now), Some(w));
        assert!(FetchWindow::checked_last_days(u32::MAX, now).is_none());
    }

    #[test]
    fn tally_fails_only_when_everything_failed() {
        let mut t = SubRequestTally::default();
        t.ok();
        t.failed(&FetchFailure::Status(503));
        let batch = t.finish("x", FetchBatch::default()).unwrap();
        assert_eq!(batch.failed_requests, 1);

        let mut t = SubRequestTally::default();
        t.failed(&FetchFailure::Status(500));
        t.failed(&FetchFailure::Status(502));
        let err = t.finish("x", FetchBatch::default()).unwrap_err();
        assert_eq!(err.adapter, "x");
        assert!(matches!(
            err.cause,
            FetchFailure::AllRequestsFailed { attempted: 2, .. }
        ));

        // Nothing configured is not a failure.
        let empty = SubRequestTally::default()
            .finish("x", FetchBatch::default())
            .unwrap();
        assert!(empty.records.is_empty());
    }
}
