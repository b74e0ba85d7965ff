// src/ingest/orchestrator.rs
//! Runs every adapter concurrently under one run deadline and merges their output.
//!
//! Each adapter gets its own task and its own [`RateLimiter`], so a slow or failing
//! upstream never delays the others. Results are merged in configured adapter order
//! regardless of completion order, which keeps "first seen" stable for dedup.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::error::{FetchError, FetchFailure};
use crate::ingest::ensure_metrics_described;
use crate::ingest::rate_limit::{Pacing, RateLimiter};
use crate::ingest::types::{FetchAdapter, FetchBatch, FetchWindow};
use crate::model::Paper;

/// Per-adapter line of the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterReport {
    pub adapter: String,
    /// Papers that survived normalization.
    pub papers: usize,
    /// Malformed entries (adapter-side plus normalization).
    pub skipped: usize,
    pub failed_requests: usize,
    pub elapsed_ms: u64,
    /// Set when the adapter failed as a whole.
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct Collected {
    pub papers: Vec<Paper>,
    pub adapters: Vec<AdapterReport>,
    pub errors: Vec<FetchError>,
}

impl Collected {
    pub fn skipped(&self) -> usize {
        self.adapters.iter().map(|a| a.skipped).sum()
    }
}

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

type TaskOutput = (Result<FetchBatch, FetchError>, Duration);

pub struct Orchestrator {
    adapters: Vec<Arc<dyn FetchAdapter>>,
    pacing: Pacing,
    deadline: Duration,
}

impl Orchestrator {
    pub fn new(adapters: Vec<Arc<dyn FetchAdapter>>, pacing: Pacing, deadline: Duration) -> Self {
        Self {
            adapters,
            pacing,
            deadline,
        }
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// Fetch from all adapters. Never fails: adapter failures, panics and deadline
    /// overruns become [`FetchError`]s next to the papers that did arrive.
    pub async fn collect(&self, window: &FetchWindow) -> Collected {
        ensure_metrics_described();
        let now = Instant::now();
        // an unrepresentable deadline means no deadline
        let deadline = now
            .checked_add(self.deadline)
            .unwrap_or_else(|| now + FAR_FUTURE);

        let handles: Vec<(String, JoinHandle<TaskOutput>)> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                let name = adapter.name().to_string();
                let pacer = RateLimiter::new(self.pacing.for_class(adapter.class()));
                let window = *window;
                let handle = tokio::spawn(async move {
                    let t0 = std::time::Instant::now();
                    let res = adapter.fetch(&window, &pacer).await;
                    (res, t0.elapsed())
                });
                (name, handle)
            })
            .collect();

        let mut out = Collected::default();
        for (name, mut handle) in handles {
            let outcome = match timeout_at(deadline, &mut handle).await {
                Ok(Ok((res, elapsed))) => (res, elapsed),
                Ok(Err(join_err)) => {
                    let cause = FetchFailure::Aborted(join_err.to_string());
                    (Err(FetchError::new(&name, cause)), Duration::ZERO)
                }
                Err(_) => {
                    handle.abort();
                    let cause = FetchFailure::Deadline(self.deadline);
                    (Err(FetchError::new(&name, cause)), self.deadline)
                }
            };
            self.absorb(&mut out, name, outcome, window);
        }

        tracing::info!(
            target: "ingest",
            papers = out.papers.len(),
            skipped = out.skipped(),
            failed_adapters = out.errors.len(),
            "collection finished"
        );
        out
    }

    fn absorb(&self, out: &mut Collected, name: String, outcome: TaskOutput, window: &FetchWindow) {
        let (res, elapsed) = outcome;
        let elapsed_ms = elapsed.as_millis() as u64;
        histogram!("ingest_fetch_ms", "adapter" => name.clone()).record(elapsed_ms as f64);

        match res {
            Ok(batch) => {
                let mut skipped = batch.skipped;
                let before = out.papers.len();
                for rec in batch.records {
                    match Paper::from_record(rec, window.end) {
                        Some(p) => out.papers.push(p),
                        None => skipped += 1,
                    }
                }
                let papers = out.papers.len() - before;
                counter!("ingest_records_total", "adapter" => name.clone()).increment(papers as u64);
                counter!("ingest_skipped_total", "adapter" => name.clone()).increment(skipped as u64);
                tracing::info!(
                    target: "ingest",
                    adapter = %name,
                    papers,
                    skipped,
                    failed_requests = batch.failed_requests,
                    elapsed_ms,
                    "adapter finished"
                );
                out.adapters.push(AdapterReport {
                    adapter: name,
                    papers,
                    skipped,
                    failed_requests: batch.failed_requests,
                    elapsed_ms,
                    error: None,
                });
            }
            Err(err) => {
                counter!("ingest_adapter_errors_total", "adapter" => name.clone()).increment(1);
                tracing::warn!(target: "ingest", adapter = %name, error = %err, "adapter failed");
                out.adapters.push(AdapterReport {
                    adapter: name,
                    papers: 0,
                    skipped: 0,
                    failed_requests: 0,
                    elapsed_ms,
                    error: Some(err.cause.to_string()),
                });
                out.errors.push(err);
            }
        }
    }
}
