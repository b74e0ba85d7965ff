// src/scoring/mod.rs
//! Scoring engine. The strategy is picked once per run and applied to every paper.

pub mod keyword;
pub mod provider;
pub mod semantic;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::ScoringError;
use crate::model::{Paper, ScoreResult, StrategyTag};

pub use keyword::KeywordScorer;
pub use provider::{MockProvider, OpenAiCompatibleProvider, ScoringProvider, Verdict};
pub use semantic::{derive_model_version, paper_summary, SemanticScorer};

pub const DEFAULT_WORKERS: usize = 4;

/// Counters shared by concurrent scoring tasks.
#[derive(Debug, Default)]
pub struct ScoringStats {
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_corrupt: AtomicUsize,
    cache_write_failures: AtomicUsize,
    provider_calls: AtomicUsize,
    errors: AtomicUsize,
}

impl ScoringStats {
    pub(crate) fn hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn corrupt(&self) {
        self.cache_corrupt.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn write_failure(&self) {
        self.cache_write_failures.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn provider_call(&self) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_corrupt: self.cache_corrupt.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_corrupt: usize,
    pub cache_write_failures: usize,
    pub provider_calls: usize,
    pub errors: usize,
}

pub type Scored = (Paper, Result<ScoreResult, ScoringError>);

pub enum ScoringEngine {
    Keyword(KeywordScorer),
    Semantic {
        scorer: Arc<SemanticScorer>,
        workers: usize,
    },
}

impl ScoringEngine {
    pub fn semantic(scorer: SemanticScorer, workers: usize) -> Self {
        Self::Semantic {
            scorer: Arc::new(scorer),
            workers: workers.max(1),
        }
    }

    pub fn strategy(&self) -> StrategyTag {
        match self {
            Self::Keyword(_) => StrategyTag::Keyword,
            Self::Semantic { .. } => StrategyTag::Semantic,
        }
    }

    pub async fn score(&self, paper: &Paper) -> Result<ScoreResult, ScoringError> {
        match self {
            Self::Keyword(k) => Ok(k.score(paper)),
            Self::Semantic { scorer, .. } => scorer.score(paper).await,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        match self {
            Self::Keyword(_) => StatsSnapshot::default(),
            Self::Semantic { scorer, .. } => scorer.stats().snapshot(),
        }
    }

    /// Score every paper; output keeps input order. Semantic scoring runs at most
    /// `workers` provider calls at a time.
    pub async fn score_all(&self, papers: Vec<Paper>) -> Vec<Scored> {
        match self {
            Self::Keyword(k) => papers
                .into_iter()
                .map(|p| {
                    let r = Ok(k.score(&p));
                    (p, r)
                })
                .collect(),
            Self::Semantic { scorer, workers } => {
                score_concurrently(Arc::clone(scorer), *workers, papers).await
            }
        }
    }
}

async fn score_concurrently(
    scorer: Arc<SemanticScorer>,
    workers: usize,
    papers: Vec<Paper>,
) -> Vec<Scored> {
    let permits = Arc::new(Semaphore::new(workers));
    let mut set = JoinSet::new();
    for (idx, paper) in papers.iter().enumerate() {
        let scorer = Arc::clone(&scorer);
        let permits = Arc::clone(&permits);
        let paper = paper.clone();
        set.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (idx, Err(ScoringError::Unavailable("worker pool closed".into())));
            };
            (idx, scorer.score(&paper).await)
        });
    }

    let mut results: Vec<Option<Result<ScoreResult, ScoringError>>> =
        (0..papers.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, res)) => results[idx] = Some(res),
            Err(e) => tracing::error!(target: "scoring", error = %e, "scoring task panicked"),
        }
    }

    papers
        .into_iter()
        .zip(results)
        .map(|(paper, res)| {
            let res = res.unwrap_or_else(|| {
                scorer.stats().error();
                Err(ScoringError::Unavailable("scoring task aborted".into()))
            });
            (paper, res)
        })
        .collect()
}
