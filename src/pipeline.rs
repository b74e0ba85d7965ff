// src/pipeline.rs
//! One run: fetch -> dedup -> score -> classify.
//!
//! Everything that can be misconfigured is checked in [`Pipeline::from_config`], before
//! any request leaves the process. After that a run never fails; problems end up in
//! [`RunSummary`].

use chrono::{DateTime, Utc};
use metrics::gauge;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::FileDecisionStore;
use crate::config::ResearchConfig;
use crate::dedup::dedup;
use crate::error::{ConfigError, FetchError};
use crate::ingest::{ensure_metrics_described, AdapterReport, FetchWindow, Orchestrator};
use crate::model::StrategyTag;
use crate::scoring::{KeywordScorer, ScoringEngine, SemanticScorer, StatsSnapshot};
use crate::tier::{classify, Thresholds, TierThresholds, TieredEntry, TieredResults};

/// Per-run knobs, usually straight from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Window length; `None` uses `[search].default_days`.
    pub days: Option<u32>,
    /// `all`, `arxiv`, `crossref` or an RSS group name.
    pub source: String,
    pub journal: Option<String>,
    /// `None` uses `[search].min_score` (keyword) or `[llm].min_score` (semantic).
    pub min_score: Option<u32>,
    pub use_llm: bool,
    pub deadline: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            days: None,
            source: "all".to_string(),
            journal: None,
            min_score: None,
            use_llm: false,
            deadline: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub adapters: Vec<AdapterReport>,
    pub fetch_errors: Vec<FetchError>,
    /// Papers collected before dedup.
    pub fetched: usize,
    pub skipped: usize,
    pub dedup_removed: usize,
    pub scored: usize,
    pub unscored: usize,
    /// Scored papers dropped by the minimum-score cutoff.
    pub filtered_out: usize,
    pub min_score: u32,
    pub scoring: StatsSnapshot,
}

#[derive(Debug)]
pub struct RunReport {
    pub window: FetchWindow,
    pub strategy: StrategyTag,
    /// Thresholds the tiers were cut with.
    pub thresholds: Thresholds,
    pub tiers: TieredResults,
    pub summary: RunSummary,
}

impl RunReport {
    /// Distinct source labels of the reported papers, sorted.
    pub fn sources(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .tiers
            .iter()
            .flat_map(|(_, list)| list.iter().map(|e| e.paper.source.clone()))
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

pub struct Pipeline {
    window: FetchWindow,
    orchestrator: Orchestrator,
    engine: ScoringEngine,
    thresholds: TierThresholds,
    min_score: u32,
}

impl Pipeline {
    pub fn new(
        window: FetchWindow,
        orchestrator: Orchestrator,
        engine: ScoringEngine,
        thresholds: TierThresholds,
        min_score: u32,
    ) -> Self {
        Self {
            window,
            orchestrator,
            engine,
            thresholds,
            min_score,
        }
    }

    /// Validate the config for the chosen strategy and wire adapters and scorer.
    /// `now` is the run start: window end and keyword `scored_at`.
    pub fn from_config(
        cfg: &ResearchConfig,
        opts: &RunOptions,
        now: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        cfg.validate(opts.use_llm)?;
        let thresholds = cfg.tier_thresholds()?;

        let engine = if opts.use_llm {
            let provider = cfg.llm.build_provider()?;
            let store = FileDecisionStore::open(&cfg.llm.cache_dir).map_err(|source| {
                ConfigError::Read {
                    path: cfg.llm.cache_dir.clone(),
                    source,
                }
            })?;
            let scorer = SemanticScorer::new(
                provider,
                Arc::new(store),
                cfg.llm.research_interests.clone(),
                cfg.llm.model_version()?,
            )?;
            tracing::info!(target: "pipeline", model_version = scorer.model_version(), workers = cfg.llm.workers, "semantic scoring");
            ScoringEngine::semantic(scorer, cfg.llm.workers)
        } else {
            let scorer =
                KeywordScorer::new(&cfg.keywords.primary, &cfg.keywords.secondary, now)?;
            let (primary, secondary) = scorer.keyword_count();
            tracing::info!(target: "pipeline", primary, secondary, "keyword scoring");
            ScoringEngine::Keyword(scorer)
        };

        let days = opts.days.unwrap_or(cfg.search.default_days);
        let window =
            FetchWindow::checked_last_days(days, now).ok_or(ConfigError::InvalidWindow(days))?;
        let deadline = opts
            .deadline
            .unwrap_or(Duration::from_secs(cfg.search.deadline_secs));
        if std::time::Instant::now().checked_add(deadline).is_none() {
            return Err(ConfigError::InvalidDeadline(deadline));
        }

        let adapters = cfg.build_adapters(&opts.source, opts.journal.as_deref())?;
        let orchestrator = Orchestrator::new(adapters, cfg.pacing.to_pacing(), deadline);

        let min_score = opts.min_score.unwrap_or(if opts.use_llm {
            cfg.llm.min_score
        } else {
            cfg.search.min_score
        });

        Ok(Self::new(
            window,
            orchestrator,
            engine,
            thresholds,
            min_score,
        ))
    }

    pub fn window(&self) -> &FetchWindow {
        &self.window
    }

    pub fn strategy(&self) -> StrategyTag {
        self.engine.strategy()
    }

    pub async fn run(&self) -> RunReport {
        ensure_metrics_described();
        let strategy = self.engine.strategy();
        tracing::info!(
            target: "pipeline",
            start = %self.window.start,
            end = %self.window.end,
            %strategy,
            adapters = ?self.orchestrator.adapter_names(),
            "run started"
        );

        let collected = self.orchestrator.collect(&self.window).await;
        let skipped = collected.skipped();
        let fetched = collected.papers.len();

        let deduped = dedup(collected.papers);
        let scored = self.engine.score_all(deduped.papers).await;

        let mut unscored = 0usize;
        let entries: Vec<TieredEntry> = scored
            .into_iter()
            .map(|(paper, res)| {
                let score = res.ok();
                if score.is_none() {
                    unscored += 1;
                }
                let tier = classify(score.as_ref(), strategy, &self.thresholds);
                TieredEntry { paper, score, tier }
            })
            .collect();
        let scored_count = entries.len() - unscored;

        let mut tiers = TieredResults::from_entries(entries);
        let before = tiers.len();
        tiers.retain_min_score(self.min_score);
        let filtered_out = before - tiers.len();

        let summary = RunSummary {
            adapters: collected.adapters,
            fetch_errors: collected.errors,
            fetched,
            skipped,
            dedup_removed: deduped.removed,
            scored: scored_count,
            unscored,
            filtered_out,
            min_score: self.min_score,
            scoring: self.engine.stats(),
        };

        gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "pipeline",
            fetched,
            dedup_removed = summary.dedup_removed,
            scored = summary.scored,
            unscored,
            filtered_out,
            reported = tiers.len(),
            fetch_errors = summary.fetch_errors.len(),
            "run finished"
        );

        RunReport {
            window: self.window,
            strategy,
            thresholds: *self.thresholds.for_mode(strategy),
            tiers,
            summary,
        }
    }
}
