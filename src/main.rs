//! research-weekly-feed: fetch the last N days of papers, score them against the
//! configured interests and write a Markdown report.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use research_weekly_feed::cache::FileDecisionStore;
use research_weekly_feed::config::ResearchConfig;
use research_weekly_feed::metrics::Metrics;
use research_weekly_feed::pipeline::{Pipeline, RunOptions};
use research_weekly_feed::report::{write_report, ReportMode};

#[derive(Debug, Parser)]
#[command(name = "research-weekly-feed", version, about)]
struct Cli {
    /// Days to look back (default: [search].default_days)
    #[arg(long)]
    days: Option<u32>,

    /// Config file (default: $RESEARCH_CONFIG_PATH, config/research.toml, config/research.json)
    #[arg(long, env = "RESEARCH_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Minimum score to report (default: [search].min_score, or [llm].min_score with --use-llm)
    #[arg(long)]
    min_score: Option<u32>,

    /// Compact summary instead of the full report
    #[arg(long)]
    summary: bool,

    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,

    /// all | arxiv | crossref | an RSS group from the config (sage, nature, other, ...)
    #[arg(long, default_value = "all")]
    source: String,

    /// Restrict RSS/CrossRef sources to one journal code
    #[arg(long)]
    journal: Option<String>,

    /// Score with the configured LLM provider instead of keywords
    #[arg(long)]
    use_llm: bool,

    /// Overall fetch deadline in seconds (default: [search].deadline_secs)
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Write Prometheus exposition text here after the run
    #[arg(long)]
    metrics_out: Option<PathBuf>,

    /// Delete decision-cache entries older than this many days, then exit
    #[arg(long)]
    prune_cache_days: Option<u32>,
}

/// Compact logs by default, JSON with LOG_FORMAT=json.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("research_weekly_feed=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // API keys and RESEARCH_CONFIG_PATH may come from .env
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing();

    let (cfg, cfg_path) = match &cli.config {
        Some(path) => (ResearchConfig::load_from(path)?, path.clone()),
        None => ResearchConfig::load_default()?,
    };
    tracing::info!(path = %cfg_path.display(), "config loaded");

    if let Some(days) = cli.prune_cache_days {
        let store = FileDecisionStore::open(&cfg.llm.cache_dir)
            .with_context(|| format!("opening cache {}", cfg.llm.cache_dir.display()))?;
        let removed = store.prune_older_than(days).context("pruning decision cache")?;
        println!("Removed {removed} cache entries older than {days} days");
        return Ok(());
    }

    let metrics = match &cli.metrics_out {
        Some(_) => Some(Metrics::init()?),
        None => None,
    };

    let opts = RunOptions {
        days: cli.days,
        source: cli.source.clone(),
        journal: cli.journal.clone(),
        min_score: cli.min_score,
        use_llm: cli.use_llm,
        deadline: cli.deadline_secs.map(Duration::from_secs),
    };
    let started = Utc::now();
    let pipeline = Pipeline::from_config(&cfg, &opts, started)
        .with_context(|| format!("invalid configuration in {}", cfg_path.display()))?;

    let report = pipeline.run().await;

    let mode = if cli.summary {
        ReportMode::Summary
    } else {
        ReportMode::Full
    };
    let path = write_report(&report, mode, &cli.output_dir, Utc::now())?;

    if let (Some(m), Some(out)) = (&metrics, &cli.metrics_out) {
        m.write_to(out)?;
    }

    let s = &report.summary;
    println!(
        "{} papers reported ({} fetched, {} duplicates, {} unscored, {} adapter failures)",
        report.tiers.len(),
        s.fetched,
        s.dedup_removed,
        s.unscored,
        s.fetch_errors.len()
    );
    println!("Report saved to: {}", path.display());
    Ok(())
}
