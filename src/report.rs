// src/report.rs
//! Markdown rendering of a [`RunReport`]: a full report with abstracts, or a compact
//! summary with one table per tier.

use anyhow::Context;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::model::{StrategyTag, Tier};
use crate::pipeline::{RunReport, RunSummary};
use crate::tier::{Thresholds, TieredEntry};

const MAX_AUTHORS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Full,
    Summary,
}

impl ReportMode {
    pub fn file_name(self, generated_at: DateTime<Utc>) -> String {
        let date = generated_at.format("%Y-%m-%d");
        match self {
            ReportMode::Full => format!("research_papers_{date}.md"),
            ReportMode::Summary => format!("summary_{date}.md"),
        }
    }
}

/// "A, B, C, et al." past three names.
pub fn format_authors(authors: &[String]) -> String {
    if authors.len() <= MAX_AUTHORS {
        authors.join(", ")
    } else {
        format!("{}, et al.", authors[..MAX_AUTHORS].join(", "))
    }
}

fn tier_range(tier: Tier, t: &Thresholds) -> String {
    match tier {
        Tier::High => format!("score >= {}", t.high),
        Tier::Medium => format!("score {}-{}", t.medium, t.high.saturating_sub(1)),
        Tier::Low => format!("score {}-{}", t.low, t.medium.saturating_sub(1)),
        Tier::BelowThreshold => format!("score < {}", t.low),
        Tier::Unscored => "scoring failed; kept for manual review".to_string(),
    }
}

/// Table cells must not break the row.
fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

fn score_label(e: &TieredEntry) -> String {
    e.score
        .as_ref()
        .map_or_else(|| "n/a".to_string(), |s| s.score.to_string())
}

pub fn render(report: &RunReport, mode: ReportMode, generated_at: DateTime<Utc>) -> String {
    let mut md = String::new();
    let title = match mode {
        ReportMode::Full => "Research Paper Weekly Feed",
        ReportMode::Summary => "Research Paper Summary",
    };
    let strategy = match report.strategy {
        StrategyTag::Keyword => "keyword matching",
        StrategyTag::Semantic => "semantic (LLM) scoring",
    };
    let _ = writeln!(md, "# {title}\n");
    let _ = writeln!(md, "**Generated:** {}\n", generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(
        md,
        "**Time Range:** {} to {} ({} days)\n",
        report.window.start.format("%Y-%m-%d"),
        report.window.end.format("%Y-%m-%d"),
        report.window.days()
    );
    let _ = writeln!(md, "**Scoring:** {strategy}\n");
    let sources = report.sources();
    if !sources.is_empty() {
        let _ = writeln!(md, "**Sources:** {}\n", sources.join(", "));
    }
    let _ = writeln!(md, "**Total Papers:** {}\n", report.tiers.len());
    md.push_str("---\n\n");

    md.push_str("## Overview\n\n");
    for tier in Tier::ALL {
        let n = report.tiers.tier(tier).len();
        if n > 0 || matches!(tier, Tier::High | Tier::Medium | Tier::Low) {
            let _ = writeln!(md, "- **{}:** {n} papers", tier.label());
        }
    }
    md.push_str("\n---\n\n");

    for (tier, entries) in report.tiers.iter() {
        let _ = writeln!(md, "## {} ({} papers)\n", tier.label(), entries.len());
        let _ = writeln!(md, "_{}_\n", tier_range(tier, &report.thresholds));
        match mode {
            ReportMode::Full => {
                for e in entries {
                    render_entry(&mut md, e);
                }
            }
            ReportMode::Summary => render_table(&mut md, entries),
        }
    }

    render_run_summary(&mut md, &report.summary, report.strategy);
    md
}

fn render_entry(md: &mut String, e: &TieredEntry) {
    let p = &e.paper;
    let _ = writeln!(md, "### {}\n", p.title);
    let _ = writeln!(md, "**Source:** {}\n", p.source);
    let _ = writeln!(md, "**Authors:** {}\n", format_authors(&p.authors));
    let _ = writeln!(md, "**Published:** {}\n", p.published.format("%Y-%m-%d"));
    let _ = writeln!(md, "**Relevance Score:** {}\n", score_label(e));
    if let Some(s) = &e.score {
        match s.strategy {
            StrategyTag::Semantic => {
                if let Some(c) = &s.confidence {
                    let _ = writeln!(md, "**LLM Confidence:** {c}\n");
                }
                if !s.rationale.is_empty() {
                    let _ = writeln!(md, "**LLM Reasoning:** {}\n", s.rationale);
                }
                if !s.matched.is_empty() {
                    let _ = writeln!(md, "**Relevant Topics:** {}\n", s.matched.join(", "));
                }
            }
            StrategyTag::Keyword => {
                let _ = writeln!(md, "**Matched Keywords:** {}\n", s.matched.join(", "));
            }
        }
    }
    if p.has_doi() {
        let _ = writeln!(md, "**DOI:** {}\n", p.doi);
    }
    let _ = writeln!(md, "**Link:** {}\n", p.url);
    if p.has_abstract() {
        let _ = writeln!(md, "**Abstract:**\n\n{}\n", p.abstract_text);
    }
    md.push_str("---\n\n");
}

fn render_table(md: &mut String, entries: &[TieredEntry]) {
    md.push_str("| Score | Title | Source | Matched | Link |\n");
    md.push_str("|---:|---|---|---|---|\n");
    for e in entries {
        let matched = e
            .score
            .as_ref()
            .map(|s| s.matched.join(", "))
            .unwrap_or_default();
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} |",
            score_label(e),
            cell(&e.paper.title),
            cell(&e.paper.source),
            cell(&matched),
            cell(&e.paper.url)
        );
    }
    md.push('\n');
}

fn render_run_summary(md: &mut String, s: &RunSummary, strategy: StrategyTag) {
    md.push_str("## Run summary\n\n");
    if !s.adapters.is_empty() {
        md.push_str("| Adapter | Papers | Skipped | Failed requests | Time (ms) | Error |\n");
        md.push_str("|---|---:|---:|---:|---:|---|\n");
        for a in &s.adapters {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} |",
                cell(&a.adapter),
                a.papers,
                a.skipped,
                a.failed_requests,
                a.elapsed_ms,
                cell(a.error.as_deref().unwrap_or("")),
            );
        }
        md.push('\n');
    }
    let _ = writeln!(md, "- Fetched: {}", s.fetched);
    let _ = writeln!(md, "- Skipped malformed entries: {}", s.skipped);
    let _ = writeln!(md, "- Removed as duplicates: {}", s.dedup_removed);
    let _ = writeln!(md, "- Scored: {}", s.scored);
    let _ = writeln!(md, "- Scoring failures (unscored): {}", s.unscored);
    let _ = writeln!(md, "- Below minimum score {}: {}", s.min_score, s.filtered_out);
    if strategy == StrategyTag::Semantic {
        let c = &s.scoring;
        let _ = writeln!(
            md,
            "- Decision cache: {} hits, {} misses, {} corrupt, {} write failures",
            c.cache_hits, c.cache_misses, c.cache_corrupt, c.cache_write_failures
        );
        let _ = writeln!(md, "- Provider calls: {}", c.provider_calls);
    }
    if !s.fetch_errors.is_empty() {
        md.push_str("\n**Fetch errors:**\n\n");
        for e in &s.fetch_errors {
            let _ = writeln!(md, "- `{}`: {}", e.adapter, e.cause);
        }
    }
    md.push('\n');
}

/// Render and write into `dir` (created if missing). Returns the file path.
pub fn write_report(
    report: &RunReport,
    mode: ReportMode,
    dir: &Path,
    generated_at: DateTime<Utc>,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(mode.file_name(generated_at));
    std::fs::write(&path, render(report, mode, generated_at))
        .with_context(|| format!("writing report {}", path.display()))?;
    tracing::info!(target: "pipeline", path = %path.display(), papers = report.tiers.len(), "report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, FetchFailure};
    use crate::ingest::{AdapterReport, FetchWindow};
    use crate::model::{Paper, ScoreResult};
    use crate::tier::TieredResults;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 8, 9, 30, 0).unwrap()
    }

    fn entry(title: &str, score: Option<u32>, tier: Tier, abs: &str) -> TieredEntry {
        let paper = Paper::new(
            title,
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            abs,
            "https://x.test/p",
            ts(),
            "Nature Human Behaviour",
            "10.1/x",
        );
        TieredEntry {
            paper,
            score: score.map(|score| ScoreResult {
                score,
                rationale: "matched: gender".into(),
                matched: vec!["gender".into()],
                strategy: StrategyTag::Keyword,
                scored_at: ts(),
                confidence: None,
            }),
            tier,
        }
    }

    fn report() -> RunReport {
        let tiers = TieredResults::from_entries(vec![
            entry("Gender | care", Some(23), Tier::High, "An abstract."),
            entry("Failed one", None, Tier::Unscored, ""),
        ]);
        RunReport {
            window: FetchWindow::last_days(7, ts()),
            strategy: StrategyTag::Keyword,
            thresholds: Thresholds::KEYWORD,
            tiers,
            summary: RunSummary {
                adapters: vec![AdapterReport {
                    adapter: "CrossRef".into(),
                    papers: 0,
                    skipped: 0,
                    failed_requests: 0,
                    elapsed_ms: 12,
                    error: Some("upstream returned status 503".into()),
                }],
                fetch_errors: vec![FetchError::new("CrossRef", FetchFailure::Status(503))],
                unscored: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn authors_are_truncated_after_three() {
        let v: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        assert_eq!(format_authors(&v), "A, B, C, et al.");
        assert_eq!(format_authors(&v[..2]), "A, B");
    }

    #[test]
    fn full_report_has_entries_and_run_summary() {
        let md = render(&report(), ReportMode::Full, ts());
        assert!(md.starts_with("# Research Paper Weekly Feed"));
        assert!(md.contains("## High relevance (1 papers)"));
        assert!(md.contains("_score >= 20_"));
        assert!(md.contains("**Authors:** A, B, C, et al."));
        assert!(md.contains("**Matched Keywords:** gender"));
        assert!(md.contains("**Abstract:**\n\nAn abstract."));
        assert!(md.contains("## Unscored (1 papers)"));
        assert!(md.contains("**Relevance Score:** n/a"));
        assert!(md.contains("- `CrossRef`: upstream returned status 503"));
        assert!(md.contains("- Scoring failures (unscored): 1"));
    }

    #[test]
    fn summary_report_is_a_table_without_abstracts() {
        let md = render(&report(), ReportMode::Summary, ts());
        assert!(md.starts_with("# Research Paper Summary"));
        assert!(md.contains("| 23 | Gender \\| care | Nature Human Behaviour | gender | https://x.test/p |"));
        assert!(!md.contains("An abstract."));
    }

    #[test]
    fn file_names_carry_the_date() {
        assert_eq!(ReportMode::Full.file_name(ts()), "research_papers_2025-03-08.md");
        assert_eq!(ReportMode::Summary.file_name(ts()), "summary_2025-03-08.md");
    }

    #[test]
    fn write_report_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("outputs");
        let path = write_report(&report(), ReportMode::Full, &out, ts()).unwrap();
        assert!(path.ends_with("research_papers_2025-03-08.md"));
        assert!(std::fs::read_to_string(path).unwrap().contains("Gender | care"));
    }
}
