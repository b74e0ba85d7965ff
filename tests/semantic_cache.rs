// tests/semantic_cache.rs
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use research_weekly_feed::cache::{CacheKey, DecisionStore, FileDecisionStore, MemoryDecisionStore};
use research_weekly_feed::scoring::{
    MockProvider, ScoringEngine, ScoringProvider, SemanticScorer, Verdict,
};
use research_weekly_feed::tier::{classify, TierThresholds};
use research_weekly_feed::{Paper, ScoringError, StrategyTag, Tier};

const INTERESTS: &str = "gender inequality, care work and labor markets";

fn paper(title: &str, abs: &str) -> Paper {
    Paper::new(
        title,
        vec!["A. Author".into()],
        abs,
        "https://x.test/p",
        Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap(),
        "arXiv",
        "",
    )
}

fn verdict(score: u32) -> Verdict {
    Verdict {
        relevant: true,
        confidence: "high".into(),
        score,
        reasoning: "Directly about care work.".into(),
        topics: vec!["care work".into()],
    }
}

#[tokio::test]
async fn same_paper_twice_makes_one_provider_call() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileDecisionStore::open(dir.path()).unwrap());
    let provider = Arc::new(MockProvider::fixed(verdict(82)));
    let scorer = SemanticScorer::new(provider.clone(), store, INTERESTS, "v1").unwrap();

    let p = paper("Unpaid care work", "Time-use evidence.");
    let first = scorer.score(&p).await.unwrap();
    let second = scorer.score(&p).await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(first.score, 82);
    assert_eq!(first.strategy, StrategyTag::Semantic);
    assert_eq!(first.matched, vec!["care work"]);

    let stats = scorer.stats().snapshot();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.provider_calls, 1);
}

#[tokio::test]
async fn cache_survives_across_scorers_until_the_version_changes() {
    let dir = tempfile::tempdir().unwrap();
    let p = paper("Unpaid care work", "Time-use evidence.");

    let provider = Arc::new(MockProvider::fixed(verdict(60)));
    let store = Arc::new(FileDecisionStore::open(dir.path()).unwrap());
    let run1 = SemanticScorer::new(provider.clone(), store.clone(), INTERESTS, "v1").unwrap();
    run1.score(&p).await.unwrap();

    // next run, same version: served from disk
    let run2 = SemanticScorer::new(provider.clone(), store.clone(), INTERESTS, "v1").unwrap();
    run2.score(&p).await.unwrap();
    assert_eq!(provider.calls(), 1);

    // changed interests => new version => fresh call
    let run3 = SemanticScorer::new(provider.clone(), store, INTERESTS, "v2").unwrap();
    run3.score(&p).await.unwrap();
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn corrupt_entry_is_a_miss_and_gets_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileDecisionStore::open(dir.path()).unwrap());
    let p = paper("Unpaid care work", "Time-use evidence.");
    let key = CacheKey::new(p.fingerprint().clone(), "v1");
    std::fs::write(store.path_for(&key), "{ not json").unwrap();
    assert!(store.get(&key).is_err());

    let provider = Arc::new(MockProvider::fixed(verdict(70)));
    let scorer = SemanticScorer::new(provider.clone(), store.clone(), INTERESTS, "v1").unwrap();
    let res = scorer.score(&p).await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(scorer.stats().snapshot().cache_corrupt, 1);
    let reread = store.get(&key).expect("entry readable again").expect("entry present");
    assert_eq!(reread, res);
}

#[tokio::test]
async fn provider_failure_becomes_unscored_and_is_not_cached() {
    let store = Arc::new(MemoryDecisionStore::new());
    let scorer = SemanticScorer::new(
        Arc::new(MockProvider::failing("quota exceeded")),
        store.clone(),
        INTERESTS,
        "v1",
    )
    .unwrap();
    let engine = ScoringEngine::semantic(scorer, 2);
    let scored = engine
        .score_all(vec![paper("Care work", ""), paper("Labor markets", "x")])
        .await;
    assert_eq!(scored.len(), 2);
    assert!(scored.iter().all(|(_, r)| r.is_err()));
    assert_eq!(engine.stats().errors, 2);
    assert!(store.is_empty());

    let t = TierThresholds::default();
    for (_, r) in &scored {
        let tier = classify(r.as_ref().ok(), StrategyTag::Semantic, &t);
        assert_eq!(tier, Tier::Unscored);
    }
}

#[tokio::test]
async fn bounded_workers_keep_input_order() {
    let store = Arc::new(MemoryDecisionStore::new());
    let provider = Arc::new(MockProvider::overlap());
    let scorer = SemanticScorer::new(provider.clone(), store.clone(), INTERESTS, "v1").unwrap();
    let engine = ScoringEngine::semantic(scorer, 3);

    let papers: Vec<Paper> = (0..10)
        .map(|i| paper(&format!("Study {i} of gender inequality"), "labor markets"))
        .collect();
    let titles: Vec<String> = papers.iter().map(|p| p.title.clone()).collect();
    let scored = engine.score_all(papers).await;

    let out: Vec<String> = scored.iter().map(|(p, _)| p.title.clone()).collect();
    assert_eq!(out, titles);
    assert_eq!(provider.calls(), 10);
    assert_eq!(store.len(), 10);
    // "gender", "inequality", "labor", "markets" overlap
    assert!(scored.iter().all(|(_, r)| r.as_ref().unwrap().score == 80));
}

/// Holds each call open briefly and records the peak number of overlapping calls.
#[derive(Default)]
struct SlowProvider {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ScoringProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn submit(&self, _paper: &str, _interests: &str) -> Result<Verdict, ScoringError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(verdict(55))
    }
}

#[tokio::test(start_paused = true)]
async fn semantic_calls_never_exceed_the_worker_count() {
    let provider = Arc::new(SlowProvider::default());
    let scorer = SemanticScorer::new(
        provider.clone(),
        Arc::new(MemoryDecisionStore::new()),
        INTERESTS,
        "v1",
    )
    .unwrap();
    let engine = ScoringEngine::semantic(scorer, 3);

    let papers: Vec<Paper> = (0..10)
        .map(|i| paper(&format!("Care work study {i}"), "time use"))
        .collect();
    let scored = engine.score_all(papers).await;

    assert_eq!(scored.len(), 10);
    assert!(scored.iter().all(|(_, r)| r.is_ok()));
    let peak = provider.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak}");
    // the pool is actually used, not serialized
    assert!(peak > 1, "peak concurrency {peak}");
    assert_eq!(provider.in_flight.load(Ordering::SeqCst), 0);
}
