// src/scoring/semantic.rs
//! Semantic strategy: decision cache first, provider on a miss.

use chrono::Utc;
use metrics::counter;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::cache::{CacheKey, DecisionStore};
use crate::error::{ConfigError, ScoringError};
use crate::model::{Paper, ScoreResult, StrategyTag};
use crate::scoring::provider::ScoringProvider;
use crate::scoring::ScoringStats;

const TITLE_ONLY: &str = "[Not available - please evaluate based on title only]";

/// Text handed to the provider: source, title and abstract (or the title-only marker).
pub fn paper_summary(paper: &Paper) -> String {
    let abstract_text = if paper.has_abstract() {
        paper.abstract_text.as_str()
    } else {
        TITLE_ONLY
    };
    format!(
        "Source: {}\nTitle: {}\nAbstract: {}",
        paper.source, paper.title, abstract_text
    )
}

/// Short stable version tag for an interest model: first 12 hex chars of
/// sha256(model + interests).
pub fn derive_model_version(model: &str, interests: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\n");
    hasher.update(interests.trim().as_bytes());
    hasher
        .finalize()
        .iter()
        .take(6)
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub struct SemanticScorer {
    provider: Arc<dyn ScoringProvider>,
    store: Arc<dyn DecisionStore>,
    interests: String,
    model_version: String,
    stats: ScoringStats,
}

impl SemanticScorer {
    pub fn new(
        provider: Arc<dyn ScoringProvider>,
        store: Arc<dyn DecisionStore>,
        interests: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let interests = interests.into().trim().to_string();
        if interests.is_empty() {
            return Err(ConfigError::EmptyInterests);
        }
        Ok(Self {
            provider,
            store,
            interests,
            model_version: model_version.into(),
            stats: ScoringStats::default(),
        })
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn stats(&self) -> &ScoringStats {
        &self.stats
    }

    pub async fn score(&self, paper: &Paper) -> Result<ScoreResult, ScoringError> {
        let key = CacheKey::new(paper.fingerprint().clone(), self.model_version.clone());

        match self.store.get(&key) {
            Ok(Some(hit)) => {
                self.stats.hit();
                counter!("scoring_cache_hits_total").increment(1);
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(target: "scoring", key = %e.key, reason = %e.reason, "corrupt cache entry treated as miss");
                self.stats.corrupt();
                counter!("scoring_cache_corrupt_total").increment(1);
            }
        }
        self.stats.miss();
        counter!("scoring_cache_misses_total").increment(1);

        self.stats.provider_call();
        counter!("scoring_provider_calls_total", "provider" => self.provider.name().to_string())
            .increment(1);
        let verdict = match self
            .provider
            .submit(&paper_summary(paper), &self.interests)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                self.stats.error();
                counter!("scoring_errors_total").increment(1);
                tracing::warn!(target: "scoring", fingerprint = %paper.fingerprint(), error = %e, "semantic scoring failed");
                return Err(e);
            }
        };

        let result = ScoreResult {
            score: verdict.score.min(100),
            rationale: verdict.reasoning,
            matched: verdict.topics,
            strategy: StrategyTag::Semantic,
            scored_at: Utc::now(),
            confidence: Some(verdict.confidence),
        };
        if let Err(e) = self.store.put(&key, &result) {
            self.stats.write_failure();
            tracing::warn!(target: "scoring", error = %e, "failed to persist decision");
        }
        tracing::debug!(target: "scoring", fingerprint = %paper.fingerprint(), score = result.score, relevant = verdict.relevant, "scored");
        Ok(result)
    }
}
