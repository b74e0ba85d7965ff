// src/tier.rs
//! Score -> tier buckets. Thresholds are always passed in.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::{Paper, ScoreResult, StrategyTag, Tier};

/// Lower bounds: `score >= high` is High, `>= medium` Medium, `>= low` Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Thresholds {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Thresholds {
    pub const KEYWORD: Thresholds = Thresholds {
        high: 20,
        medium: 10,
        low: 1,
    };
    pub const SEMANTIC: Thresholds = Thresholds {
        high: 75,
        medium: 50,
        low: 1,
    };

    fn validate(&self, mode: &'static str) -> Result<(), ConfigError> {
        if self.high > self.medium && self.medium > self.low {
            Ok(())
        } else {
            Err(ConfigError::InvalidThresholds {
                mode,
                high: self.high,
                medium: self.medium,
                low: self.low,
            })
        }
    }

    pub fn tier_for(&self, score: u32) -> Tier {
        if score >= self.high {
            Tier::High
        } else if score >= self.medium {
            Tier::Medium
        } else if score >= self.low {
            Tier::Low
        } else {
            Tier::BelowThreshold
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierThresholds {
    keyword: Thresholds,
    semantic: Thresholds,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            keyword: Thresholds::KEYWORD,
            semantic: Thresholds::SEMANTIC,
        }
    }
}

impl TierThresholds {
    pub fn new(keyword: Thresholds, semantic: Thresholds) -> Result<Self, ConfigError> {
        keyword.validate("keyword")?;
        semantic.validate("semantic")?;
        Ok(Self { keyword, semantic })
    }

    pub fn for_mode(&self, mode: StrategyTag) -> &Thresholds {
        match mode {
            StrategyTag::Keyword => &self.keyword,
            StrategyTag::Semantic => &self.semantic,
        }
    }
}

/// `None` means scoring failed for that paper.
pub fn classify(score: Option<&ScoreResult>, mode: StrategyTag, thresholds: &TierThresholds) -> Tier {
    match score {
        None => Tier::Unscored,
        Some(r) => thresholds.for_mode(mode).tier_for(r.score),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TieredEntry {
    pub paper: Paper,
    pub score: Option<ScoreResult>,
    pub tier: Tier,
}

impl TieredEntry {
    pub fn score_value(&self) -> u32 {
        self.score.as_ref().map_or(0, |s| s.score)
    }
}

/// One list per tier, each sorted by score descending (ties keep input order).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TieredResults {
    high: Vec<TieredEntry>,
    medium: Vec<TieredEntry>,
    low: Vec<TieredEntry>,
    below: Vec<TieredEntry>,
    unscored: Vec<TieredEntry>,
}

impl TieredResults {
    pub fn from_entries(entries: impl IntoIterator<Item = TieredEntry>) -> Self {
        let mut out = Self::default();
        for e in entries {
            out.bucket_mut(e.tier).push(e);
        }
        for tier in Tier::ALL {
            out.bucket_mut(tier)
                .sort_by_key(|e| std::cmp::Reverse(e.score_value()));
        }
        out
    }

    fn bucket_mut(&mut self, tier: Tier) -> &mut Vec<TieredEntry> {
        match tier {
            Tier::High => &mut self.high,
            Tier::Medium => &mut self.medium,
            Tier::Low => &mut self.low,
            Tier::BelowThreshold => &mut self.below,
            Tier::Unscored => &mut self.unscored,
        }
    }

    pub fn tier(&self, tier: Tier) -> &[TieredEntry] {
        match tier {
            Tier::High => &self.high,
            Tier::Medium => &self.medium,
            Tier::Low => &self.low,
            Tier::BelowThreshold => &self.below,
            Tier::Unscored => &self.unscored,
        }
    }

    /// Non-empty tiers in report order.
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &[TieredEntry])> {
        Tier::ALL
            .into_iter()
            .map(move |t| (t, self.tier(t)))
            .filter(|(_, list)| !list.is_empty())
    }

    pub fn len(&self) -> usize {
        Tier::ALL.iter().map(|t| self.tier(*t).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop scored entries below `min_score`. Unscored entries are always kept.
    pub fn retain_min_score(&mut self, min_score: u32) {
        for tier in Tier::ALL {
            if tier == Tier::Unscored {
                continue;
            }
            self.bucket_mut(tier).retain(|e| e.score_value() >= min_score);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn result(score: u32, strategy: StrategyTag) -> ScoreResult {
        ScoreResult {
            score,
            rationale: String::new(),
            matched: vec![],
            strategy,
            scored_at: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            confidence: None,
        }
    }

    #[test]
    fn keyword_boundaries() {
        let t = TierThresholds::default();
        let k = StrategyTag::Keyword;
        assert_eq!(classify(Some(&result(20, k)), k, &t), Tier::High);
        assert_eq!(classify(Some(&result(19, k)), k, &t), Tier::Medium);
        assert_eq!(classify(Some(&result(10, k)), k, &t), Tier::Medium);
        assert_eq!(classify(Some(&result(9, k)), k, &t), Tier::Low);
        assert_eq!(classify(Some(&result(1, k)), k, &t), Tier::Low);
        assert_eq!(classify(Some(&result(0, k)), k, &t), Tier::BelowThreshold);
    }

    #[test]
    fn semantic_boundaries() {
        let t = TierThresholds::default();
        let s = StrategyTag::Semantic;
        assert_eq!(classify(Some(&result(75, s)), s, &t), Tier::High);
        assert_eq!(classify(Some(&result(74, s)), s, &t), Tier::Medium);
        assert_eq!(classify(Some(&result(50, s)), s, &t), Tier::Medium);
        assert_eq!(classify(Some(&result(49, s)), s, &t), Tier::Low);
        assert_eq!(classify(Some(&result(0, s)), s, &t), Tier::BelowThreshold);
    }

    #[test]
    fn failed_scoring_is_unscored_not_below() {
        let t = TierThresholds::default();
        assert_eq!(classify(None, StrategyTag::Semantic, &t), Tier::Unscored);
    }

    #[test]
    fn thresholds_come_from_configuration() {
        let t = TierThresholds::new(
            Thresholds { high: 5, medium: 3, low: 2 },
            Thresholds::SEMANTIC,
        )
        .unwrap();
        let k = StrategyTag::Keyword;
        assert_eq!(classify(Some(&result(5, k)), k, &t), Tier::High);
        assert_eq!(classify(Some(&result(1, k)), k, &t), Tier::BelowThreshold);
    }

    #[test]
    fn non_descending_thresholds_are_rejected() {
        let err = TierThresholds::new(
            Thresholds::KEYWORD,
            Thresholds { high: 50, medium: 50, low: 1 },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThresholds { mode: "semantic", .. }));
    }
}
