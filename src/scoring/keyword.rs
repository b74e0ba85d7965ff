// src/scoring/keyword.rs
//! Keyword strategy: weighted word-boundary matching over title + abstract.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeSet;

use crate::error::ConfigError;
use crate::model::{Paper, ScoreResult, StrategyTag};

pub const PRIMARY_WEIGHT: u32 = 10;
pub const SECONDARY_WEIGHT: u32 = 3;

#[derive(Debug, Clone)]
struct Term {
    keyword: String,
    re: Regex,
}

/// Word-boundary matcher for one keyword. `\b` is only emitted next to word characters,
/// so keywords such as `c++` still match.
fn compile(keyword: &str) -> Result<Regex, ConfigError> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lead = if keyword.chars().next().is_some_and(is_word) { r"\b" } else { "" };
    let tail = if keyword.chars().last().is_some_and(is_word) { r"\b" } else { "" };
    let pattern = format!("(?u){lead}{}{tail}", regex::escape(keyword));
    Regex::new(&pattern).map_err(|e| ConfigError::Parse {
        path: "keywords".into(),
        reason: format!("keyword `{keyword}`: {e}"),
    })
}

/// Trim, lowercase, drop empties and repeats; keeps first-seen order.
fn clean(list: &[String], exclude: &BTreeSet<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    list.iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && !exclude.contains(k) && seen.insert(k.clone()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct KeywordScorer {
    primary: Vec<Term>,
    secondary: Vec<Term>,
    scored_at: DateTime<Utc>,
}

impl KeywordScorer {
    /// `scored_at` is stamped on every result so repeated scoring is reproducible.
    pub fn new(
        primary: &[String],
        secondary: &[String],
        scored_at: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        let primary = clean(primary, &BTreeSet::new());
        let primary_set: BTreeSet<String> = primary.iter().cloned().collect();
        // A keyword in both lists counts as primary only.
        let secondary = clean(secondary, &primary_set);
        if primary.is_empty() && secondary.is_empty() {
            return Err(ConfigError::EmptyKeywords);
        }
        let build = |list: Vec<String>| -> Result<Vec<Term>, ConfigError> {
            list.into_iter()
                .map(|keyword| Ok(Term { re: compile(&keyword)?, keyword }))
                .collect()
        };
        Ok(Self {
            primary: build(primary)?,
            secondary: build(secondary)?,
            scored_at,
        })
    }

    pub fn keyword_count(&self) -> (usize, usize) {
        (self.primary.len(), self.secondary.len())
    }

    pub fn score(&self, paper: &Paper) -> ScoreResult {
        let text = format!("{} {}", paper.title, paper.abstract_text).to_lowercase();
        let hits = |terms: &[Term]| -> Vec<String> {
            terms
                .iter()
                .filter(|t| t.re.is_match(&text))
                .map(|t| t.keyword.clone())
                .collect()
        };
        let primary = hits(&self.primary);
        let secondary = hits(&self.secondary);
        let score = PRIMARY_WEIGHT * primary.len() as u32 + SECONDARY_WEIGHT * secondary.len() as u32;

        let mut matched = primary;
        matched.extend(secondary);
        let rationale = if matched.is_empty() {
            "no keywords matched".to_string()
        } else {
            format!("matched: {}", matched.join(", "))
        };

        ScoreResult {
            score,
            rationale,
            matched,
            strategy: StrategyTag::Keyword,
            scored_at: self.scored_at,
            confidence: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 8, 6, 0, 0).unwrap()
    }

    fn paper(title: &str, abs: &str) -> Paper {
        Paper::new(title, vec![], abs, "", ts(), "src", "")
    }

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn weights_distinct_hits_once() {
        let k = KeywordScorer::new(&s(&["gender", "labor market"]), &s(&["wage", "care"]), ts()).unwrap();
        let p = paper(
            "Gender and the housing market",
            "Gender gaps in wage growth; gender again and wage again.",
        );
        let r = k.score(&p);
        assert_eq!(r.matched, vec!["gender", "wage"]);
        assert_eq!(r.score, 10 + 3);
    }

    #[test]
    fn phrase_keywords_match_as_phrases() {
        let k = KeywordScorer::new(&s(&["labor market"]), &[], ts()).unwrap();
        assert_eq!(k.score(&paper("The labor market today", "")).score, 10);
        assert_eq!(k.score(&paper("Labor and market", "")).score, 0);
    }

    #[test]
    fn no_substring_hits() {
        let k = KeywordScorer::new(&s(&["bot"]), &[], ts()).unwrap();
        let r = k.score(&paper("Robot caregivers", "robotics in nursing homes"));
        assert_eq!(r.score, 0);
        assert!(r.matched.is_empty());
        assert_eq!(k.score(&paper("A bot for care", "")).score, 10);
    }

    #[test]
    fn symbols_in_keywords_are_literal() {
        let k = KeywordScorer::new(&s(&["c++", "a.i."]), &[], ts()).unwrap();
        assert_eq!(k.score(&paper("Teaching C++ to sociologists", "")).score, 10);
        assert_eq!(k.score(&paper("abix", "")).score, 0);
    }

    #[test]
    fn overlapping_lists_count_as_primary_and_are_normalized() {
        let k = KeywordScorer::new(&s(&[" Gender ", "gender"]), &s(&["GENDER", "", "care"]), ts()).unwrap();
        assert_eq!(k.keyword_count(), (1, 1));
        assert_eq!(k.score(&paper("gender and care", "")).score, 13);
    }

    #[test]
    fn empty_keyword_sets_are_rejected() {
        let err = KeywordScorer::new(&s(&["  "]), &[], ts()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyKeywords));
    }

    #[test]
    fn scoring_is_deterministic() {
        let k = KeywordScorer::new(&s(&["gender"]), &s(&["care"]), ts()).unwrap();
        let p = paper("Gender and care", "");
        assert_eq!(k.score(&p), k.score(&p));
    }
}
