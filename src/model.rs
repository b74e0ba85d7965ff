// src/model.rs
//! Canonical record model shared by every adapter, the deduplicator and the scorers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ingest::normalize_text;

/// Raw output of one adapter before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    pub source: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub link: Option<String>,
    pub doi: Option<String>,
    pub published: Option<DateTime<Utc>>,
    /// Source-specific extras (categories, pdf link, issn, ...).
    pub attributes: BTreeMap<String, String>,
}

/// Identity key of a logical paper within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Normalized title plus DOI when present. Falls back to the URL only when the title
    /// normalizes to nothing. The URL is otherwise left out, so DOI-less copies of one
    /// title listed at different URLs get the same key and merge in dedup.
    pub fn compute(title: &str, doi: &str, url: &str) -> Self {
        let t = normalize_title(title);
        let d = normalize_doi(doi);
        let key = match (t.is_empty(), d.is_empty()) {
            (false, true) => t,
            (false, false) => format!("{t}|doi:{d}"),
            (true, false) => format!("doi:{d}"),
            (true, true) => format!("url:{}", url.trim()),
        };
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The normalized-title part of the key (empty for URL/DOI-only keys).
    pub fn title_key(&self) -> &str {
        if self.0.starts_with("url:") || self.0.starts_with("doi:") {
            return "";
        }
        self.0.split("|doi:").next().unwrap_or_default()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_space = false;
    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

/// Lowercase DOI without resolver prefix.
pub fn normalize_doi(doi: &str) -> String {
    let d = doi.trim().to_lowercase();
    let d = d
        .strip_prefix("https://doi.org/")
        .or_else(|| d.strip_prefix("http://doi.org/"))
        .or_else(|| d.strip_prefix("http://dx.doi.org/"))
        .or_else(|| d.strip_prefix("doi:"))
        .unwrap_or(&d);
    d.trim().to_string()
}

/// Canonical paper. The fingerprint is derived on construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paper {
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub url: String,
    pub published: DateTime<Utc>,
    pub source: String,
    pub doi: String,
    fingerprint: Fingerprint,
}

impl Paper {
    pub fn new(
        title: impl Into<String>,
        authors: Vec<String>,
        abstract_text: impl Into<String>,
        url: impl Into<String>,
        published: DateTime<Utc>,
        source: impl Into<String>,
        doi: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let url = url.into();
        let doi = doi.into();
        let fingerprint = Fingerprint::compute(&title, &doi, &url);
        Self {
            title,
            authors,
            abstract_text: abstract_text.into(),
            url,
            published,
            source: source.into(),
            doi,
            fingerprint,
        }
    }

    /// Normalize a raw record. `None` when the record has no usable title.
    /// `fallback_date` stands in for records that carry no date.
    pub fn from_record(rec: SourceRecord, fallback_date: DateTime<Utc>) -> Option<Self> {
        let title = normalize_text(rec.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            return None;
        }
        let abstract_text = rec
            .abstract_text
            .as_deref()
            .map(normalize_text)
            .unwrap_or_default();
        let mut authors: Vec<String> = rec
            .authors
            .iter()
            .flat_map(|a| split_authors(a))
            .collect();
        if authors.is_empty() {
            authors.push("Unknown".to_string());
        }
        let doi = rec.doi.as_deref().map(normalize_doi).unwrap_or_default();
        Some(Self::new(
            title,
            authors,
            abstract_text,
            rec.link.unwrap_or_default().trim(),
            rec.published.unwrap_or(fallback_date),
            rec.source,
            doi,
        ))
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn has_abstract(&self) -> bool {
        !self.abstract_text.trim().is_empty()
    }

    pub fn has_doi(&self) -> bool {
        !self.doi.trim().is_empty()
    }
}

/// Split a single author string on common separators (", ", "; ", " and ").
pub fn split_authors(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let parts: Vec<&str> = if raw.contains(';') {
        raw.split(';').collect()
    } else if raw.contains(',') {
        raw.split(',').collect()
    } else if raw.to_lowercase().contains(" and ") {
        raw.split(" and ").collect()
    } else {
        vec![raw]
    };
    parts
        .into_iter()
        .map(|p| p.trim().trim_start_matches("and ").trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Which strategy produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyTag {
    Keyword,
    Semantic,
}

impl StrategyTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyTag::Keyword => "keyword",
            StrategyTag::Semantic => "semantic",
        }
    }
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: u32,
    /// Human-readable explanation (matched keywords or the model's reasoning).
    pub rationale: String,
    /// Matched keywords (keyword mode) or relevant topics (semantic mode).
    #[serde(default)]
    pub matched: Vec<String>,
    pub strategy: StrategyTag,
    pub scored_at: DateTime<Utc>,
    /// Model confidence label, semantic mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    High,
    Medium,
    Low,
    BelowThreshold,
    Unscored,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::High,
        Tier::Medium,
        Tier::Low,
        Tier::BelowThreshold,
        Tier::Unscored,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Tier::High => "High relevance",
            Tier::Medium => "Medium relevance",
            Tier::Low => "Low relevance",
            Tier::BelowThreshold => "Below threshold",
            Tier::Unscored => "Unscored",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn title_normalization_collapses_case_space_and_punct() {
        assert_eq!(normalize_title("  Gender Gaps: In STEM!  "), "gender gaps in stem");
        assert_eq!(normalize_title("gender   gaps in stem "), "gender gaps in stem");
        assert_eq!(normalize_title("?!"), "");
    }

    #[test]
    fn fingerprint_uses_doi_when_present_and_ignores_url_otherwise() {
        let a = Fingerprint::compute("Gender Gaps In STEM", "", "https://a.test/1");
        let b = Fingerprint::compute("gender gaps in stem ", "", "https://b.test/2");
        assert_eq!(a, b);

        let c = Fingerprint::compute("Gender Gaps In STEM", "10.1/ABC", "");
        assert_eq!(c.as_str(), "gender gaps in stem|doi:10.1/abc");
        assert_eq!(c.title_key(), "gender gaps in stem");
        assert_ne!(a, c);
    }

    #[test]
    fn fingerprint_falls_back_to_url_for_empty_titles() {
        let f = Fingerprint::compute("...", "", " https://x.test/p ");
        assert_eq!(f.as_str(), "url:https://x.test/p");
        assert_eq!(f.title_key(), "");
    }

    #[test]
    fn doi_prefixes_are_stripped() {
        assert_eq!(normalize_doi("https://doi.org/10.1177/X"), "10.1177/x");
        assert_eq!(normalize_doi("doi:10.1/y "), "10.1/y");
    }

    #[test]
    fn from_record_requires_title_and_fills_defaults() {
        let rec = SourceRecord {
            source: "Nature".into(),
            title: Some("  <b>Networks</b> of &amp; care ".into()),
            authors: vec!["Ada Lovelace; Alan Turing".into()],
            abstract_text: Some("<p>Some   text.</p>".into()),
            ..Default::default()
        };
        let p = Paper::from_record(rec, ts()).expect("paper");
        assert_eq!(p.title, "Networks of & care");
        assert_eq!(p.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(p.abstract_text, "Some text.");
        assert_eq!(p.published, ts());
        assert!(!p.has_doi());

        let empty = SourceRecord {
            title: Some("   ".into()),
            ..Default::default()
        };
        assert!(Paper::from_record(empty, ts()).is_none());
    }

    #[test]
    fn missing_authors_become_unknown() {
        let rec = SourceRecord {
            title: Some("T".into()),
            ..Default::default()
        };
        let p = Paper::from_record(rec, ts()).unwrap();
        assert_eq!(p.authors, vec!["Unknown"]);
    }

    #[test]
    fn author_strings_split_on_and() {
        assert_eq!(split_authors("A. Smith and B. Jones"), vec!["A. Smith", "B. Jones"]);
        assert_eq!(split_authors("Solo Author"), vec!["Solo Author"]);
    }
}
