// src/config/mod.rs
//! Run configuration: one TOML (or JSON) document with search, keyword, source, pacing,
//! tier and LLM sections. Everything is validated before any fetching starts.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::DEFAULT_CACHE_DIR;
use crate::error::ConfigError;
use crate::ingest::providers::{
    ArxivAdapter, Body, CrossRefAdapter, CrossRefJournal, RssAdapter, RssJournal,
};
use crate::ingest::{FetchAdapter, Pacing};
use crate::scoring::{derive_model_version, MockProvider, OpenAiCompatibleProvider, ScoringProvider};
use crate::tier::{Thresholds, TierThresholds};

pub const ENV_CONFIG_PATH: &str = "RESEARCH_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/research.toml";
pub const DEFAULT_JSON_PATH: &str = "config/research.json";

/// Feed groups in report order; groups not listed here follow alphabetically.
const RSS_GROUP_ORDER: [&str; 3] = ["sage", "nature", "other"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub search: SearchSection,
    pub keywords: KeywordsSection,
    pub arxiv: ArxivSection,
    /// group -> journal code -> feed
    pub rss: BTreeMap<String, BTreeMap<String, RssJournalCfg>>,
    /// journal code -> ISSN lookup
    pub crossref: BTreeMap<String, CrossRefJournalCfg>,
    pub pacing: PacingSection,
    pub tiers: TiersSection,
    pub llm: LlmSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub default_days: u32,
    pub max_results: usize,
    pub min_score: u32,
    pub deadline_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            default_days: 7,
            max_results: 100,
            min_score: 1,
            deadline_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeywordsSection {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArxivSection {
    pub categories: Vec<String>,
    /// Overrides the public export API, mostly for mirrors.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RssJournalCfg {
    pub name: String,
    /// Feed URL, or `file:<path>` for a local document.
    pub rss: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossRefJournalCfg {
    pub name: String,
    pub issn: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    pub arxiv_ms: u64,
    pub rss_ms: u64,
    pub crossref_ms: u64,
}

impl Default for PacingSection {
    fn default() -> Self {
        let p = Pacing::default();
        Self {
            arxiv_ms: p.arxiv.as_millis() as u64,
            rss_ms: p.rss.as_millis() as u64,
            crossref_ms: p.crossref.as_millis() as u64,
        }
    }
}

impl PacingSection {
    pub fn to_pacing(&self) -> Pacing {
        Pacing {
            arxiv: Duration::from_millis(self.arxiv_ms),
            rss: Duration::from_millis(self.rss_ms),
            crossref: Duration::from_millis(self.crossref_ms),
            ..Pacing::default()
        }
    }
}

fn keyword_thresholds() -> Thresholds {
    Thresholds::KEYWORD
}
fn semantic_thresholds() -> Thresholds {
    Thresholds::SEMANTIC
}

#[derive(Debug, Clone, Deserialize)]
pub struct TiersSection {
    #[serde(default = "keyword_thresholds")]
    pub keyword: Thresholds,
    #[serde(default = "semantic_thresholds")]
    pub semantic: Thresholds,
}

impl Default for TiersSection {
    fn default() -> Self {
        Self {
            keyword: Thresholds::KEYWORD,
            semantic: Thresholds::SEMANTIC,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// "dashscope" | "openai" | "azure" | "mock" (case-insensitive)
    pub provider: String,
    /// "ENV" means: read from DASHSCOPE_API_KEY / OPENAI_API_KEY / AZURE_OPENAI_API_KEY
    pub api_key: String,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
    pub research_interests: String,
    pub min_score: u32,
    pub workers: usize,
    pub cache_dir: PathBuf,
    /// Overrides the derived interest-model version (cache namespace).
    pub model_version: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "dashscope".to_string(),
            api_key: "ENV".to_string(),
            model: None,
            endpoint: None,
            deployment: None,
            api_version: None,
            research_interests: String::new(),
            min_score: 50,
            workers: crate::scoring::DEFAULT_WORKERS,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            model_version: None,
        }
    }
}

impl LlmSection {
    fn provider_kind(&self) -> Result<&'static str, ConfigError> {
        match self.provider.trim().to_ascii_lowercase().as_str() {
            "dashscope" => Ok("dashscope"),
            "openai" => Ok("openai"),
            "azure" => Ok("azure"),
            "mock" => Ok("mock"),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }

    /// Model identifier used in requests and in the derived cache version.
    pub fn model_name(&self) -> Result<String, ConfigError> {
        let model = self.model.clone().filter(|m| !m.trim().is_empty());
        Ok(match self.provider_kind()? {
            "dashscope" => model.unwrap_or_else(|| "qwen-plus".to_string()),
            "openai" => model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            "azure" => self
                .deployment
                .clone()
                .or(model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            _ => model.unwrap_or_else(|| "mock".to_string()),
        })
    }

    pub fn model_version(&self) -> Result<String, ConfigError> {
        match self.model_version.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Ok(derive_model_version(&self.model_name()?, &self.research_interests)),
        }
    }

    fn resolve_api_key(&self, env_var: &'static str) -> Result<String, ConfigError> {
        let raw = self.api_key.trim();
        if !raw.is_empty() && !raw.eq_ignore_ascii_case("env") {
            return Ok(raw.to_string());
        }
        std::env::var(env_var)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey(env_var))
    }

    pub fn build_provider(&self) -> Result<Arc<dyn ScoringProvider>, ConfigError> {
        let kind = self.provider_kind()?;
        let model = self.model_name()?;
        let (provider, key_len): (Arc<dyn ScoringProvider>, usize) = match kind {
            "dashscope" => {
                let key = self.resolve_api_key("DASHSCOPE_API_KEY")?;
                let len = key.len();
                (Arc::new(OpenAiCompatibleProvider::dashscope(key, model.clone())), len)
            }
            "openai" => {
                let key = self.resolve_api_key("OPENAI_API_KEY")?;
                let len = key.len();
                let p = OpenAiCompatibleProvider::openai(key, model.clone(), self.endpoint.as_deref());
                (Arc::new(p), len)
            }
            "azure" => {
                let key = self.resolve_api_key("AZURE_OPENAI_API_KEY")?;
                let endpoint = self.endpoint.as_deref().ok_or(ConfigError::MissingField {
                    provider: "azure",
                    field: "endpoint",
                })?;
                let deployment = self.deployment.as_deref().ok_or(ConfigError::MissingField {
                    provider: "azure",
                    field: "deployment",
                })?;
                let len = key.len();
                let p = OpenAiCompatibleProvider::azure(
                    key,
                    endpoint,
                    deployment,
                    self.api_version.as_deref(),
                );
                (Arc::new(p), len)
            }
            _ => (Arc::new(MockProvider::overlap()), 0),
        };
        // only provider, model and key length; never the key
        tracing::info!(target: "scoring", provider = kind, model = %model, key_len, "semantic provider configured");
        Ok(provider)
    }
}

impl ResearchConfig {
    /// Load from an explicit path. `.json` is parsed as JSON, anything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed = if ext == "json" {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Locate and load the config:
    /// 1) $RESEARCH_CONFIG_PATH
    /// 2) config/research.toml
    /// 3) config/research.json
    pub fn load_default() -> Result<(Self, PathBuf), ConfigError> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(ConfigError::MissingFile(pb));
            }
            return Ok((Self::load_from(&pb)?, pb));
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Ok((Self::load_from(&pb)?, pb));
            }
        }
        Err(ConfigError::MissingFile(PathBuf::from(DEFAULT_TOML_PATH)))
    }

    pub fn tier_thresholds(&self) -> Result<TierThresholds, ConfigError> {
        TierThresholds::new(self.tiers.keyword, self.tiers.semantic)
    }

    /// Fatal checks for the chosen strategy.
    pub fn validate(&self, semantic: bool) -> Result<(), ConfigError> {
        self.tier_thresholds()?;
        if semantic {
            if self.llm.research_interests.trim().is_empty() {
                return Err(ConfigError::EmptyInterests);
            }
            if self.llm.workers == 0 {
                return Err(ConfigError::ZeroWorkers);
            }
            self.llm.provider_kind()?;
        } else {
            let any = self
                .keywords
                .primary
                .iter()
                .chain(&self.keywords.secondary)
                .any(|k| !k.trim().is_empty());
            if !any {
                return Err(ConfigError::EmptyKeywords);
            }
        }
        Ok(())
    }

    fn rss_groups_in_order(&self) -> Vec<&String> {
        let mut groups: Vec<&String> = self.rss.keys().collect();
        groups.sort_by_key(|g| {
            let pos = RSS_GROUP_ORDER
                .iter()
                .position(|known| g.eq_ignore_ascii_case(known))
                .unwrap_or(RSS_GROUP_ORDER.len());
            (pos, g.to_ascii_lowercase())
        });
        groups
    }

    /// Adapters for a source selection (`all`, `arxiv`, `crossref` or an RSS group) and
    /// an optional journal code, in canonical order.
    pub fn build_adapters(
        &self,
        source: &str,
        journal: Option<&str>,
    ) -> Result<Vec<Arc<dyn FetchAdapter>>, ConfigError> {
        let source = source.trim().to_ascii_lowercase();
        let is_group = self.rss.keys().any(|g| g.eq_ignore_ascii_case(&source));
        if !matches!(source.as_str(), "all" | "arxiv" | "crossref") && !is_group {
            return Err(ConfigError::UnknownSource(source));
        }
        let wants = |name: &str| source == "all" || source.eq_ignore_ascii_case(name);
        let journal_ok = |code: &str| journal.map_or(true, |j| j.eq_ignore_ascii_case(code));

        let mut adapters: Vec<Arc<dyn FetchAdapter>> = Vec::new();
        // something exists for the selection, before the journal filter applies
        let mut configured = false;

        if wants("arxiv") && !self.arxiv.categories.is_empty() {
            configured = true;
            let max = self.search.max_results;
            let cats = self.arxiv.categories.clone();
            let adapter = match &self.arxiv.endpoint {
                Some(ep) => ArxivAdapter::with_endpoint(cats, max, ep.clone()),
                None => ArxivAdapter::new(cats, max),
            };
            adapters.push(Arc::new(adapter));
        }

        for group in self.rss_groups_in_order() {
            if !wants(group) || self.rss[group].is_empty() {
                continue;
            }
            configured = true;
            let mut journals = Vec::new();
            for (code, j) in &self.rss[group] {
                if journal_ok(code) {
                    journals.push(RssJournal::new(code.clone(), j.name.clone(), feed_body(&j.rss)?));
                }
            }
            if journals.is_empty() {
                tracing::warn!(target: "ingest", group = %group, journal = ?journal, "journal not found in group");
                continue;
            }
            adapters.push(Arc::new(RssAdapter::new(display_group(group), journals)));
        }

        if wants("crossref") && !self.crossref.is_empty() {
            configured = true;
            let journals: Vec<CrossRefJournal> = self
                .crossref
                .iter()
                .filter(|(code, _)| journal_ok(code))
                .map(|(code, j)| CrossRefJournal::new(code.clone(), j.name.clone(), j.issn.clone()))
                .collect();
            if journals.is_empty() {
                tracing::warn!(target: "ingest", journal = ?journal, "journal not found among CrossRef journals");
            } else {
                adapters.push(Arc::new(CrossRefAdapter::new(journals, self.search.max_results)));
            }
        }

        if !configured {
            return Err(ConfigError::NoAdapters(source));
        }
        Ok(adapters)
    }
}

fn feed_body(raw: &str) -> Result<Body, ConfigError> {
    match raw.strip_prefix("file:") {
        Some(path) => {
            let path = PathBuf::from(path);
            fs::read_to_string(&path)
                .map(Body::Fixture)
                .map_err(|source| ConfigError::Read { path, source })
        }
        None => Ok(Body::Url(raw.to_string())),
    }
}

/// `sage` -> `SAGE`, `nature` -> `Nature`, others capitalized.
fn display_group(group: &str) -> String {
    if group.eq_ignore_ascii_case("sage") {
        return "SAGE".to_string();
    }
    let mut chars = group.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
