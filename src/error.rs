// src/error.rs
//! Error kinds of a pipeline run.
//!
//! Only [`ConfigError`] aborts a run. The other kinds are recovered where they happen
//! and end up counted in the run summary.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// One adapter failed as a whole. The run keeps going with the other adapters.
#[derive(Debug, Error)]
#[error("adapter `{adapter}` failed: {cause}")]
pub struct FetchError {
    pub adapter: String,
    pub cause: FetchFailure,
}

impl FetchError {
    pub fn new(adapter: impl Into<String>, cause: FetchFailure) -> Self {
        Self {
            adapter: adapter.into(),
            cause,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Parse(String),
    #[error("all {attempted} requests failed, last error: {last}")]
    AllRequestsFailed { attempted: usize, last: String },
    #[error("run deadline of {0:?} elapsed before the adapter finished")]
    Deadline(Duration),
    #[error("adapter task aborted: {0}")]
    Aborted(String),
}

/// The semantic provider could not score one paper. That paper becomes `Unscored`.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("scoring provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unparsable scoring response: {0}")]
    InvalidResponse(String),
    #[error("scoring provider unavailable: {0}")]
    Unavailable(String),
}

/// A persisted cache entry could not be read back. Treated as a miss.
#[derive(Debug, Error)]
#[error("corrupt cache entry {key}: {reason}")]
pub struct CacheCorruptionError {
    pub key: String,
    pub reason: String,
}

/// Invalid run configuration. Fatal, raised before any fetching happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("config path {0} does not exist")]
    MissingFile(PathBuf),
    #[error("keyword scoring needs at least one primary or secondary keyword")]
    EmptyKeywords,
    #[error("semantic scoring needs a non-empty research_interests description")]
    EmptyInterests,
    #[error("invalid {mode} tier thresholds: high={high}, medium={medium}, low={low} must be strictly descending")]
    InvalidThresholds {
        mode: &'static str,
        high: u32,
        medium: u32,
        low: u32,
    },
    #[error("unknown LLM provider `{0}` (expected dashscope, openai, azure or mock)")]
    UnknownProvider(String),
    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),
    #[error("provider `{provider}` needs `{field}` in [llm]")]
    MissingField {
        provider: &'static str,
        field: &'static str,
    },
    #[error("unknown source selection `{0}`")]
    UnknownSource(String),
    #[error("no adapters selected: source `{0}` has nothing configured")]
    NoAdapters(String),
    #[error("semantic worker count must be at least 1")]
    ZeroWorkers,
    #[error("a window of {0} days reaches outside the representable date range")]
    InvalidWindow(u32),
    #[error("run deadline of {0:?} is too large")]
    InvalidDeadline(Duration),
}
