// src/lib.rs
// Library surface shared by the binary and the integration tests.

pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod tier;

pub use error::{CacheCorruptionError, ConfigError, FetchError, FetchFailure, ScoringError};
pub use model::{Fingerprint, Paper, ScoreResult, SourceRecord, StrategyTag, Tier};
pub use pipeline::{Pipeline, RunOptions, RunReport, RunSummary};
