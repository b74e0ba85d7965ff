// src/ingest/providers/mod.rs
pub mod arxiv;
pub mod crossref;
pub mod rss;

use std::time::Duration;

use metrics::histogram;

use crate::error::FetchFailure;

pub use arxiv::ArxivAdapter;
pub use crossref::{CrossRefAdapter, CrossRefJournal};
pub use rss::{RssAdapter, RssJournal};

const USER_AGENT: &str = concat!(
    "research-weekly-feed/",
    env!("CARGO_PKG_VERSION"),
    " (weekly literature digest)"
);

/// Where an adapter reads a document from.
#[derive(Debug, Clone)]
pub enum Body {
    Url(String),
    /// Pre-loaded document; used by tests and offline runs.
    Fixture(String),
}

/// Shared client settings for all adapters.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "http client builder failed; using defaults");
            reqwest::Client::new()
        })
}

/// GET a document and return its body; non-2xx is an error.
pub(crate) async fn get_text(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<String, FetchFailure> {
    let t0 = std::time::Instant::now();
    let resp = client.get(url).query(query).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchFailure::Status(status.as_u16()));
    }
    let body = resp.text().await?;
    histogram!("ingest_http_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(body)
}
