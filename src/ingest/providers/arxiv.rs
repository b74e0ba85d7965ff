// src/ingest/providers/arxiv.rs
//! arXiv Atom API adapter: one query per configured category, newest first.

use async_trait::async_trait;
use metrics::{counter, histogram};
use std::collections::{BTreeMap, HashSet};

use crate::error::{FetchError, FetchFailure};
use crate::ingest::feed::{parse_feed, FeedItem};
use crate::ingest::parse_feed_date;
use crate::ingest::providers::{get_text, http_client};
use crate::ingest::rate_limit::RateLimiter;
use crate::ingest::types::{FetchAdapter, FetchBatch, FetchWindow, SourceClass, SubRequestTally};
use crate::model::SourceRecord;

pub const DEFAULT_ENDPOINT: &str = "http://export.arxiv.org/api/query";
const NAME: &str = "arXiv";

pub struct ArxivAdapter {
    categories: Vec<String>,
    max_results: usize,
    mode: Mode,
}

enum Mode {
    Http {
        client: reqwest::Client,
        endpoint: String,
    },
    /// category -> Atom document
    Fixture(BTreeMap<String, String>),
}

impl ArxivAdapter {
    pub fn new(categories: Vec<String>, max_results: usize) -> Self {
        Self::with_endpoint(categories, max_results, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(
        categories: Vec<String>,
        max_results: usize,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            categories,
            max_results,
            mode: Mode::Http {
                client: http_client(),
                endpoint: endpoint.into(),
            },
        }
    }

    /// Offline adapter; categories are queried in the given order.
    pub fn from_fixtures<I, K, V>(fixtures: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut categories = Vec::new();
        let mut docs = BTreeMap::new();
        for (k, v) in fixtures {
            let k = k.into();
            categories.push(k.clone());
            docs.insert(k, v.into());
        }
        Self {
            categories,
            max_results: usize::MAX,
            mode: Mode::Fixture(docs),
        }
    }

    async fn load(&self, category: &str) -> Result<String, FetchFailure> {
        match &self.mode {
            Mode::Http { client, endpoint } => {
                let query = [
                    ("search_query", format!("cat:{category}")),
                    ("sortBy", "submittedDate".to_string()),
                    ("sortOrder", "descending".to_string()),
                    ("max_results", self.max_results.to_string()),
                ];
                get_text(client, endpoint, &query).await
            }
            Mode::Fixture(docs) => docs
                .get(category)
                .cloned()
                .ok_or_else(|| FetchFailure::Parse(format!("no fixture for category {category}"))),
        }
    }
}

fn to_record(item: FeedItem, category: &str) -> Option<SourceRecord> {
    let doi = item.resolved_doi();
    let FeedItem {
        id,
        title,
        link,
        pdf_link,
        summary,
        authors,
        date,
        categories,
        ..
    } = item;
    title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;

    let mut attributes = BTreeMap::new();
    attributes.insert("query_category".to_string(), category.to_string());
    if !categories.is_empty() {
        attributes.insert("categories".to_string(), categories.join(", "));
    }
    if let Some(pdf) = pdf_link {
        attributes.insert("pdf_url".to_string(), pdf);
    }
    if let Some((_, arxiv_id)) = id.as_deref().and_then(|u| u.split_once("/abs/")) {
        attributes.insert("arxiv_id".to_string(), arxiv_id.to_string());
    }

    Some(SourceRecord {
        source: NAME.to_string(),
        title,
        authors,
        abstract_text: summary,
        // The abstract page (entry id) is the canonical link.
        link: id.or(link),
        doi,
        published: date.as_deref().and_then(parse_feed_date),
        attributes,
    })
}

#[async_trait]
impl FetchAdapter for ArxivAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn class(&self) -> SourceClass {
        SourceClass::Arxiv
    }

    async fn fetch(
        &self,
        window: &FetchWindow,
        pacer: &RateLimiter,
    ) -> Result<FetchBatch, FetchError> {
        let mut batch = FetchBatch::default();
        let mut tally = SubRequestTally::default();
        // Cross-listed papers come back once per category.
        let mut seen: HashSet<String> = HashSet::new();

        for category in &self.categories {
            pacer.acquire().await;
            let t0 = std::time::Instant::now();
            let items = match self.load(category).await.and_then(|body| parse_feed(&body)) {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(target: "ingest", adapter = NAME, %category, error = %e, "category request failed");
                    counter!("ingest_request_errors_total", "adapter" => NAME).increment(1);
                    tally.failed(&e);
                    continue;
                }
            };
            histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
            tally.ok();

            let mut kept = 0usize;
            for item in items {
                let key = item.id.clone().or_else(|| item.link.clone());
                if let Some(key) = key {
                    if !seen.insert(key) {
                        continue;
                    }
                }
                let Some(rec) = to_record(item, category) else {
                    batch.skipped += 1;
                    continue;
                };
                if rec.published.is_some_and(|p| !window.contains(p)) {
                    continue;
                }
                kept += 1;
                batch.records.push(rec);
            }
            tracing::debug!(target: "ingest", adapter = NAME, %category, kept, "category fetched");
        }

        tally.finish(NAME, batch)
    }
}
