// src/ingest/providers/rss.rs
//! Journal feed adapter. One adapter per publisher group (SAGE, Nature, ...), one feed
//! request per journal.

use async_trait::async_trait;
use metrics::{counter, histogram};
use std::collections::BTreeMap;

use crate::error::{FetchError, FetchFailure};
use crate::ingest::feed::{parse_feed, FeedItem};
use crate::ingest::parse_feed_date;
use crate::ingest::providers::{get_text, http_client, Body};
use crate::ingest::rate_limit::RateLimiter;
use crate::ingest::types::{FetchAdapter, FetchBatch, FetchWindow, SourceClass, SubRequestTally};
use crate::model::SourceRecord;

#[derive(Debug, Clone)]
pub struct RssJournal {
    /// Short config key, e.g. `asr`.
    pub code: String,
    /// Display name used as the paper's source label.
    pub name: String,
    pub feed: Body,
}

impl RssJournal {
    pub fn new(code: impl Into<String>, name: impl Into<String>, feed: Body) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            feed,
        }
    }
}

pub struct RssAdapter {
    group: String,
    journals: Vec<RssJournal>,
    client: reqwest::Client,
}

impl RssAdapter {
    pub fn new(group: impl Into<String>, journals: Vec<RssJournal>) -> Self {
        Self {
            group: group.into(),
            journals,
            client: http_client(),
        }
    }

    pub fn journals(&self) -> &[RssJournal] {
        &self.journals
    }

    async fn load(&self, journal: &RssJournal) -> Result<String, FetchFailure> {
        match &journal.feed {
            Body::Url(url) => get_text(&self.client, url, &[]).await,
            Body::Fixture(doc) => Ok(doc.clone()),
        }
    }
}

fn to_record(item: FeedItem, journal: &RssJournal) -> Option<SourceRecord> {
    let doi = item.resolved_doi();
    let FeedItem {
        id,
        title,
        link,
        summary,
        authors,
        date,
        ..
    } = item;
    title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;

    let mut attributes = BTreeMap::new();
    attributes.insert("journal_code".to_string(), journal.code.clone());

    Some(SourceRecord {
        source: journal.name.clone(),
        title,
        authors,
        abstract_text: summary,
        link: link.or(id),
        doi,
        published: date.as_deref().and_then(parse_feed_date),
        attributes,
    })
}

#[async_trait]
impl FetchAdapter for RssAdapter {
    fn name(&self) -> &str {
        &self.group
    }

    fn class(&self) -> SourceClass {
        SourceClass::Rss
    }

    async fn fetch(
        &self,
        window: &FetchWindow,
        pacer: &RateLimiter,
    ) -> Result<FetchBatch, FetchError> {
        let mut batch = FetchBatch::default();
        let mut tally = SubRequestTally::default();

        for journal in &self.journals {
            pacer.acquire().await;
            let t0 = std::time::Instant::now();
            let items = match self.load(journal).await.and_then(|body| parse_feed(&body)) {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(target: "ingest", adapter = %self.group, journal = %journal.name, error = %e, "feed request failed");
                    counter!("ingest_request_errors_total", "adapter" => self.group.clone())
                        .increment(1);
                    tally.failed(&e);
                    continue;
                }
            };
            histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
            tally.ok();

            let total = items.len();
            for item in items {
                let Some(rec) = to_record(item, journal) else {
                    batch.skipped += 1;
                    continue;
                };
                if rec.published.is_some_and(|p| !window.contains(p)) {
                    continue;
                }
                batch.records.push(rec);
            }
            tracing::debug!(target: "ingest", adapter = %self.group, journal = %journal.name, total, "feed fetched");
        }

        tally.finish(&self.group, batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
<item>
  <title>Care work and robots</title>
  <link>https://doi.org/10.1177/0001</link>
  <description>&lt;p&gt;Abstract&lt;/p&gt;</description>
  <dc:creator>Ada Lovelace, Alan Turing</dc:creator>
  <pubDate>Tue, 04 Mar 2025 10:00:00 GMT</pubDate>
</item>
<item>
  <title>Last year's news</title>
  <pubDate>Mon, 04 Mar 2024 10:00:00 GMT</pubDate>
</item>
<item>
  <title>Undated note</title>
</item>
<item><description>no title here</description></item>
</channel></rss>"#;

    fn window() -> FetchWindow {
        FetchWindow::last_days(7, Utc.with_ymd_and_hms(2025, 3, 8, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn journal_feed_yields_records_and_skips_malformed() {
        let adapter = RssAdapter::new(
            "SAGE",
            vec![RssJournal::new("asr", "American Sociological Review", Body::Fixture(FEED.into()))],
        );
        let batch = adapter
            .fetch(&window(), &RateLimiter::unlimited())
            .await
            .unwrap();
        assert_eq!(batch.skipped, 1);
        let titles: Vec<_> = batch
            .records
            .iter()
            .map(|r| r.title.clone().unwrap_or_default())
            .collect();
        assert_eq!(titles, vec!["Care work and robots", "Undated note"]);

        let first = &batch.records[0];
        assert_eq!(first.source, "American Sociological Review");
        assert_eq!(first.doi.as_deref(), Some("10.1177/0001"));
        assert_eq!(first.abstract_text.as_deref(), Some("<p>Abstract</p>"));
        assert!(batch.records[1].published.is_none());
    }

    #[tokio::test]
    async fn failing_journal_does_not_sink_the_group() {
        let adapter = RssAdapter::new(
            "SAGE",
            vec![
                RssJournal::new("bad", "Broken", Body::Fixture("<rss><item></rss>".into())),
                RssJournal::new("asr", "ASR", Body::Fixture(FEED.into())),
            ],
        );
        let batch = adapter
            .fetch(&window(), &RateLimiter::unlimited())
            .await
            .unwrap();
        assert_eq!(batch.failed_requests, 1);
        assert_eq!(batch.records.len(), 2);
    }
}
