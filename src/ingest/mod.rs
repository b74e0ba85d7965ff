// src/ingest/mod.rs
pub mod feed;
pub mod orchestrator;
pub mod providers;
pub mod rate_limit;
pub mod types;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

pub use orchestrator::{AdapterReport, Collected, Orchestrator};
pub use rate_limit::{Pacing, RateLimiter};
pub use types::{FetchAdapter, FetchBatch, FetchWindow, SourceClass};

/// One-time metrics registration (so series show up in the exposition text).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_records_total",
            "Papers normalized from adapter output."
        );
        describe_counter!(
            "ingest_skipped_total",
            "Malformed entries skipped by adapters or normalization."
        );
        describe_counter!(
            "ingest_adapter_errors_total",
            "Adapters that failed as a whole (error, panic or deadline)."
        );
        describe_counter!(
            "ingest_request_errors_total",
            "Single sub-requests (category, journal) that failed."
        );
        describe_histogram!("ingest_fetch_ms", "Adapter wall time in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Feed/JSON parse time in milliseconds.");
        describe_histogram!("ingest_http_ms", "Upstream GET latency in milliseconds.");
        describe_counter!("dedup_removed_total", "Records collapsed by deduplication.");
        describe_counter!(
            "scoring_cache_hits_total",
            "Semantic scores served from the decision cache."
        );
        describe_counter!(
            "scoring_cache_misses_total",
            "Semantic scores not found in the decision cache."
        );
        describe_counter!(
            "scoring_cache_corrupt_total",
            "Decision cache entries that could not be read back."
        );
        describe_counter!(
            "scoring_provider_calls_total",
            "Calls issued to the semantic scoring provider."
        );
        describe_counter!("scoring_errors_total", "Papers left unscored.");
        describe_gauge!(
            "pipeline_last_run_ts",
            "Unix ts when the pipeline last finished."
        );
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML/JATS tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Feed dates come as RFC 2822 (RSS), RFC 3339 (Atom, dc:date) or a bare date.
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return Utc.timestamp_opt(dt.unix_timestamp(), 0).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Entities that are valid HTML but unknown to an XML parser.
pub(crate) fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
