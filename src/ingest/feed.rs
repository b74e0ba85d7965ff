// src/ingest/feed.rs
//! Streaming RSS 2.0 / RSS 1.0 (RDF) / Atom item parser shared by the arXiv and journal
//! feed adapters. Namespaces are ignored: `dc:creator`, `prism:doi` and `arxiv:doi`
//! are matched by local name.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::FetchFailure;
use crate::ingest::scrub_html_entities_for_xml;

/// One `<item>`/`<entry>` as it appeared in the feed. Text is raw (not yet normalized).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedItem {
    pub id: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub pdf_link: Option<String>,
    pub summary: Option<String>,
    pub authors: Vec<String>,
    pub date: Option<String>,
    /// Atom `<updated>`; only used when no publication date is present.
    pub updated: Option<String>,
    pub doi: Option<String>,
    pub categories: Vec<String>,
}

impl FeedItem {
    fn set_field(&mut self, field: &str, value: String) {
        if value.is_empty() {
            return;
        }
        match field {
            "title" => {
                self.title.get_or_insert(value);
            }
            "link" => {
                self.link.get_or_insert(value);
            }
            "id" | "guid" => {
                self.id.get_or_insert(value);
            }
            "description" | "summary" | "abstract" | "encoded" | "content" => {
                self.summary.get_or_insert(value);
            }
            "creator" | "author" | "contributor" => self.authors.push(value),
            "pubDate" | "date" | "published" | "issued" => {
                self.date.get_or_insert(value);
            }
            "updated" => {
                self.updated.get_or_insert(value);
            }
            "doi" => self.doi = Some(value),
            "identifier" => {
                if self.doi.is_none() && value.to_lowercase().contains("10.") {
                    self.doi = Some(doi_from_identifier(&value));
                }
            }
            _ => {}
        }
    }

    /// DOI from an explicit tag, else from a doi.org link.
    pub fn resolved_doi(&self) -> Option<String> {
        if let Some(d) = &self.doi {
            return Some(d.clone());
        }
        [self.link.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|u| {
                u.split_once("doi.org/")
                    .map(|(_, rest)| rest.trim().to_string())
                    .filter(|d| !d.is_empty())
            })
    }
}

fn doi_from_identifier(raw: &str) -> String {
    let s = raw.trim();
    s.strip_prefix("doi:")
        .or_else(|| s.strip_prefix("DOI:"))
        .unwrap_or(s)
        .trim()
        .to_string()
}

fn is_item(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
}

/// Atom `<link>` and `<category>` carry their payload in attributes.
fn apply_attributes(item: &mut FeedItem, e: &BytesStart<'_>) {
    match e.local_name().as_ref() {
        b"link" => {
            let Some(href) = attr(e, b"href") else {
                return;
            };
            if attr(e, b"title").as_deref() == Some("pdf") {
                item.pdf_link.get_or_insert(href);
                return;
            }
            match attr(e, b"rel").as_deref() {
                None | Some("alternate") => {
                    item.link.get_or_insert(href);
                }
                _ => {}
            }
        }
        b"category" => {
            if let Some(term) = attr(e, b"term") {
                if !item.categories.contains(&term) {
                    item.categories.push(term);
                }
            }
        }
        _ => {}
    }
}

/// Parse every item of a feed. Structural XML errors fail the whole document; bad
/// escapes inside one field only degrade that field.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, FetchFailure> {
    let cleaned = scrub_html_entities_for_xml(xml);
    let mut reader = Reader::from_str(&cleaned);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    // Local name of the field whose text is being collected. Child elements inside a
    // field (atom <author><name>, xhtml content) append to it.
    let mut field: Option<String> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if is_item(e.local_name().as_ref()) {
                    current = Some(FeedItem::default());
                    field = None;
                } else if let Some(item) = current.as_mut() {
                    apply_attributes(item, e);
                    if field.is_none() {
                        field = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                        text.clear();
                    } else if !text.is_empty() {
                        text.push(' ');
                    }
                }
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(item) = current.as_mut() {
                    apply_attributes(item, e);
                }
            }
            Ok(Event::Text(ref t)) => {
                if field.is_some() {
                    match t.unescape() {
                        Ok(s) => text.push_str(&s),
                        Err(_) => text.push_str(&String::from_utf8_lossy(t)),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                if is_item(name.as_ref()) {
                    if let Some(mut item) = current.take() {
                        if item.date.is_none() {
                            item.date = item.updated.clone();
                        }
                        items.push(item);
                    }
                    field = None;
                } else if let (Some(item), Some(f)) = (current.as_mut(), field.as_deref()) {
                    if f.as_bytes() == name.as_ref() {
                        item.set_field(f, text.trim().to_string());
                        field = None;
                        text.clear();
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchFailure::Parse(format!(
                    "xml error at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:prism="http://prismstandard.org/namespaces/basic/2.0/">
<channel><title>Journal</title>
<item>
  <title>Care work &amp; robots</title>
  <link>https://journals.test/doi/10.1177/001</link>
  <description><![CDATA[<p>Abstract&nbsp;text</p>]]></description>
  <dc:creator>Ada Lovelace</dc:creator>
  <dc:creator>Alan Turing</dc:creator>
  <pubDate>Tue, 04 Mar 2025 10:00:00 GMT</pubDate>
  <prism:doi>10.1177/001</prism:doi>
</item>
<item><link>https://journals.test/x</link></item>
</channel></rss>"#;

    const ATOM: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
<entry>
  <id>http://arxiv.org/abs/2503.00001v1</id>
  <updated>2025-03-05T09:00:00Z</updated>
  <published>2025-03-03T18:00:00Z</published>
  <title>Gender gaps
    in STEM</title>
  <summary>We study gaps.</summary>
  <author><name>Grace Hopper</name></author>
  <author><name>Katherine Johnson</name></author>
  <arxiv:doi>10.48550/arXiv.2503.00001</arxiv:doi>
  <link href="http://arxiv.org/abs/2503.00001v1" rel="alternate" type="text/html"/>
  <link title="pdf" href="http://arxiv.org/pdf/2503.00001v1" rel="related"/>
  <category term="cs.CY" scheme="http://arxiv.org/schemas/atom"/>
  <category term="econ.GN" scheme="http://arxiv.org/schemas/atom"/>
</entry>
</feed>"#;

    #[test]
    fn parses_rss_items_with_namespaced_fields() {
        let items = parse_feed(RSS).unwrap();
        assert_eq!(items.len(), 2);
        let first = &items[0];
        assert_eq!(first.title.as_deref(), Some("Care work & robots"));
        assert_eq!(first.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(first.summary.as_deref(), Some("<p>Abstract text</p>"));
        assert_eq!(first.doi.as_deref(), Some("10.1177/001"));
        assert_eq!(first.date.as_deref(), Some("Tue, 04 Mar 2025 10:00:00 GMT"));
        // second item has no title; the adapter decides what to do with it
        assert!(items[1].title.is_none());
    }

    #[test]
    fn parses_atom_entries_with_attribute_links() {
        let items = parse_feed(ATOM).unwrap();
        assert_eq!(items.len(), 1);
        let e = &items[0];
        assert_eq!(e.id.as_deref(), Some("http://arxiv.org/abs/2503.00001v1"));
        assert_eq!(e.link.as_deref(), Some("http://arxiv.org/abs/2503.00001v1"));
        assert_eq!(e.pdf_link.as_deref(), Some("http://arxiv.org/pdf/2503.00001v1"));
        assert_eq!(e.authors, vec!["Grace Hopper", "Katherine Johnson"]);
        assert_eq!(e.categories, vec!["cs.CY", "econ.GN"]);
        assert_eq!(e.doi.as_deref(), Some("10.48550/arXiv.2503.00001"));
        // publication date wins over a preceding <updated>
        assert_eq!(e.date.as_deref(), Some("2025-03-03T18:00:00Z"));
    }

    #[test]
    fn doi_falls_back_to_doi_org_links() {
        let item = FeedItem {
            link: Some("https://doi.org/10.1038/s41586-025-1".into()),
            ..Default::default()
        };
        assert_eq!(item.resolved_doi().as_deref(), Some("10.1038/s41586-025-1"));
    }

    #[test]
    fn broken_xml_is_a_parse_failure() {
        let err = parse_feed("<rss><channel><item><title>x</item></channel></rss>").unwrap_err();
        assert!(matches!(err, FetchFailure::Parse(_)));
    }
}
