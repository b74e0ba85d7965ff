// src/dedup.rs
//! Collapse papers that describe the same work.
//!
//! Groups are keyed by fingerprint (normalized title + DOI). A DOI-less record joins the
//! DOI group of its title when exactly one DOI is known for that title; with several
//! DOIs it stays in its own title-only group, since it cannot be attributed.

use metrics::counter;
use std::collections::HashMap;

use crate::model::{Fingerprint, Paper};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DedupOutcome {
    /// One paper per group, in first-seen group order.
    pub papers: Vec<Paper>,
    pub removed: usize,
}

/// Deterministic for a given input order; `dedup(dedup(s).papers)` removes nothing.
pub fn dedup(papers: Vec<Paper>) -> DedupOutcome {
    let input = papers.len();

    // title key -> distinct DOI fingerprints, first-seen order
    let mut dois_by_title: HashMap<String, Vec<Fingerprint>> = HashMap::new();
    for p in papers.iter().filter(|p| p.has_doi()) {
        let title = p.fingerprint().title_key();
        if title.is_empty() {
            continue;
        }
        let known = dois_by_title.entry(title.to_string()).or_default();
        if !known.contains(p.fingerprint()) {
            known.push(p.fingerprint().clone());
        }
    }

    let mut slot_of: HashMap<Fingerprint, usize> = HashMap::new();
    let mut groups: Vec<Vec<Paper>> = Vec::new();
    for p in papers {
        let key = group_key(&p, &dois_by_title);
        match slot_of.get(&key) {
            Some(&i) => groups[i].push(p),
            None => {
                slot_of.insert(key, groups.len());
                groups.push(vec![p]);
            }
        }
    }

    let papers: Vec<Paper> = groups.into_iter().filter_map(pick_representative).collect();
    let removed = input - papers.len();
    counter!("dedup_removed_total").increment(removed as u64);
    tracing::info!(target: "dedup", input, kept = papers.len(), removed, "deduplicated");
    DedupOutcome { papers, removed }
}

fn group_key(p: &Paper, dois_by_title: &HashMap<String, Vec<Fingerprint>>) -> Fingerprint {
    if p.has_doi() {
        return p.fingerprint().clone();
    }
    match dois_by_title.get(p.fingerprint().title_key()).map(Vec::as_slice) {
        Some([only]) => only.clone(),
        _ => p.fingerprint().clone(),
    }
}

/// Abstract beats no abstract, then DOI beats no DOI, then first seen wins.
fn pick_representative(group: Vec<Paper>) -> Option<Paper> {
    let rank = |p: &Paper| (p.has_abstract(), p.has_doi());
    let mut best: Option<Paper> = None;
    for p in group {
        let better = match &best {
            None => true,
            Some(b) => rank(&p) > rank(b),
        };
        if better {
            best = Some(p);
        }
    }
    best
}
