//! Count/filter selection over the domain index, and the export text.

use chrono::{DateTime, Local};
use std::fmt::Write as _;

use crate::indexer::DomainIndex;

/// Which bookmark counts a query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountPredicate {
    Exact(usize),
    /// Inclusive on both ends.
    Range { min: usize, max: usize },
}

impl CountPredicate {
    pub fn matches(&self, count: usize) -> bool {
        match *self {
            CountPredicate::Exact(n) => count == n,
            CountPredicate::Range { min, max } => min <= count && count <= max,
        }
    }

    pub fn describe(&self) -> String {
        match *self {
            CountPredicate::Exact(n) => format!("exactly {}", n),
            CountPredicate::Range { min, max } => format!("between {} and {}", min, max),
        }
    }
}

/// Keep domains matching at least one pattern; no patterns keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainFilter {
    pub patterns: Vec<String>,
    /// Exact equality instead of substring containment.
    pub strict: bool,
}

impl DomainFilter {
    pub fn new(patterns: Vec<String>, strict: bool) -> Self {
        Self { patterns, strict }
    }

    pub fn matches(&self, domain: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        self.patterns.iter().any(|pattern| {
            if self.strict {
                domain == pattern
            } else {
                domain.contains(pattern.as_str())
            }
        })
    }
}

/// Order of bookmarks inside each selected domain, by date added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortOrder {
    /// Oldest first
    #[default]
    Asc,
    /// Newest first
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainQuery {
    pub predicate: CountPredicate,
    pub filter: DomainFilter,
    pub order: SortOrder,
}

/// What the selection step found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// No domain has a matching count.
    NoCountMatch,
    /// Some counts matched but the filters removed them all.
    NoFilterMatch { candidates: usize },
    Matched(Vec<String>),
}

/// Select and order domains for `query`.
///
/// Exact-count results are sorted by domain name. Range results are sorted by
/// count, descending; equal counts stay in domain-name order.
pub fn select_domains(index: &DomainIndex, query: &DomainQuery) -> Selection {
    let candidates: Vec<(&str, usize)> = index
        .iter()
        .filter(|(_, count)| query.predicate.matches(*count))
        .collect();
    if candidates.is_empty() {
        return Selection::NoCountMatch;
    }

    let total = candidates.len();
    let mut selected: Vec<(&str, usize)> = candidates
        .into_iter()
        .filter(|(domain, _)| query.filter.matches(domain))
        .collect();
    if selected.is_empty() {
        return Selection::NoFilterMatch { candidates: total };
    }

    selected.sort_by(|a, b| a.0.cmp(b.0));
    if let CountPredicate::Range { .. } = query.predicate {
        selected.sort_by(|a, b| b.1.cmp(&a.1));
    }

    Selection::Matched(selected.into_iter().map(|(domain, _)| domain.to_string()).collect())
}

/// Re-sort each domain's bookmarks in place by date added. Ties keep their
/// current order.
pub fn sort_bookmarks(index: &mut DomainIndex, domains: &[String], order: SortOrder) {
    for domain in domains {
        if let Some(records) = index.get_mut(domain) {
            match order {
                SortOrder::Asc => records.sort_by_key(|r| r.date_added),
                SortOrder::Desc => records.sort_by(|a, b| b.date_added.cmp(&a.date_added)),
            }
        }
    }
}

/// Plain-text export of `domains`, in the given order.
pub fn format_export(index: &DomainIndex, domains: &[String], date_format: &str) -> String {
    let mut out = String::new();
    for domain in domains {
        let Some(records) = index.get(domain) else {
            continue;
        };
        let _ = write!(out, "\n=== {} ({}) ===\n", domain, records.len());
        for record in records {
            let title = if record.title.is_empty() {
                "No Title"
            } else {
                record.title.as_str()
            };
            let _ = write!(
                out,
                "[{}] [{}]\n{}\n",
                format_date(record.date_added, date_format),
                title,
                record.url
            );
        }
    }
    out
}

/// Local-time rendering of a millisecond timestamp.
///
/// Falls back to RFC 3339 when `date_format` is not a valid chrono format.
pub fn format_date(millis: i64, date_format: &str) -> String {
    let Some(utc) = DateTime::from_timestamp_millis(millis) else {
        return "Invalid Date".to_string();
    };
    let local = utc.with_timezone(&Local);

    let mut out = String::new();
    match write!(out, "{}", local.format(date_format)) {
        Ok(()) => out,
        Err(_) => local.to_rfc3339(),
    }
}
