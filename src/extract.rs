//! Record extraction
//!
//! Maps one raw Scopus entry to a flat [`PublicationRecord`]. Every column is
//! read through [`FIELD_MAP`], so a missing field always falls back to its
//! declared default and extraction never fails.

use crate::scopus::RawEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default used when a source field is absent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    /// Empty string
    Text,
    /// Zero
    Zero,
}

/// Logical column, Scopus source key and default, in column order
pub const FIELD_MAP: &[(&str, &str, FieldDefault)] = &[
    ("authors", "dc:creator", FieldDefault::Text),
    ("title", "dc:title", FieldDefault::Text),
    ("publicationName", "prism:publicationName", FieldDefault::Text),
    ("doi", "prism:doi", FieldDefault::Text),
    ("volume", "prism:volume", FieldDefault::Text),
    ("issue", "prism:issueIdentifier", FieldDefault::Text),
    ("pageRange", "prism:pageRange", FieldDefault::Text),
    ("coverDate", "prism:coverDate", FieldDefault::Text),
    ("affiliation", "affiliation", FieldDefault::Text),
    ("citedbyCount", "citedby-count", FieldDefault::Zero),
];

/// One row of the raw merged table (`publications.csv`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub topic: String,
    pub authors: String,
    pub title: String,
    #[serde(rename = "publicationName")]
    pub publication_name: String,
    pub doi: String,
    pub volume: String,
    pub issue: String,
    #[serde(rename = "pageRange")]
    pub page_range: String,
    /// Source date string, parsed later by the normalizer
    #[serde(rename = "coverDate")]
    pub cover_date: String,
    /// Textual encoding of the nested affiliation list
    pub affiliation: String,
    /// `None` when the API sent a null or non-numeric count
    #[serde(rename = "citedbyCount")]
    pub citedby_count: Option<f64>,
}

/// Source key and default for a logical column
fn lookup(column: &str) -> (&'static str, FieldDefault) {
    FIELD_MAP
        .iter()
        .find(|(name, _, _)| *name == column)
        .map(|(_, key, default)| (*key, *default))
        .unwrap_or(("", FieldDefault::Text))
}

/// Read a text column; absent and `null` values give the column default
fn text(entry: &RawEntry, column: &str) -> String {
    let (key, default) = lookup(column);
    match entry.get(key) {
        None => match default {
            FieldDefault::Text => String::new(),
            FieldDefault::Zero => "0".to_string(),
        },
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        // Nested structures are kept verbatim as JSON text
        Some(other) => other.to_string(),
    }
}

/// Read the citation count.
///
/// An absent key yields zero. A present but null or non-numeric value yields
/// `None` so the normalizer can impute it.
fn citation_count(entry: &RawEntry) -> Option<f64> {
    let (key, default) = lookup("citedbyCount");
    if !entry.contains_key(key) {
        return match default {
            FieldDefault::Zero => Some(0.0),
            FieldDefault::Text => None,
        };
    }

    match entry.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Map one raw entry to a flat record tagged with `topic`
pub fn extract(entry: &RawEntry, topic: &str) -> PublicationRecord {
    PublicationRecord {
        topic: topic.to_string(),
        authors: text(entry, "authors"),
        title: text(entry, "title"),
        publication_name: text(entry, "publicationName"),
        doi: text(entry, "doi"),
        volume: text(entry, "volume"),
        issue: text(entry, "issue"),
        page_range: text(entry, "pageRange"),
        cover_date: text(entry, "coverDate"),
        affiliation: text(entry, "affiliation"),
        citedby_count: citation_count(entry),
    }
}

/// Extract every entry of one topic's fetch
pub fn extract_all(entries: &[RawEntry], topic: &str) -> Vec<PublicationRecord> {
    entries.iter().map(|e| extract(e, topic)).collect()
}
