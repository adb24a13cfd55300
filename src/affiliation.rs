//! Affiliation blob parsing
//!
//! Scopus returns affiliations as a list of objects. By the time the
//! normalizer sees it, the list is stored as text: either JSON
//! (`[{"affilname":"MIT",...}]`) or a single-quoted rendering
//! (`[{'affilname': 'MIT', ...}]`). The text is matched with patterns and
//! never evaluated.

use crate::error::{AnalyzerError, Result};
use regex::Regex;
use tracing::debug;

/// Key holding the institution name
pub const AFFILNAME_KEY: &str = "affilname";

/// Key holding the institution country
pub const COUNTRY_KEY: &str = "affiliation-country";

/// Structured result of parsing an affiliation blob
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Affiliation {
    pub name: Option<String>,
    pub country: Option<String>,
}

/// Pattern matching `'key': 'value'` or `"key": "value"`
fn key_pattern(key: &str) -> Result<Regex> {
    let key = regex::escape(key);
    let pattern = format!(
        r#"'{key}'\s*:\s*'([^']+)'|"{key}"\s*:\s*"((?:[^"\\]|\\.)+)""#,
        key = key
    );
    Regex::new(&pattern).map_err(|e| AnalyzerError::Parse(e.to_string()))
}

/// Decode a JSON-escaped capture; falls back to the raw text
fn unescape_json(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}

/// Every value bound to `key`, in order of appearance
fn values_for(blob: &str, key: &str) -> Result<Vec<String>> {
    let re = key_pattern(key)?;
    Ok(re
        .captures_iter(blob)
        .filter_map(|caps| {
            caps.get(1)
                .map(|m| m.as_str().to_string())
                .or_else(|| caps.get(2).map(|m| unescape_json(m.as_str())))
        })
        .collect())
}

/// First value bound to `key`
fn first_value(blob: &str, key: &str) -> Result<Option<String>> {
    Ok(values_for(blob, key)?.into_iter().next())
}

/// Parse the first institution name and country out of a blob.
///
/// An empty blob parses to an empty [`Affiliation`].
pub fn parse_affiliation(blob: &str) -> Result<Affiliation> {
    if blob.trim().is_empty() {
        return Ok(Affiliation::default());
    }

    Ok(Affiliation {
        name: first_value(blob, AFFILNAME_KEY)?,
        country: first_value(blob, COUNTRY_KEY)?,
    })
}

/// Total variant of [`parse_affiliation`]: any parse failure gives both
/// fields as `None`.
pub fn extract_affiliation_details(blob: &str) -> Affiliation {
    parse_affiliation(blob).unwrap_or_else(|e| {
        debug!(error = %e, "Affiliation parsing failed");
        Affiliation::default()
    })
}

/// All institution names in a blob, duplicates removed, order kept
pub fn affiliation_names(blob: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in values_for(blob, AFFILNAME_KEY).unwrap_or_default() {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
