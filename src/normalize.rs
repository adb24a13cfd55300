//! Dataset normalization
//!
//! Turns per-topic record batches into the preprocessed table through a fixed
//! sequence of stages:
//!
//! 1. concatenate batches (fails with [`AnalyzerError::NoData`] when empty)
//! 2. persist the raw snapshot
//! 3. parse affiliations
//! 4. impute missing citation counts with the global mean
//! 5. fill remaining blanks with empty strings
//! 6. parse cover dates and derive year/month
//! 7. standardize citation counts (z-score over the whole table)
//! 8. drop exact duplicate rows
//! 9. persist the preprocessed table
//!
//! Stages 3-8 never fail; malformed values degrade to null.

use crate::affiliation::extract_affiliation_details;
use crate::error::{AnalyzerError, Result};
use crate::extract::PublicationRecord;
use crate::table::{save_raw, Publication, PublicationTable};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Where the normalizer persists its two snapshots
#[derive(Debug, Clone, Copy)]
pub struct OutputPaths<'a> {
    pub raw: &'a Path,
    pub preprocessed: &'a Path,
}

/// Stage 1: merge batches in topic order then fetch order.
pub fn concatenate(batches: Vec<Vec<PublicationRecord>>) -> Result<Vec<PublicationRecord>> {
    let merged: Vec<PublicationRecord> = batches.into_iter().flatten().collect();
    if merged.is_empty() {
        return Err(AnalyzerError::NoData);
    }
    Ok(merged)
}

/// Stage 3: fill `affilname` and `affiliation-country` from the blob.
/// Returns the number of rows with a parsed name.
pub fn parse_affiliations(table: &mut PublicationTable) -> usize {
    let mut parsed = 0;
    for row in &mut table.rows {
        let details = extract_affiliation_details(&row.affiliation);
        if details.name.is_some() {
            parsed += 1;
        }
        row.affilname = details.name;
        row.affiliation_country = details.country;
    }
    parsed
}

/// Stage 4: replace missing citation counts with the mean of the present
/// ones, computed once over the whole table.
///
/// Returns `(imputed_rows, mean)`. When no value is present at all the
/// fill value is zero.
pub fn impute_citations(table: &mut PublicationTable) -> (usize, f64) {
    let present: Vec<f64> = table.rows.iter().filter_map(|r| r.citedby_count).collect();
    let fill = mean(&present).unwrap_or(0.0);

    let mut imputed = 0;
    for row in &mut table.rows {
        if row.citedby_count.is_none() {
            row.citedby_count = Some(fill);
            imputed += 1;
        }
    }
    (imputed, fill)
}

/// Stage 5: remaining missing text values become empty strings.
pub fn fill_blanks(table: &mut PublicationTable) -> usize {
    let mut filled = 0;
    for row in &mut table.rows {
        for slot in [&mut row.affilname, &mut row.affiliation_country] {
            if slot.is_none() {
                *slot = Some(String::new());
                filled += 1;
            }
        }
    }
    filled
}

/// Parse a cover date leniently; `None` for anything unrecognized.
pub fn parse_cover_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    // Partial dates: year-month, then bare year
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
        return Some(d);
    }
    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        return s.parse::<i32>().ok().and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1));
    }
    None
}

/// Stage 6: parse `coverDate` and derive `year`/`month`.
/// Returns the number of rows whose date failed to parse.
pub fn derive_dates(table: &mut PublicationTable) -> usize {
    let mut unparsed = 0;
    for row in &mut table.rows {
        row.cover_date = parse_cover_date(&row.cover_date_source);
        row.year = row.cover_date.map(|d| d.year());
        row.month = row.cover_date.map(|d| d.month());
        if row.cover_date.is_none() {
            unparsed += 1;
            debug!(raw = %row.cover_date_source, "Unparseable cover date");
        }
    }
    unparsed
}

/// Stage 7: z-score the citation column using the population mean and
/// standard deviation of the whole table. A zero deviation divides by one.
///
/// Returns `(mean, std)`.
pub fn standardize_citations(table: &mut PublicationTable) -> (f64, f64) {
    let values: Vec<f64> = table.rows.iter().map(Publication::citations).collect();
    let mu = mean(&values).unwrap_or(0.0);
    let sigma = std_dev(&values, mu);
    let scale = if sigma > 0.0 { sigma } else { 1.0 };

    for row in &mut table.rows {
        row.citedby_count = Some((row.citations() - mu) / scale);
    }
    (mu, sigma)
}

/// Hashable view of every column of a row
type RowKey<'a> = (
    (&'a str, &'a str, &'a str, &'a str, &'a str),
    (&'a str, &'a str, &'a str, Option<NaiveDate>, &'a str),
    (Option<u64>, Option<&'a str>, Option<&'a str>, Option<i32>, Option<u32>),
);

fn row_key(row: &Publication) -> RowKey<'_> {
    // -0.0 and 0.0 compare equal as values
    let citations = row
        .citedby_count
        .map(|v| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() });
    (
        (
            row.topic.as_str(),
            row.authors.as_str(),
            row.title.as_str(),
            row.publication_name.as_str(),
            row.doi.as_str(),
        ),
        (
            row.volume.as_str(),
            row.issue.as_str(),
            row.page_range.as_str(),
            row.cover_date,
            row.affiliation.as_str(),
        ),
        (
            citations,
            row.affilname.as_deref(),
            row.affiliation_country.as_deref(),
            row.year,
            row.month,
        ),
    )
}

/// Stage 8: drop rows identical to an earlier row across every column.
/// Returns the number of rows removed.
pub fn deduplicate(table: &mut PublicationTable) -> usize {
    let before = table.rows.len();
    let mut keep = Vec::with_capacity(before);
    {
        let mut seen = HashSet::with_capacity(before);
        for row in &table.rows {
            keep.push(seen.insert(row_key(row)));
        }
    }

    let mut flags = keep.into_iter();
    table.rows.retain(|_| flags.next().unwrap_or(true));
    before - table.rows.len()
}

/// Run stages 3-8 on an already concatenated record list
pub fn clean(records: Vec<PublicationRecord>) -> PublicationTable {
    let mut table = PublicationTable::new(records.into_iter().map(Publication::from).collect());

    let parsed = parse_affiliations(&mut table);
    info!(rows = table.len(), parsed = parsed, "Parsed affiliations");

    let (imputed, fill) = impute_citations(&mut table);
    info!(imputed = imputed, mean = fill, "Imputed missing citation counts");

    let filled = fill_blanks(&mut table);
    debug!(filled = filled, "Filled blank values");

    let unparsed = derive_dates(&mut table);
    info!(unparsed = unparsed, "Derived year and month from cover dates");

    let (mu, sigma) = standardize_citations(&mut table);
    info!(mean = mu, std = sigma, "Standardized citation counts");

    let removed = deduplicate(&mut table);
    info!(removed = removed, rows = table.len(), "Removed duplicate rows");

    table
}

/// Full normalization: concatenate, persist raw, clean, persist preprocessed.
pub fn normalize(
    batches: Vec<Vec<PublicationRecord>>,
    paths: OutputPaths<'_>,
) -> Result<PublicationTable> {
    let records = concatenate(batches)?;
    save_raw(paths.raw, &records)?;

    let table = clean(records);
    table.save(paths.preprocessed)?;
    Ok(table)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation around `mu`
fn std_dev(values: &[f64], mu: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(topic: &str, title: &str, count: Option<f64>, date: &str) -> PublicationRecord {
        PublicationRecord {
            topic: topic.to_string(),
            title: title.to_string(),
            citedby_count: count,
            cover_date: date.to_string(),
            ..Default::default()
        }
    }

    fn table(records: Vec<PublicationRecord>) -> PublicationTable {
        PublicationTable::new(records.into_iter().map(Publication::from).collect())
    }

    #[test]
    fn test_concatenate_preserves_order_and_skips_empty() -> Result<()> {
        let merged = concatenate(vec![
            vec![record("COMP", "a", Some(1.0), ""), record("COMP", "b", Some(1.0), "")],
            vec![],
            vec![record("MATH", "c", Some(1.0), "")],
        ])?;
        let titles: Vec<&str> = merged.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
        Ok(())
    }

    #[test]
    fn test_concatenate_all_empty_is_no_data() {
        assert!(matches!(concatenate(vec![]), Err(AnalyzerError::NoData)));
        assert!(matches!(
            concatenate(vec![vec![], vec![]]),
            Err(AnalyzerError::NoData)
        ));
    }

    #[test]
    fn test_impute_uses_global_mean() {
        let mut t = table(vec![
            record("COMP", "a", Some(2.0), ""),
            record("COMP", "b", None, ""),
            record("MATH", "c", Some(10.0), ""),
        ]);
        let (imputed, fill) = impute_citations(&mut t);
        assert_eq!(imputed, 1);
        assert_eq!(fill, 6.0);
        assert!(t.rows.iter().all(|r| r.citedby_count.is_some()));
        assert_eq!(t.rows[1].citedby_count, Some(6.0));
    }

    #[test]
    fn test_impute_with_no_present_values() {
        let mut t = table(vec![record("COMP", "a", None, "")]);
        assert_eq!(impute_citations(&mut t), (1, 0.0));
        assert_eq!(t.rows[0].citedby_count, Some(0.0));
    }

    #[test]
    fn test_fill_blanks() {
        let mut t = table(vec![record("COMP", "a", Some(1.0), "")]);
        t.rows[0].affilname = Some("MIT".to_string());
        assert_eq!(fill_blanks(&mut t), 1);
        assert_eq!(t.rows[0].affilname.as_deref(), Some("MIT"));
        assert_eq!(t.rows[0].affiliation_country.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_cover_date_formats() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day);
        assert_eq!(parse_cover_date("2023-05-17"), d(2023, 5, 17));
        assert_eq!(parse_cover_date("2023/05/17"), d(2023, 5, 17));
        assert_eq!(parse_cover_date("2023-05-17T10:00:00Z"), d(2023, 5, 17));
        assert_eq!(parse_cover_date("2023-05-17 10:00:00"), d(2023, 5, 17));
        assert_eq!(parse_cover_date("2023-05"), d(2023, 5, 1));
        assert_eq!(parse_cover_date("2023"), d(2023, 1, 1));
        assert_eq!(parse_cover_date("not-a-date"), None);
        assert_eq!(parse_cover_date("2023-13-40"), None);
        assert_eq!(parse_cover_date(""), None);
    }

    #[test]
    fn test_derive_dates_nulls_on_failure() {
        let mut t = table(vec![
            record("COMP", "a", Some(1.0), "2020-02-29"),
            record("COMP", "b", Some(1.0), "not-a-date"),
        ]);
        assert_eq!(derive_dates(&mut t), 1);
        assert_eq!(t.rows[0].year, Some(2020));
        assert_eq!(t.rows[0].month, Some(2));
        assert_eq!(t.rows[1].cover_date, None);
        assert_eq!(t.rows[1].year, None);
        assert_eq!(t.rows[1].month, None);
    }

    #[test]
    fn test_standardize_zero_mean_unit_variance() {
        let mut t = table(
            [1.0, 4.0, 9.0, 16.0, 100.0]
                .iter()
                .enumerate()
                .map(|(i, v)| record("COMP", &i.to_string(), Some(*v), ""))
                .collect(),
        );
        standardize_citations(&mut t);

        let values: Vec<f64> = t.rows.iter().map(Publication::citations).collect();
        let mu = mean(&values).unwrap_or(f64::NAN);
        let sigma = std_dev(&values, mu);
        assert!(mu.abs() < 1e-9);
        assert!((sigma - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_standardize_constant_column() {
        let mut t = table(vec![
            record("COMP", "a", Some(5.0), ""),
            record("COMP", "b", Some(5.0), ""),
        ]);
        let (mu, sigma) = standardize_citations(&mut t);
        assert_eq!((mu, sigma), (5.0, 0.0));
        assert!(t.rows.iter().all(|r| r.citedby_count == Some(0.0)));
    }

    #[test]
    fn test_deduplicate_keeps_first_and_is_idempotent() {
        let mut t = table(vec![
            record("COMP", "a", Some(1.0), ""),
            record("COMP", "b", Some(1.0), ""),
            record("COMP", "a", Some(1.0), ""),
            record("MATH", "a", Some(1.0), ""),
        ]);
        t.rows[1].volume = "first-b".to_string();

        assert_eq!(deduplicate(&mut t), 1);
        let once = t.clone();
        assert_eq!(deduplicate(&mut t), 0);
        assert_eq!(t, once);

        let keys: Vec<(&str, &str)> = t
            .rows
            .iter()
            .map(|r| (r.topic.as_str(), r.title.as_str()))
            .collect();
        assert_eq!(keys, vec![("COMP", "a"), ("COMP", "b"), ("MATH", "a")]);
    }

    #[test]
    fn test_deduplicate_distinguishes_citations() {
        let mut t = table(vec![
            record("COMP", "a", Some(1.0), ""),
            record("COMP", "a", Some(2.0), ""),
        ]);
        assert_eq!(deduplicate(&mut t), 0);
    }

    #[test]
    fn test_bad_fields_do_not_fail_clean() {
        let mut bad = record("COMP", "a", None, "not-a-date");
        bad.affiliation = "{{ not a list".to_string();
        let t = clean(vec![bad, record("COMP", "b", Some(4.0), "2021-01-01")]);

        assert_eq!(t.len(), 2);
        assert_eq!(t.rows[0].year, None);
        assert_eq!(t.rows[0].affilname.as_deref(), Some(""));
        assert!(t.rows.iter().all(|r| r.citedby_count.is_some()));
    }

    #[test]
    fn test_normalize_writes_both_snapshots() -> Result<()> {
        let dir = TempDir::new()?;
        let raw = dir.path().join("publications.csv");
        let pre = dir.path().join("publications_preprocessed.csv");

        let mut with_affil = record("COMP", "a", Some(1.0), "2022-06-01");
        with_affil.affiliation = "[{'affilname': 'MIT', 'affiliation-country': 'USA'}]".to_string();
        let table = normalize(
            vec![vec![with_affil, record("COMP", "b", Some(3.0), "2021")]],
            OutputPaths {
                raw: &raw,
                preprocessed: &pre,
            },
        )?;

        assert!(raw.exists());
        assert!(pre.exists());
        assert_eq!(table.rows[0].affilname.as_deref(), Some("MIT"));
        assert_eq!(table.rows[0].affiliation_country.as_deref(), Some("USA"));

        let raw_text = std::fs::read_to_string(&raw)?;
        assert!(raw_text.contains("2022-06-01"));
        assert!(raw_text.lines().next().unwrap_or_default().ends_with("citedbyCount"));
        Ok(())
    }

    #[test]
    fn test_normalize_no_data_writes_nothing() -> Result<()> {
        let dir = TempDir::new()?;
        let raw = dir.path().join("publications.csv");
        let pre = dir.path().join("publications_preprocessed.csv");

        let result = normalize(
            vec![vec![]],
            OutputPaths {
                raw: &raw,
                preprocessed: &pre,
            },
        );
        assert!(matches!(result, Err(AnalyzerError::NoData)));
        assert!(!raw.exists());
        assert!(!pre.exists());
        Ok(())
    }
}
