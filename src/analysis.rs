//! Chart datasets derived from the preprocessed table.
//!
//! Each chart is a small table written as CSV under the plots directory.
//! Rendering images from these tables is left to whatever front end reads
//! them.

use crate::error::Result;
use crate::table::{save_csv, Publication, PublicationTable};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Entries kept in the top-N charts
pub const TOP_N: usize = 10;

/// Bins in the citation histogram
pub const HISTOGRAM_BINS: usize = 20;

/// Header of every categorical chart file
const LABEL_VALUE_COLUMNS: &[&str] = &["label", "value"];

/// Header of the histogram file
const HISTOGRAM_COLUMNS: &[&str] = &["bin_start", "bin_end", "count"];

/// One bar of a categorical chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelValue {
    pub label: String,
    pub value: f64,
}

/// One bin of the citation histogram, `[bin_start, bin_end)` except the last
/// bin which is closed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub bin_start: f64,
    pub bin_end: f64,
    pub count: usize,
}

/// Every chart dataset of the dashboard
#[derive(Debug, Clone, Default, Serialize)]
pub struct Analysis {
    pub citations_distribution: Vec<HistogramBin>,
    pub citations_by_author: Vec<LabelValue>,
    pub publications_by_author: Vec<LabelValue>,
    pub publications_by_year: Vec<LabelValue>,
    pub publications_by_journal: Vec<LabelValue>,
    pub publications_by_topic: Vec<LabelValue>,
    pub publications_by_affiliation: Vec<LabelValue>,
    pub affiliations_by_country: Vec<LabelValue>,
}

impl Analysis {
    /// Compute every chart from the table
    pub fn compute(table: &PublicationTable) -> Self {
        let rows = &table.rows;

        let mut by_year = tally(
            rows.iter()
                .filter_map(|r| r.year)
                .map(|y| (y.to_string(), 1.0)),
        );
        by_year.sort_by(|a, b| a.label.cmp(&b.label));

        Self {
            citations_distribution: histogram(
                &rows.iter().map(Publication::citations).collect::<Vec<_>>(),
                HISTOGRAM_BINS,
            ),
            citations_by_author: top_n(
                tally(rows.iter().map(|r| (r.authors.clone(), r.citations()))),
                TOP_N,
            ),
            publications_by_author: top_n(count(rows.iter().map(|r| r.authors.clone())), TOP_N),
            publications_by_year: by_year,
            publications_by_journal: top_n(
                count(rows.iter().map(|r| r.publication_name.clone())),
                TOP_N,
            ),
            publications_by_topic: count(rows.iter().map(|r| r.topic.clone())),
            publications_by_affiliation: top_n(
                count(rows.iter().filter_map(|r| r.affilname.clone())),
                TOP_N,
            ),
            affiliations_by_country: count(
                rows.iter().filter_map(|r| r.affiliation_country.clone()),
            ),
        }
    }

    /// Write one CSV per chart into `dir`; returns the written paths
    pub fn write(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        let path = dir.join("citations_distribution.csv");
        save_csv(&path, HISTOGRAM_COLUMNS, &self.citations_distribution)?;
        written.push(path);

        let charts: [(&str, &Vec<LabelValue>); 7] = [
            ("citations_by_author", &self.citations_by_author),
            ("publications_by_author", &self.publications_by_author),
            ("publications_by_year", &self.publications_by_year),
            ("publications_by_journal", &self.publications_by_journal),
            ("publications_by_topic", &self.publications_by_topic),
            ("publications_by_affiliation", &self.publications_by_affiliation),
            ("affiliations_by_country", &self.affiliations_by_country),
        ];
        for (name, data) in charts {
            let path = dir.join(format!("{}.csv", name));
            save_csv(&path, LABEL_VALUE_COLUMNS, data)?;
            written.push(path);
        }

        info!(dir = %dir.display(), charts = written.len(), "Wrote chart datasets");
        Ok(written)
    }
}

/// Sum values per label, skipping empty labels; order of first appearance
fn tally(items: impl Iterator<Item = (String, f64)>) -> Vec<LabelValue> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<LabelValue> = Vec::new();

    for (label, value) in items {
        if label.trim().is_empty() {
            continue;
        }
        match index.get(&label) {
            Some(&i) => out[i].value += value,
            None => {
                index.insert(label.clone(), out.len());
                out.push(LabelValue { label, value });
            }
        }
    }
    out
}

/// Occurrences per label
fn count(labels: impl Iterator<Item = String>) -> Vec<LabelValue> {
    tally(labels.map(|l| (l, 1.0)))
}

/// Largest `n` entries; ties keep first-appearance order
fn top_n(mut items: Vec<LabelValue>, n: usize) -> Vec<LabelValue> {
    // stable sort keeps appearance order among equal values
    items.sort_by(|a, b| b.value.total_cmp(&a.value));
    items.truncate(n);
    items
}

/// Equal-width histogram over the value range.
///
/// A constant column gets the range `[v - 0.5, v + 0.5]`.
fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }

    let mut lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            bin_start: lo + width * i as f64,
            bin_end: lo + width * (i + 1) as f64,
            count,
        })
        .collect()
}
