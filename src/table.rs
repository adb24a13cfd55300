//! Working publication table and its CSV persistence.
//!
//! The column names written here are the contract consumed by the analysis
//! and RDF modules, so they stay fixed.

use crate::error::Result;
use crate::extract::PublicationRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Columns of the raw merged table, in file order
pub const RAW_COLUMNS: &[&str] = &[
    "topic",
    "authors",
    "title",
    "publicationName",
    "doi",
    "volume",
    "issue",
    "pageRange",
    "coverDate",
    "affiliation",
    "citedbyCount",
];

/// Columns of the preprocessed table, in file order
pub const PREPROCESSED_COLUMNS: &[&str] = &[
    "topic",
    "authors",
    "title",
    "publicationName",
    "doi",
    "volume",
    "issue",
    "pageRange",
    "coverDate",
    "affiliation",
    "citedbyCount",
    "affilname",
    "affiliation-country",
    "year",
    "month",
];

/// One row of the working table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Publication {
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
    #[serde(rename = "coverDate")]
    pub cover_date: Option<NaiveDate>,
    pub affiliation: String,
    #[serde(rename = "citedbyCount")]
    pub citedby_count: Option<f64>,
    pub affilname: Option<String>,
    #[serde(rename = "affiliation-country")]
    pub affiliation_country: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    /// Source date text awaiting parsing; not a column
    #[serde(skip)]
    pub cover_date_source: String,
}

impl From<PublicationRecord> for Publication {
    fn from(record: PublicationRecord) -> Self {
        Self {
            topic: record.topic,
            authors: record.authors,
            title: record.title,
            publication_name: record.publication_name,
            doi: record.doi,
            volume: record.volume,
            issue: record.issue,
            page_range: record.page_range,
            cover_date: None,
            affiliation: record.affiliation,
            citedby_count: record.citedby_count,
            affilname: None,
            affiliation_country: None,
            year: None,
            month: None,
            cover_date_source: record.cover_date,
        }
    }
}

impl Publication {
    /// Citation value, zero when still missing
    pub fn citations(&self) -> f64 {
        self.citedby_count.unwrap_or(0.0)
    }

    /// Author names split the way the API joins them
    pub fn author_names(&self) -> Vec<&str> {
        self.authors
            .split(", ")
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect()
    }
}

/// The working table: one row per publication, in fetch order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublicationTable {
    pub rows: Vec<Publication>,
}

impl PublicationTable {
    pub fn new(rows: Vec<Publication>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of one topic together with their position in the full table
    pub fn topic_rows<'a>(
        &'a self,
        topic: &'a str,
    ) -> impl Iterator<Item = (usize, &'a Publication)> + 'a {
        self.rows
            .iter()
            .enumerate()
            .filter(move |(_, row)| row.topic == topic)
    }

    /// Write the table as CSV with a header row
    pub fn save(&self, path: &Path) -> Result<()> {
        save_csv(path, PREPROCESSED_COLUMNS, &self.rows)?;
        info!(path = %path.display(), rows = self.rows.len(), "Saved preprocessed table");
        Ok(())
    }

    /// Read a table previously written by [`PublicationTable::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let rows = reader
            .deserialize::<Publication>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        info!(path = %path.display(), rows = rows.len(), "Loaded preprocessed table");
        Ok(Self { rows })
    }
}

/// Write the raw merged records before any cleaning
pub fn save_raw(path: &Path, records: &[PublicationRecord]) -> Result<()> {
    save_csv(path, RAW_COLUMNS, records)?;
    info!(path = %path.display(), rows = records.len(), "Saved raw table");
    Ok(())
}

/// Read a raw snapshot back
pub fn load_raw(path: &Path) -> Result<Vec<PublicationRecord>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let records = reader
        .deserialize::<PublicationRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Serialize rows to a CSV file, creating parent directories as needed.
///
/// `header` must match the field names of `T`; it is written directly only
/// when there are no rows to derive it from.
pub(crate) fn save_csv<T: Serialize>(path: &Path, header: &[&str], data: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    if data.is_empty() {
        wtr.write_record(header)?;
    }
    for item in data {
        wtr.serialize(item)?;
    }
    wtr.flush()?;
    Ok(())
}
