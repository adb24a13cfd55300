//! Pipeline orchestration
//!
//! Fetches every topic one after another, extracts the entries and hands the
//! batches to the normalizer. The preprocessed file doubles as a cache: when
//! it exists the fetch is skipped entirely.

use crate::config::Settings;
use crate::error::Result;
use crate::extract::{extract_all, PublicationRecord};
use crate::normalize::{normalize, OutputPaths};
use crate::scopus::{ScopusClient, Transport};
use crate::table::PublicationTable;
use tracing::{info, warn};

/// Sequential fetch-and-normalize pipeline
pub struct Pipeline<T> {
    client: ScopusClient<T>,
    settings: Settings,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(client: ScopusClient<T>, settings: Settings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn client(&self) -> &ScopusClient<T> {
        &self.client
    }

    /// Fetch and extract every topic; topics with no entries yield no batch
    pub async fn fetch_batches(&self) -> Vec<Vec<PublicationRecord>> {
        let mut batches = Vec::new();

        for topic in &self.settings.topics {
            let entries = self
                .client
                .fetch_all(topic, self.settings.total_per_topic, self.settings.page_size)
                .await;

            if entries.is_empty() {
                warn!(topic = %topic, "No publications retrieved for topic");
                continue;
            }

            let records = extract_all(&entries, topic);
            info!(topic = %topic, records = records.len(), "Extracted topic records");
            batches.push(records);
        }

        batches
    }

    /// Run the whole pipeline from scratch
    pub async fn run(&self) -> Result<PublicationTable> {
        info!(
            topics = self.settings.topics.len(),
            total_per_topic = self.settings.total_per_topic,
            page_size = self.settings.page_size,
            "Starting pipeline"
        );

        let batches = self.fetch_batches().await;
        let raw = self.settings.raw_path();
        let preprocessed = self.settings.preprocessed_path();
        let table = normalize(
            batches,
            OutputPaths {
                raw: &raw,
                preprocessed: &preprocessed,
            },
        )?;

        info!(rows = table.len(), "Pipeline complete");
        Ok(table)
    }

    /// Load the preprocessed table if it exists, otherwise run the pipeline.
    /// `force` always re-runs.
    pub async fn run_cached(&self, force: bool) -> Result<PublicationTable> {
        match load_cached(&self.settings, force)? {
            Some(table) => Ok(table),
            None => self.run().await,
        }
    }
}

/// The preprocessed table of a previous run, unless `force` is set or no
/// such file exists. Needs no client, so callers can defer loading
/// credentials until a fetch is really required.
pub fn load_cached(settings: &Settings, force: bool) -> Result<Option<PublicationTable>> {
    let preprocessed = settings.preprocessed_path();
    if force || !preprocessed.exists() {
        return Ok(None);
    }
    info!(path = %preprocessed.display(), "Preprocessed table found, skipping fetch");
    PublicationTable::load(&preprocessed).map(Some)
}
