//! # pubanalyzer
//!
//! Scopus publication pipeline: fetch per-topic search results, normalize them
//! into a clean table, derive chart datasets and export RDF.
//!
//! ## Modules
//!
//! - [`scopus`] - Paginated Scopus search client with bounded retry
//! - [`extract`] - Raw entry to flat record mapping
//! - [`affiliation`] - Affiliation blob parser
//! - [`normalize`] - Normalization stages (impute, standardize, deduplicate)
//! - [`table`] - Working table and CSV persistence
//! - [`pipeline`] - Topic loop and cache handling
//! - [`analysis`] - Chart datasets
//! - [`rdf`] - RDF/XML export
//! - [`config`] - Credentials and run settings
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pubanalyzer::config::{Credentials, Settings};
//! use pubanalyzer::pipeline::Pipeline;
//! use pubanalyzer::scopus::{RetryPolicy, ScopusClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let credentials = Credentials::load_from(None)?;
//!     let client = ScopusClient::new(credentials, RetryPolicy::default())?;
//!     let table = Pipeline::new(client, Settings::default()).run_cached(false).await?;
//!     println!("{} publications", table.len());
//!     Ok(())
//! }
//! ```

pub mod affiliation;
pub mod analysis;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod rdf;
pub mod scopus;
pub mod table;

pub use error::{AnalyzerError, Result};
