//! Credential loading and run settings.
//!
//! The API credential is read once at startup from a JSON file and handed to
//! the fetch client as a plain value. Nothing below this module reads
//! configuration from the environment.

use crate::error::{AnalyzerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Credential file name looked up in the working directory first
pub const CONFIG_FILE_NAME: &str = "Config.json";

/// Subject-area codes fetched by a default run
pub const DEFAULT_TOPICS: &[&str] = &[
    "COMP", "ENGI", "MEDI", "BIOC", "CHEM", "PHYS", "MATH", "ECON", "SOCI", "PSYC",
];

/// Entries requested per topic
pub const DEFAULT_TOTAL_PER_TOPIC: usize = 100;

/// Entries requested per page
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Raw snapshot written before any cleaning
pub const RAW_FILE_NAME: &str = "publications.csv";

/// Final table, also used as the pipeline cache signal
pub const PREPROCESSED_FILE_NAME: &str = "publications_preprocessed.csv";

/// Directory (under the output dir) receiving chart datasets
pub const PLOTS_DIR_NAME: &str = "plots";

/// API credential as stored in `Config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Scopus API key, sent as `X-ELS-APIKey`
    #[serde(rename = "apikey")]
    pub api_key: String,
    /// Optional institutional token, sent as `X-ELS-Insttoken`
    #[serde(rename = "insttoken", default, skip_serializing_if = "Option::is_none")]
    pub inst_token: Option<String>,
}

impl Credentials {
    /// Load credentials from an explicit file.
    ///
    /// A missing file, malformed JSON or an empty API key is a configuration
    /// error; fetching cannot proceed without a key.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AnalyzerError::Config(format!(
                "credential file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let credentials: Credentials = serde_json::from_str(&content).map_err(|e| {
            AnalyzerError::Config(format!("invalid credential file {}: {}", path.display(), e))
        })?;

        if credentials.api_key.trim().is_empty() {
            return Err(AnalyzerError::Config(format!(
                "credential file {} has an empty apikey",
                path.display()
            )));
        }

        info!(
            path = %path.display(),
            inst_token = credentials.inst_token.is_some(),
            "Loaded API credentials"
        );
        Ok(credentials)
    }

    /// Load credentials from `path` if given, otherwise from the default
    /// locations (see [`default_config_path`]).
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::load(&default_config_path()),
        }
    }
}

/// Default credential path: `./Config.json`, falling back to
/// `<config_dir>/pubanalyzer/Config.json` when the local file is absent.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }

    match dirs::config_dir() {
        Some(dir) => {
            let candidate = dir.join("pubanalyzer").join(CONFIG_FILE_NAME);
            debug!(
                path = %candidate.display(),
                "Local Config.json not found, trying user config dir"
            );
            candidate
        }
        None => local,
    }
}

/// Run settings for one pipeline invocation
#[derive(Debug, Clone)]
pub struct Settings {
    /// Topic codes, fetched in this order
    pub topics: Vec<String>,
    /// Entries requested per topic
    pub total_per_topic: usize,
    /// Entries requested per page
    pub page_size: usize,
    /// Directory receiving every durable file
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            total_per_topic: DEFAULT_TOTAL_PER_TOPIC,
            page_size: DEFAULT_PAGE_SIZE,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Path of the raw merged table
    pub fn raw_path(&self) -> PathBuf {
        self.output_dir.join(RAW_FILE_NAME)
    }

    /// Path of the preprocessed table
    pub fn preprocessed_path(&self) -> PathBuf {
        self.output_dir.join(PREPROCESSED_FILE_NAME)
    }

    /// Directory receiving chart datasets
    pub fn plots_dir(&self) -> PathBuf {
        self.output_dir.join(PLOTS_DIR_NAME)
    }

    /// Path of the RDF export for one topic
    pub fn rdf_path(&self, topic: &str) -> PathBuf {
        self.output_dir.join(format!("publications_{}.rdf", topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_missing_file() {
        let err = Credentials::load(Path::new("/nonexistent/Config.json"));
        assert!(matches!(err, Err(AnalyzerError::Config(_))));
    }

    #[test]
    fn test_load_with_inst_token() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        write!(temp, r#"{{"apikey": "abc123", "insttoken": "tok"}}"#)?;

        let creds = Credentials::load(temp.path())?;
        assert_eq!(creds.api_key, "abc123");
        assert_eq!(creds.inst_token.as_deref(), Some("tok"));
        Ok(())
    }

    #[test]
    fn test_load_without_inst_token() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        write!(temp, r#"{{"apikey": "abc123"}}"#)?;

        let creds = Credentials::load(temp.path())?;
        assert!(creds.inst_token.is_none());
        Ok(())
    }

    #[test]
    fn test_load_empty_key_rejected() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        write!(temp, r#"{{"apikey": "  "}}"#)?;

        assert!(matches!(
            Credentials::load(temp.path()),
            Err(AnalyzerError::Config(_))
        ));
        Ok(())
    }

    #[test]
    fn test_settings_paths() {
        let settings = Settings {
            output_dir: PathBuf::from("/tmp/out"),
            ..Default::default()
        };
        assert_eq!(settings.topics.len(), 10);
        assert_eq!(settings.raw_path(), PathBuf::from("/tmp/out/publications.csv"));
        assert_eq!(
            settings.rdf_path("COMP"),
            PathBuf::from("/tmp/out/publications_COMP.rdf")
        );
    }
}
