//! pubanalyzer - Scopus publication pipeline
//!
//! Fetches publications for a fixed set of subject areas, normalizes them into
//! a CSV table, derives chart datasets and exports RDF.
//!
//! ## Usage
//!
//! ### Pipeline
//! ```bash
//! pubanalyzer run --output ./data
//! pubanalyzer analyze --output ./data
//! pubanalyzer rdf --topic COMP --limit 10 --output ./data
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! pubanalyzer serve --port 5000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use clap::{Args, Parser, Subcommand};
use pubanalyzer::{
    analysis::Analysis,
    config::{Credentials, Settings, DEFAULT_PAGE_SIZE, DEFAULT_TOPICS, DEFAULT_TOTAL_PER_TOPIC},
    pipeline::{self, Pipeline},
    rdf,
    scopus::{RetryPolicy, ScopusClient},
    table::PublicationTable,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Topic exported by the dashboard's RDF button
const DASHBOARD_RDF_TOPIC: &str = "COMP";

/// Rows exported by the dashboard's RDF button
const DASHBOARD_RDF_LIMIT: usize = 10;

// ============================================================================
// CLI Definition
// ============================================================================

/// Scopus publication pipeline
#[derive(Parser)]
#[command(name = "pubanalyzer")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Credential file (JSON with "apikey" and optional "insttoken")
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for every produced file
    #[arg(short, long, global = true, default_value = ".")]
    output: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, normalize and persist the publication table
    Run {
        /// Re-run even when the preprocessed table already exists
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Compute chart datasets from the preprocessed table
    Analyze,

    /// Export one topic of the preprocessed table as RDF/XML
    Rdf {
        /// Topic code to export
        #[arg(long, default_value = DASHBOARD_RDF_TOPIC)]
        topic: String,

        /// Maximum publications to export
        #[arg(long, default_value_t = DASHBOARD_RDF_LIMIT)]
        limit: usize,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "5000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[command(flatten)]
        fetch: FetchArgs,
    },
}

/// Options controlling a fetch
#[derive(Args, Clone)]
struct FetchArgs {
    /// Comma-separated topic codes (default: the ten standard subject areas)
    #[arg(long, value_delimiter = ',')]
    topics: Option<Vec<String>>,

    /// Entries requested per topic
    #[arg(long, default_value_t = DEFAULT_TOTAL_PER_TOPIC)]
    total: usize,

    /// Entries requested per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Attempts per page before giving up on a topic
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Backoff after the first failed attempt, in milliseconds
    #[arg(long, default_value_t = 1000)]
    backoff_ms: u64,
}

impl FetchArgs {
    fn settings(&self, output: PathBuf) -> Settings {
        Settings {
            topics: self
                .topics
                .clone()
                .unwrap_or_else(|| DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect()),
            total_per_topic: self.total,
            page_size: self.page_size,
            output_dir: output,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_ms),
            ..Default::default()
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Run { force, fetch } => {
            let table = run_pipeline(cli.config, cli.output, &fetch, force).await?;
            println!("Preprocessed table: {} publications", table.len());
            Ok(())
        }
        Commands::Analyze => run_analysis(cli.output),
        Commands::Rdf { topic, limit } => run_rdf_export(cli.output, &topic, limit),
        Commands::Serve { port, host, fetch } => {
            // Warm the cache before serving, like the dashboard expects
            run_pipeline(cli.config, cli.output.clone(), &fetch, false).await?;
            run_server(host, port, cli.output).await
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_pipeline(
    config: Option<PathBuf>,
    output: PathBuf,
    fetch: &FetchArgs,
    force: bool,
) -> Result<PublicationTable> {
    let settings = fetch.settings(output);

    // Credentials are only needed when the cache misses
    if let Some(table) =
        pipeline::load_cached(&settings, force).context("Failed to load preprocessed table")?
    {
        return Ok(table);
    }

    let credentials =
        Credentials::load_from(config.as_deref()).context("Failed to load API credentials")?;
    let client = ScopusClient::new(credentials, fetch.retry_policy())?;
    let pipeline = Pipeline::new(client, settings);

    let table = pipeline.run().await.context("Pipeline failed")?;

    // Chart datasets are regenerated whenever the table is
    Analysis::compute(&table)
        .write(&pipeline.settings().plots_dir())
        .context("Failed to write chart datasets")?;

    Ok(table)
}

fn load_table(output: &std::path::Path) -> Result<PublicationTable> {
    let settings = Settings {
        output_dir: output.to_path_buf(),
        ..Default::default()
    };
    let path = settings.preprocessed_path();
    PublicationTable::load(&path)
        .with_context(|| format!("Failed to load {:?}; run `pubanalyzer run` first", path))
}

fn run_analysis(output: PathBuf) -> Result<()> {
    let table = load_table(&output)?;
    let settings = Settings {
        output_dir: output,
        ..Default::default()
    };

    let written = Analysis::compute(&table).write(&settings.plots_dir())?;
    for path in written {
        println!("Saved: {:?}", path);
    }
    Ok(())
}

fn run_rdf_export(output: PathBuf, topic: &str, limit: usize) -> Result<()> {
    let table = load_table(&output)?;
    let settings = Settings {
        output_dir: output,
        ..Default::default()
    };

    let path = settings.rdf_path(topic);
    let exported = rdf::export_topic(&table, topic, limit, &path)
        .context("Failed to export RDF")?;
    println!("RDF data for {} publications has been written to {:?}", exported, path);
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

struct AppState {
    output: PathBuf,
}

async fn run_server(host: String, port: u16, output: PathBuf) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let app_state = Arc::new(AppState { output });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/analysis", get(analysis_handler))
        .route("/generate_rdf", post(generate_rdf_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

fn internal_error(e: anyhow::Error) -> (StatusCode, Json<MessageResponse>) {
    error!(error = %e, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MessageResponse {
            message: format!("{:#}", e),
        }),
    )
}

/// Chart datasets as JSON
async fn analysis_handler(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<Analysis>, (StatusCode, Json<MessageResponse>)> {
    let table = load_table(&state.output).map_err(internal_error)?;
    Ok(Json(Analysis::compute(&table)))
}

/// Export the dashboard topic as RDF
async fn generate_rdf_handler(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<MessageResponse>, (StatusCode, Json<MessageResponse>)> {
    run_rdf_export(state.output.clone(), DASHBOARD_RDF_TOPIC, DASHBOARD_RDF_LIMIT)
        .map_err(internal_error)?;

    Ok(Json(MessageResponse {
        message: "RDF Generation Completed".to_string(),
    }))
}
