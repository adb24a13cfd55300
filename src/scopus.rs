//! Scopus search API client
//!
//! Issues paginated subject-area queries against the Elsevier Scopus search
//! endpoint. Requests go through a [`Transport`] so the retry behavior can be
//! exercised without network I/O.
//!
//! API details:
//! - `GET /content/search/scopus?query=SUBJAREA(COMP)&start=0&count=25`
//! - Credential in the `X-ELS-APIKey` header, optional `X-ELS-Insttoken`
//! - Results live at `search-results.entry`; an empty result set is reported
//!   as a single placeholder entry carrying an `error` key

use crate::config::Credentials;
use crate::error::{AnalyzerError, OptionExt, Result};
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Scopus search endpoint
pub const SCOPUS_SEARCH_URL: &str = "https://api.elsevier.com/content/search/scopus";

/// Statuses retried by the default policy
pub const DEFAULT_RETRY_STATUSES: &[u16] = &[500, 502, 503, 504];

/// Bounded retry policy for a single page request
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further failure
    pub base_delay: Duration,
    /// HTTP statuses treated as transient
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `failed_attempts` consecutive failures (1-based):
    /// `base_delay * 2^(failed_attempts - 1)`.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(2u32.pow(exponent))
            .unwrap_or(Duration::MAX)
    }

    /// Whether an HTTP status should be retried
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// One outbound GET request
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl SearchRequest {
    /// Value of a query parameter, if present
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a [`SearchRequest`] and returns the raw response.
///
/// Implementations report network-level faults as [`AnalyzerError::Network`]
/// and return every HTTP status (including errors) as an `Ok` response; the
/// client decides what is retryable.
pub trait Transport {
    fn send(&self, request: &SearchRequest) -> impl Future<Output = Result<HttpResponse>> + Send;
}

/// Production transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("pubanalyzer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnalyzerError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &SearchRequest) -> Result<HttpResponse> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// One publication entry as returned by the API.
///
/// Fields are sparse; every read goes through [`RawEntry::get`] and the
/// extractor supplies defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry(pub serde_json::Map<String, Value>);

impl RawEntry {
    /// Field value, treating JSON `null` the same as an absent key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Whether the key exists at all (even with a `null` value)
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// Scopus search client with bounded retry
pub struct ScopusClient<T = ReqwestTransport> {
    transport: T,
    credentials: Credentials,
    policy: RetryPolicy,
    base_url: String,
}

impl ScopusClient<ReqwestTransport> {
    /// Create a client talking to the real Scopus endpoint
    pub fn new(credentials: Credentials, policy: RetryPolicy) -> Result<Self> {
        Ok(Self::with_transport(
            ReqwestTransport::new()?,
            credentials,
            policy,
        ))
    }
}

impl<T: Transport> ScopusClient<T> {
    /// Create a client over an arbitrary transport
    pub fn with_transport(transport: T, credentials: Credentials, policy: RetryPolicy) -> Self {
        Self {
            transport,
            credentials,
            policy,
            base_url: SCOPUS_SEARCH_URL.to_string(),
        }
    }

    /// Override the search endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Access the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build the request for one page of a topic
    fn build_request(&self, topic: &str, start: usize, count: usize) -> SearchRequest {
        let mut headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("X-ELS-APIKey".to_string(), self.credentials.api_key.clone()),
        ];
        if let Some(token) = &self.credentials.inst_token {
            headers.push(("X-ELS-Insttoken".to_string(), token.clone()));
        }

        SearchRequest {
            url: self.base_url.clone(),
            query: vec![
                ("query".to_string(), subject_area_query(topic)),
                ("start".to_string(), start.to_string()),
                ("count".to_string(), count.to_string()),
            ],
            headers,
        }
    }

    /// Fetch one page of entries for a topic.
    ///
    /// Transient failures are retried according to the policy. Exhausted
    /// retries, non-retryable statuses and malformed bodies are logged and
    /// returned as `Err`.
    pub async fn fetch_page(
        &self,
        topic: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<RawEntry>> {
        let request = self.build_request(topic, start, count);
        debug!(topic = %topic, start = start, count = count, "Fetching Scopus page");

        let result = match self.send_with_retry(&request).await {
            Ok(response) => parse_entries(&response.body),
            Err(e) => Err(e),
        };

        match result {
            Ok(entries) => {
                debug!(topic = %topic, start = start, entries = entries.len(), "Page fetched");
                Ok(entries)
            }
            Err(e) => {
                warn!(topic = %topic, start = start, error = %e, "Failed to fetch page");
                Err(e)
            }
        }
    }

    /// Send a request, retrying network faults and retryable statuses
    async fn send_with_retry(&self, request: &SearchRequest) -> Result<HttpResponse> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let (error, retryable) = match self.transport.send(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => {
                    let retryable = self.policy.is_retryable_status(response.status);
                    (status_error(&response), retryable)
                }
                Err(e) => {
                    let retryable = e.is_network();
                    (e, retryable)
                }
            };

            if !retryable {
                return Err(error);
            }
            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %error, "Retries exhausted");
                return Err(error);
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                attempt = attempt,
                max_attempts = max_attempts,
                backoff_ms = delay.as_millis() as u64,
                error = %error,
                "Transient failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Fetch up to `total_count` entries for a topic, page by page.
    ///
    /// Stops at the first empty or failed page. A failure is never retried at
    /// this level and never propagates; the entries gathered so far are kept.
    pub async fn fetch_all(
        &self,
        topic: &str,
        total_count: usize,
        page_size: usize,
    ) -> Vec<RawEntry> {
        let mut all_entries = Vec::new();

        if page_size == 0 {
            warn!(topic = %topic, "Page size is zero, nothing to fetch");
            return all_entries;
        }

        let mut start = 0;
        while start < total_count {
            let count = page_size.min(total_count - start);
            match self.fetch_page(topic, start, count).await {
                Ok(entries) if entries.is_empty() => {
                    debug!(topic = %topic, start = start, "Empty page, stopping");
                    break;
                }
                Ok(entries) => all_entries.extend(entries),
                Err(_) => {
                    info!(topic = %topic, start = start, "Stopping pagination after failed page");
                    break;
                }
            }
            start += page_size;
        }

        info!(topic = %topic, total = all_entries.len(), "Topic fetch complete");
        all_entries
    }
}

/// Subject-area query expression for a topic code
pub fn subject_area_query(topic: &str) -> String {
    format!("SUBJAREA({})", topic)
}

fn status_error(response: &HttpResponse) -> AnalyzerError {
    let snippet: String = response.body.chars().take(200).collect();
    AnalyzerError::Http {
        status: response.status,
        message: if snippet.is_empty() {
            "Scopus API error".to_string()
        } else {
            format!("Scopus API error: {}", snippet)
        },
    }
}

/// Parse the entries out of a search response body.
///
/// The `search-results.entry` array must exist. Placeholder entries carrying
/// an `error` key and non-object entries are dropped.
pub fn parse_entries(body: &str) -> Result<Vec<RawEntry>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AnalyzerError::Parse(format!("Failed to parse Scopus response: {}", e)))?;

    let entries = value
        .get("search-results")
        .and_then(|r| r.get("entry"))
        .and_then(Value::as_array)
        .ok_or_parse("Scopus response has no search-results.entry array")?;

    Ok(entries
        .iter()
        .filter_map(Value::as_object)
        .filter(|obj| !obj.contains_key("error"))
        .map(|obj| RawEntry(obj.clone()))
        .collect())
}

/// Scripted transport shared by the crate's tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Replays queued responses per `query` parameter. An exhausted queue
    /// answers with an empty result page.
    #[derive(Default)]
    pub struct ScriptedTransport {
        scripts: Mutex<HashMap<String, VecDeque<Result<HttpResponse>>>>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, topic: &str, response: Result<HttpResponse>) {
            self.scripts
                .lock()
                .expect("scripts lock")
                .entry(subject_area_query(topic))
                .or_default()
                .push_back(response);
        }

        pub fn requests(&self) -> Vec<SearchRequest> {
            self.requests.lock().expect("requests lock").clone()
        }

        pub fn requests_for(&self, topic: &str) -> usize {
            let query = subject_area_query(topic);
            self.requests()
                .iter()
                .filter(|r| r.query_param("query") == Some(query.as_str()))
                .count()
        }
    }

    impl Transport for ScriptedTransport {
        async fn send(&self, request: &SearchRequest) -> Result<HttpResponse> {
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.clone());

            let key = request.query_param("query").unwrap_or_default().to_string();
            let next = self
                .scripts
                .lock()
                .expect("scripts lock")
                .get_mut(&key)
                .and_then(VecDeque::pop_front);

            next.unwrap_or_else(|| Ok(ok_page(Vec::new())))
        }
    }

    pub fn page_body(entries: Vec<Value>) -> String {
        serde_json::json!({ "search-results": { "entry": entries } }).to_string()
    }

    pub fn ok_page(entries: Vec<Value>) -> HttpResponse {
        HttpResponse {
            status: 200,
            body: page_body(entries),
        }
    }

    pub fn status(code: u16) -> HttpResponse {
        HttpResponse {
            status: code,
            body: String::new(),
        }
    }

    /// A transport-level failure, as reqwest reports it
    pub fn network_error() -> AnalyzerError {
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .expect_err("invalid url is rejected");
        AnalyzerError::Network(err)
    }

    pub fn credentials() -> Credentials {
        Credentials {
            api_key: "test-key".to_string(),
            inst_token: None,
        }
    }

    pub fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    pub fn client(transport: ScriptedTransport) -> ScopusClient<ScriptedTransport> {
        ScopusClient::with_transport(transport, credentials(), fast_policy())
    }
}
