//! HTTP version metadata source.
//!
//! ### Request
//! - GET on the configured endpoint with a `_t=<epoch millis>` query pair
//! - `Cache-Control: no-cache` and `Pragma: no-cache` so no intermediate cache answers
//!
//! ### Response
//! - Non-2xx status is `HttpStatus`
//! - Body must be a `{version, lastUpdated}` JSON document, at most `max_bytes`
//! - Transport timeouts surface as `FetchTimeout`, every other transport failure as `Network`

pub mod url;

use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use self::url::{CACHE_BUST_PARAM, UrlError, cache_busted, canonicalize};

use freshwatch_core::detector::VersionSource;
use freshwatch_core::{AppConfig, Error, VersionRecord};

/// Configuration for the metadata client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "freshwatch/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum metadata body size in bytes (default: 64KB)
    pub max_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "freshwatch/0.1".to_string(), timeout: Duration::from_millis(20_000), max_bytes: 64 * 1024 }
    }
}

impl FetchConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// Fetches version metadata over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpVersionSource {
    http: Client,
    endpoint: ::url::Url,
    config: FetchConfig,
}

impl HttpVersionSource {
    /// Create a source for `endpoint` with the given configuration.
    pub fn new(endpoint: &str, config: FetchConfig) -> Result<Self, Error> {
        let endpoint = canonicalize(endpoint).map_err(|e| Error::InvalidInput(e.to_string()))?;

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, endpoint, config })
    }

    pub fn endpoint(&self) -> &::url::Url {
        &self.endpoint
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl VersionSource for HttpVersionSource {
    async fn fetch(&self) -> Result<VersionRecord, Error> {
        let start = Instant::now();
        let url = cache_busted(&self.endpoint, chrono::Utc::now().timestamp_millis());

        let response = self
            .http
            .get(url.as_str())
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus { status: status.as_u16() });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::MalformedResponse(format!("{len} bytes exceeds {}", self.config.max_bytes)));
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        if bytes.len() > self.config.max_bytes {
            return Err(Error::MalformedResponse(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let record: VersionRecord =
            serde_json::from_slice(&bytes).map_err(|e| Error::MalformedResponse(e.to_string()))?;
        if record.version.trim().is_empty() {
            return Err(Error::MalformedResponse("empty version".to_string()));
        }

        tracing::debug!(
            version = %record.version,
            last_updated = ?record.last_updated,
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched version metadata from {}",
            self.endpoint
        );

        Ok(record)
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::FetchTimeout(err.to_string()) } else { Error::Network(err.to_string()) }
}
