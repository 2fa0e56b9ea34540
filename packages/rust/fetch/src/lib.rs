//! Retrying HTTP fetcher for documentation pages.
//!
//! Transient failures (timeouts, connection resets, 408/429/5xx) are retried
//! with bounded exponential backoff; other 4xx and malformed URLs fail
//! immediately with a permanent error kind. A minimum inter-request delay is
//! enforced per target host. No caching happens here — change detection
//! lives in the pipeline driver.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use certcorpus_shared::{CorpusError, FetchConfig, Result};

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("CertCorpus/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher with per-host rate limiting and retry/backoff.
///
/// Safe to share across concurrent document pipelines; the per-host
/// last-request map is the only internal state.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl Fetcher {
    /// Create a new fetcher with the given policy.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CorpusError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            last_request: Mutex::new(HashMap::new()),
        })
    }

    /// Fetch the raw body of `url`.
    ///
    /// Returns a permanent fetch error without any retry for malformed URLs
    /// and non-retryable HTTP statuses (404, other non-429 4xx).
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| CorpusError::fetch_permanent(url, format!("malformed URL: {e}")))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(CorpusError::fetch_permanent(
                url,
                format!("unsupported scheme: {}", parsed.scheme()),
            ));
        }

        let host = parsed.host_str().unwrap_or_default().to_string();

        let mut attempt: u32 = 0;
        loop {
            self.wait_for_host_slot(&host).await;

            match self.try_fetch(&parsed).await {
                Ok(body) => {
                    debug!(%url, attempt, bytes = body.len(), "fetched");
                    return Ok(body);
                }
                Err(err) => {
                    let transient = matches!(err.fetch_kind(), Some(certcorpus_shared::FetchKind::Transient));
                    if transient && attempt + 1 < self.config.max_attempts {
                        let delay = self.backoff(attempt);
                        warn!(%url, attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient fetch failure, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// One attempt: send the request and classify the outcome.
    async fn try_fetch(&self, url: &Url) -> Result<String> {
        let response = match self.client.get(url.as_str()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                // Timeouts, refused connections, and resets are retryable;
                // anything reqwest rejects before sending is not.
                return if e.is_timeout() || e.is_connect() || e.is_request() {
                    Err(CorpusError::fetch_transient(url.as_str(), e.to_string()))
                } else {
                    Err(CorpusError::fetch_permanent(url.as_str(), e.to_string()))
                };
            }
        };

        let status = response.status();
        if status.is_success() {
            return response
                .text()
                .await
                .map_err(|e| CorpusError::fetch_transient(url.as_str(), format!("body read failed: {e}")));
        }

        let message = format!("HTTP {status}");
        if is_retryable_status(status) {
            Err(CorpusError::fetch_transient(url.as_str(), message))
        } else {
            Err(CorpusError::fetch_permanent(url.as_str(), message))
        }
    }

    /// Exponential backoff: `base * 2^attempt`, capped at 64x the base so
    /// large configured attempt counts cannot overflow the factor.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(6);
        Duration::from_millis(self.config.base_backoff_ms.saturating_mul(factor))
    }

    /// Enforce the minimum inter-request delay for `host` across all
    /// concurrent callers sharing this fetcher.
    async fn wait_for_host_slot(&self, host: &str) {
        if self.config.rate_limit_ms == 0 || host.is_empty() {
            return;
        }
        let min_gap = Duration::from_millis(self.config.rate_limit_ms);

        loop {
            let wait = {
                let mut last = self.last_request.lock().await;
                let now = Instant::now();
                match last.get(host) {
                    Some(prev) if now.duration_since(*prev) < min_gap => {
                        min_gap - now.duration_since(*prev)
                    }
                    _ => {
                        last.insert(host.to_string(), now);
                        return;
                    }
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Statuses worth retrying: request timeout, rate limiting, and server errors.
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}
