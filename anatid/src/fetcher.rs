use crate::types::{AggregatorError, FetchConfig, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Shared HTTP client for feed polls and post submissions.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    /// GET a backend feed and return its body.
    ///
    /// Transport errors and non-success statuses are retried with exponential backoff up to
    /// `max_retries` times; the last error is returned.
    pub async fn fetch_feed(&self, url: &str) -> Result<String> {
        let start_time = Instant::now();

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(content) => {
                    debug!(
                        "Fetched {} ({} bytes in {}ms)",
                        url,
                        content.len(),
                        start_time.elapsed().as_millis()
                    );
                    return Ok(content);
                }
                Err(e @ AggregatorError::FeedTooLarge { .. }) => return Err(e),
                Err(e) => {
                    if attempt >= self.config.max_retries {
                        return Err(e);
                    }
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!("Attempt {} failed for {}: {}, retrying in {:?}", attempt + 1, url, e, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(AggregatorError::Status { url: url.to_string(), status });
        }

        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_feed_size_mb {
                return Err(AggregatorError::FeedTooLarge { size_mb });
            }
        }

        Ok(response.text().await?)
    }

    /// POST a url-encoded form, optionally overriding the client's User-Agent.
    pub async fn submit_form(
        &self,
        url: &str,
        form: &[(String, String)],
        user_agent: Option<&str>,
    ) -> Result<StatusCode> {
        let mut request = self.client.post(url).form(form);

        if let Some(user_agent) = user_agent {
            request = request.header(USER_AGENT, user_agent);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(AggregatorError::Status { url: url.to_string(), status });
        }

        Ok(status)
    }
}
