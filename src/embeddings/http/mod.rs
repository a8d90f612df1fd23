// Blocking HTTP client shared by the embedders and the Qdrant store
// Callers on the async runtime run these requests inside `spawn_blocking`.


use anyhow::{Context, Result, anyhow};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MILLIS: u64 = 1000;

/// Non-success status returned by the server
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("HTTP error {status}")]
pub struct HttpStatusError {
    pub status: u16,
}

/// Status code carried by an error from [`HttpClient`], if any
#[inline]
pub fn status_of(error: &anyhow::Error) -> Option<u16> {
    error
        .downcast_ref::<HttpStatusError>()
        .map(|error| error.status)
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    headers: Vec<(String, String)>,
    retry_attempts: u32,
    backoff: Duration,
}

impl Default for HttpClient {
    #[inline]
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
    }
}

impl HttpClient {
    #[inline]
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            agent,
            headers: Vec::new(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MILLIS),
        }
    }

    /// Send `name: value` with every request
    #[inline]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[inline]
    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Delay before the second attempt; doubled for each further attempt
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub fn get(&self, url: &str) -> Result<String> {
        self.send_with_retry(url, || {
            self.with_headers(self.agent.get(url))
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    #[inline]
    pub fn delete(&self, url: &str) -> Result<String> {
        self.send_with_retry(url, || {
            self.with_headers(self.agent.delete(url))
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    #[inline]
    pub fn post_json(&self, url: &str, body: &str) -> Result<String> {
        self.send_with_retry(url, || {
            self.with_headers(self.agent.post(url))
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    #[inline]
    pub fn put_json(&self, url: &str, body: &str) -> Result<String> {
        self.send_with_retry(url, || {
            self.with_headers(self.agent.put(url))
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn with_headers<B>(&self, mut request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    /// Retry server errors and transport failures with exponential backoff; client errors fail fast
    fn send_with_retry<F>(&self, url: &str, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!(
                "HTTP request to {} attempt {}/{}",
                url, attempt, self.retry_attempts
            );

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(ureq::Error::StatusCode(status)) if status < 500 => {
                    warn!("Client error (status {}) from {}, not retrying", status, url);
                    return Err(HttpStatusError { status }.into());
                }
                Err(error) if is_retryable(&error) => {
                    warn!(
                        "Request to {} failed: {}, attempt {}/{}",
                        url, error, attempt, self.retry_attempts
                    );
                    last_error = Some(into_anyhow(error));

                    if attempt < self.retry_attempts {
                        let delay = self.backoff * 2_u32.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
                Err(error) => {
                    warn!("Non-retryable error from {}: {}", url, error);
                    return Err(into_anyhow(error))
                        .with_context(|| format!("Request to {} failed", url));
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);
        Err(last_error.unwrap_or_else(|| anyhow!("Request to {} failed after retries", url)))
    }
}

fn is_retryable(error: &ureq::Error) -> bool {
    matches!(
        error,
        ureq::Error::StatusCode(_)
            | ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
            | ureq::Error::Timeout(_)
            | ureq::Error::Io(_)
    )
}

fn into_anyhow(error: ureq::Error) -> anyhow::Error {
    match error {
        ureq::Error::StatusCode(status) => HttpStatusError { status }.into(),
        other => anyhow::Error::from(other),
    }
}
