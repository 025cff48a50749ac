//! HTTP fetching with bounded retry.
//!
//! All three sources are plain GETs. On HTTP 429 an integer `Retry-After`
//! header is honored; every other transient failure (non-2xx status, network
//! error) sleeps on a capped exponential schedule. Exhausting the attempt
//! budget returns the last error to the caller, which decides whether the
//! source is fatal (MDS) or degradable (combined map, c-MDS).

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use thiserror::Error;

/// Per-request socket timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Retry schedule for one fetch.
///
/// Sleep durations are expressed in units of `base_delay` so tests can
/// compress time: the backoff for attempt `n` is
/// `min(backoff_cap, 2^(n-1)) * base_delay`, and a `Retry-After: N` header
/// sleeps `N * base_delay`. With the default one-second base these are
/// exactly the wall-clock values the servers expect.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_cap: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_cap: 60,
            base_delay: Duration::from_secs(1),
        }
    }
}

pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(policy: RetryPolicy) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, policy })
    }

    /// GET `url`, retrying transient failures per the policy.
    ///
    /// `headers` are forwarded verbatim on every attempt (the c-MDS feed
    /// wants a `User-Agent`/`Accept` pair; the other sources take none).
    pub async fn fetch(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (err, server_delay) = match self.attempt(url, headers).await {
                Ok(body) => return Ok(body),
                Err(outcome) => outcome,
            };
            if attempt >= self.policy.max_attempts {
                return Err(err);
            }
            let delay = server_delay.unwrap_or_else(|| self.backoff_delay(attempt));
            tracing::warn!(
                "fetch of {url} failed on attempt {attempt}/{}: {err}; retrying in {delay:?}",
                self.policy.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One request. On failure, also reports the server-suggested delay if
    /// the response was a 429 with a parseable integer `Retry-After`.
    async fn attempt(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<String, (FetchError, Option<Duration>)> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|source| {
            (
                FetchError::Network {
                    url: url.to_string(),
                    source,
                },
                None,
            )
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let suggested = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok())
                .map(|secs| self.policy.base_delay * secs);
            return Err((
                FetchError::Status {
                    url: url.to_string(),
                    status,
                },
                suggested,
            ));
        }
        if !status.is_success() {
            return Err((
                FetchError::Status {
                    url: url.to_string(),
                    status,
                },
                None,
            ));
        }

        response.text().await.map_err(|source| {
            (
                FetchError::Network {
                    url: url.to_string(),
                    source,
                },
                None,
            )
        })
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let units = 1u32
            .checked_shl(attempt - 1)
            .unwrap_or(u32::MAX)
            .min(self.policy.backoff_cap);
        self.policy.base_delay * units
    }
}
