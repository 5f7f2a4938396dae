//! Rate-limited HTTP transport for the Datadog API.
//!
//! Wraps a `reqwest::Client` with a permit pool that caps the steady-state
//! request rate and absorbs 429 responses by retrying with adaptive backoff.
//! Every request carries the organization's credential headers; a client is
//! single-organization-scoped and is dropped before the next organization's
//! client is built.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

/// Header the platform sets on 429 responses announcing the current
/// rate-limit period in seconds.
const RATE_LIMIT_PERIOD_HEADER: &str = "x-ratelimit-period";

/// Errors surfaced by the transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx, non-429 API response on a JSON read.
    #[error("api error: {status} - {body}")]
    Api { status: u16, body: String },

    /// Response body did not encode or decode as expected.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response decoded but lacked data the caller requires.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The 429 retry budget ran out.
    #[error("rate limit retries exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// Invalid construction input.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Rate limiting configuration.
#[derive(Debug, Clone)]
pub struct RateLimit {
    /// Steady-state request budget per throttle interval.
    pub requests_per_second: usize,
    /// Baseline throttle interval; backoff doubles from here and resets here.
    pub base_interval: Duration,
    /// Maximum number of 429 retries per request before giving up.
    pub max_retries: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            base_interval: Duration::from_secs(1),
            max_retries: 8,
        }
    }
}

/// HTTP client scoped to one organization's credentials.
///
/// A permit is taken from the pool before every transmission and handed back
/// only after the current throttle interval has elapsed, which is what
/// enforces the request rate rather than raw concurrency.
#[derive(Debug)]
pub struct RateLimitedClient {
    http: reqwest::Client,
    permits: Arc<Semaphore>,
    throttle: Mutex<Duration>,
    limits: RateLimit,
}

impl RateLimitedClient {
    /// Build a client carrying the organization's credential headers.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is not a valid header value or the HTTP
    /// client cannot be created.
    pub fn new(api_key: &str, app_key: &str, limits: RateLimit) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "DD-API-KEY",
            HeaderValue::from_str(api_key)
                .map_err(|_| TransportError::Config("API key is not a valid header value".into()))?,
        );
        headers.insert(
            "DD-APPLICATION-KEY",
            HeaderValue::from_str(app_key).map_err(|_| {
                TransportError::Config("application key is not a valid header value".into())
            })?,
        );

        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            permits: Arc::new(Semaphore::new(limits.requests_per_second)),
            throttle: Mutex::new(limits.base_interval),
            limits,
        })
    }

    /// Execute a request, absorbing 429 responses up to the retry budget.
    ///
    /// Non-429 responses are returned as-is, including non-2xx statuses; the
    /// body (when present) is rebuilt from a buffered copy on every retry.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or when the retry budget is
    /// exhausted.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response, TransportError> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            // One permit per attempt. Never closed, so acquire cannot fail.
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .expect("permit semaphore closed");

            let mut request = self.http.request(method.clone(), url);
            if let Some(bytes) = &body {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(bytes.clone());
            }
            let result = request.send().await;

            // Release after the current throttle interval, not on completion.
            let release_after = *self.throttle.lock().await;
            tokio::spawn(async move {
                tokio::time::sleep(release_after).await;
                drop(permit);
            });

            let response = result?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                let mut throttle = self.throttle.lock().await;
                if *throttle > self.limits.base_interval {
                    *throttle = self.limits.base_interval;
                }
                return Ok(response);
            }

            if attempts > self.limits.max_retries {
                return Err(TransportError::RateLimitExhausted { attempts });
            }

            if let Some(period) = rate_limit_period(&response) {
                warn!(
                    url,
                    seconds = period,
                    "rate limited, honoring x-ratelimit-period header"
                );
                tokio::time::sleep(Duration::from_secs(period)).await;
            } else {
                let wait = {
                    let mut throttle = self.throttle.lock().await;
                    let wait = *throttle;
                    *throttle = wait * 2;
                    wait
                };
                warn!(url, wait_ms = wait.as_millis() as u64, "rate limited, backing off");
                tokio::time::sleep(wait).await;
            }
        }
    }

    /// GET returning the raw response.
    ///
    /// # Errors
    ///
    /// See [`RateLimitedClient::send`].
    pub async fn get(&self, url: &str) -> Result<Response, TransportError> {
        self.send(Method::GET, url, None).await
    }

    /// GET a JSON document, treating any non-2xx status as an API error.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx status, or a body
    /// that does not decode into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TransportError> {
        let response = self.send(Method::GET, url, None).await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }
        debug!(url, status = status.as_u16(), "fetched");
        Ok(serde_json::from_str(&body)?)
    }

    /// POST a JSON body, returning the raw response.
    ///
    /// # Errors
    ///
    /// See [`RateLimitedClient::send`].
    pub async fn post_json<T: Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response, TransportError> {
        let bytes = serde_json::to_vec(body)?;
        self.send(Method::POST, url, Some(bytes)).await
    }

    /// PATCH a JSON body, returning the raw response.
    ///
    /// # Errors
    ///
    /// See [`RateLimitedClient::send`].
    pub async fn patch_json<T: Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response, TransportError> {
        let bytes = serde_json::to_vec(body)?;
        self.send(Method::PATCH, url, Some(bytes)).await
    }

    /// DELETE returning the raw response.
    ///
    /// # Errors
    ///
    /// See [`RateLimitedClient::send`].
    pub async fn delete(&self, url: &str) -> Result<Response, TransportError> {
        self.send(Method::DELETE, url, None).await
    }

    #[cfg(test)]
    async fn current_throttle(&self) -> Duration {
        *self.throttle.lock().await
    }
}

fn rate_limit_period(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RATE_LIMIT_PERIOD_HEADER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
