use std::time::Duration;

use busysync_common::RateLimiter;
use busysync_domain::{BusySyncError, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::{classify_status, InfraError};

/// Google reports quota exhaustion as 403 with one of these reasons.
const GOOGLE_RATE_LIMIT_REASONS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| InfraError::from(e).into())
    }

    /// Pass successful responses through, classify the rest.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(classify_status(self.status, &self.body))
        }
    }
}

/// HTTP client that routes every call through a destination's
/// [`RateLimiter`] and retries calls the destination rate limits.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_rate_limit_retries: u32,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute the request through `limiter`.
    ///
    /// A rate limit signal is reported to the limiter and the request is
    /// retried up to the configured number of times; after that the call
    /// fails with `BusySyncError::RateLimited`. Every other status is returned
    /// to the caller.
    pub async fn send(&self, limiter: &RateLimiter, builder: RequestBuilder) -> Result<ApiResponse> {
        let mut retries = 0;

        loop {
            let cloned_builder = builder.try_clone().ok_or_else(|| {
                BusySyncError::Internal(
                    "request body cannot be cloned; buffer the body to enable retries".into(),
                )
            })?;
            let request = cloned_builder.build().map_err(InfraError::from)?;
            let method = request.method().clone();
            let url = request.url().clone();

            let client = &self.client;
            let outcome: Result<ApiResponse> = limiter
                .execute(|| async move {
                    debug!(
                        method = %request.method(),
                        url = %request.url(),
                        attempt = retries + 1,
                        "sending HTTP request"
                    );
                    let response = client.execute(request).await.map_err(InfraError::from)?;
                    let status = response.status();
                    let headers = response.headers().clone();
                    let body = response.text().await.map_err(InfraError::from)?;
                    debug!(%status, "received HTTP response");

                    match rate_limit_signal(status, &headers, &body) {
                        Some(signal) => Err(signal),
                        None => Ok(ApiResponse { status, body }),
                    }
                })
                .await;

            match outcome {
                Err(err) if err.is_rate_limited() && retries < self.max_rate_limit_retries => {
                    retries += 1;
                    limiter.report_rate_limit_with_hint(
                        err.retry_after_secs().map(Duration::from_secs),
                    );
                }
                Err(err) if err.is_rate_limited() => {
                    limiter.report_rate_limit_with_hint(
                        err.retry_after_secs().map(Duration::from_secs),
                    );
                    warn!(%method, %url, retries, "Giving up after repeated rate limits");
                    return Err(err);
                }
                other => return other,
            }
        }
    }
}

/// Detect a rate limit signal in a response.
fn rate_limit_signal(status: StatusCode, headers: &HeaderMap, body: &str) -> Option<BusySyncError> {
    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && GOOGLE_RATE_LIMIT_REASONS.iter().any(|reason| body.contains(reason)));
    if !limited {
        return None;
    }

    Some(BusySyncError::RateLimited {
        message: format!("HTTP {} from destination", status.as_u16()),
        retry_after_secs: retry_after_secs(headers),
    })
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_rate_limit_retries: u32,
    user_agent: Option<String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_rate_limit_retries: busysync_domain::constants::DEFAULT_MAX_RATE_LIMIT_RETRIES,
            user_agent: Some(concat!("busysync/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retries after a rate limit signal before the call fails.
    pub fn max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder.build().map_err(InfraError::from)?;

        Ok(HttpClient { client, max_rate_limit_retries: self.max_rate_limit_retries })
    }
}
