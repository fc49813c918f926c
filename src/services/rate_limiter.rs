//! Rate limiting and retry logic for subtitle provider calls
//!
//! Every provider owns one token bucket shared by all of its requests.
//! Waiting for a permit is bounded so a throttled provider surfaces as a
//! transient failure instead of stalling the run.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::error::SubtitleError;

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst capacity (allows short bursts above the rate)
    pub burst_size: u32,
    /// Longest time a caller waits for a permit
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            burst_size: 5,
            max_wait: Duration::from_secs(30),
        }
    }
}

/// Token bucket shared by all calls to one provider
pub struct ProviderRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    name: String,
    max_wait: Duration,
}

impl ProviderRateLimiter {
    pub fn new(name: &str, config: &RateLimitConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: RateLimiter::direct(quota),
            name: name.to_string(),
            max_wait: config.max_wait,
        }
    }

    /// Wait for a permit, giving up after the configured bound
    pub async fn acquire(&self) -> Result<(), SubtitleError> {
        match tokio::time::timeout(self.max_wait, self.limiter.until_ready()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(
                    provider = %self.name,
                    max_wait_ms = self.max_wait.as_millis() as u64,
                    "Gave up waiting for rate limit permit"
                );
                Err(SubtitleError::RateLimited(self.name.clone()))
            }
        }
    }
}

/// A rate-limited HTTP client wrapper
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<ProviderRateLimiter>,
    name: String,
}

impl RateLimitedClient {
    pub fn new(name: &str, config: RateLimitConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            limiter: Arc::new(ProviderRateLimiter::new(name, &config)),
            name: name.to_string(),
        })
    }

    /// Client for the OpenSubtitles REST API
    pub fn for_opensubtitles() -> Result<Self> {
        // Documented limit is 5 requests per second per IP
        Self::new(
            "opensubtitles",
            RateLimitConfig {
                requests_per_second: 4,
                burst_size: 5,
                ..Default::default()
            },
        )
    }

    /// Get a reference to the underlying client for custom requests
    /// (caller is responsible for calling `acquire` first)
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub async fn acquire(&self) -> Result<(), SubtitleError> {
        self.limiter.acquire().await?;
        debug!(client = %self.name, "Acquired rate limit permit");
        Ok(())
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_interval: Duration,
    /// Maximum backoff duration
    pub max_interval: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        }
    }
}

/// Execute an async operation with exponential backoff between attempts
pub async fn retry_async<T, E, Fut, F>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;
    let mut backoff = config.to_backoff();

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempts >= config.max_retries {
                    warn!(
                        operation = %operation_name,
                        attempts = attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let Some(duration) = backoff.next_backoff() else {
                    return Err(e);
                };
                warn!(
                    operation = %operation_name,
                    attempt = attempts,
                    error = %e,
                    retry_in_ms = duration.as_millis() as u64,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(duration).await;
            }
        }
    }
}

/// Helper trait for classifying HTTP responses
pub trait ResponseExt {
    /// Check if the response indicates rate limiting (429)
    fn is_rate_limited(&self) -> bool;

    /// Check if the response indicates a transient error that should be retried
    fn is_transient_error(&self) -> bool;
}

impl ResponseExt for Response {
    fn is_rate_limited(&self) -> bool {
        self.status().as_u16() == 429
    }

    fn is_transient_error(&self) -> bool {
        let status = self.status().as_u16();
        status == 429 || status == 408 || (500..600).contains(&status)
    }
}
