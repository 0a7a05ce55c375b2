//! Retry wrapper for idempotent Drive requests with 429/5xx handling and Retry-After support.
//!
//! `send_with_retry()` replaces `client.execute(request)` for reads:
//! - Exponential backoff with jitter on 429 (Too Many Requests) and 5xx errors
//! - Retry-After header parsing (seconds and HTTP-date)
//! - Requests whose body cannot be cloned (streamed uploads) are sent exactly once

use chrono::{DateTime, Utc};
use reqwest::{Client, Request, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Longest wait honored from a Retry-After header
const MAX_RETRY_AFTER_SECS: u64 = 300;

/// Configuration for HTTP retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRetryConfig {
    /// Maximum number of retry attempts (0 disables retries)
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl HttpRetryConfig {
    /// Send every request exactly once
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Parse a Retry-After header value (delta-seconds or HTTP-date)
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let secs = (at - now).num_seconds().max(0) as u64;
    Some(Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

fn retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(value, Utc::now())
}

/// Calculate delay for a given retry attempt, with 10-30% jitter
fn calculate_delay(attempt: u32, config: &HttpRetryConfig) -> Duration {
    let base = config.base_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_delay_ms as f64);
    let jitter = capped * (0.1 + rand::random::<f64>() * 0.2);
    Duration::from_millis((capped + jitter) as u64)
}

/// Send an HTTP request, retrying on 429/5xx.
///
/// The final response is returned as-is, whatever its status; mapping status
/// codes to errors is left to the caller.
pub async fn send_with_retry(
    client: &Client,
    request: Request,
    config: &HttpRetryConfig,
) -> Result<Response, reqwest::Error> {
    let mut attempt = 0;

    loop {
        let Some(current) = request.try_clone() else {
            return client.execute(request).await;
        };

        let response = client.execute(current).await?;
        let status = response.status().as_u16();
        if attempt >= config.max_retries || !is_retryable_status(status) {
            return Ok(response);
        }

        let delay = retry_after(&response).unwrap_or_else(|| calculate_delay(attempt, config));
        debug!(
            "HTTP {} {} returned {}. Retry {}/{} after {:?}",
            request.method(),
            request.url().path(),
            status,
            attempt + 1,
            config.max_retries,
            delay
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
