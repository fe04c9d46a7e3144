//! Bounded retry for model connections

use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

const BASE_BACKOFF_MS: u64 = 500;

/// Delay before retry number `attempt` (0-based): 500ms, 1s, 2s, ...
pub(crate) fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS << attempt.min(10))
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Send a request, retrying up to `max_retries` times on transport errors,
/// 5xx and 429. Any other non-success status fails immediately with the
/// non-retryable `ModelRejected`.
///
/// `f` builds and sends a fresh request on every attempt.
pub(crate) async fn send_with_retry<F, Fut>(
    provider_name: &str,
    max_retries: u32,
    mut f: F,
) -> Result<Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        let failure = match f().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let message = format!("{} returned HTTP {}: {}", provider_name, status, body.trim());
                if !is_transient(status) {
                    return Err(Error::model_rejected(message));
                }
                message
            }
            Err(e) => format!("{} request failed: {}", provider_name, e),
        };

        if attempt >= max_retries {
            return Err(Error::model_unavailable(failure));
        }

        let delay = backoff(attempt);
        tracing::warn!(
            "{} (attempt {}/{}), retrying in {:?}",
            failure,
            attempt + 1,
            max_retries + 1,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
