//! HTTP client creation and request handling for source feeds.

use reqwest::header;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::types::{MAX_RETRIES, REQUEST_TIMEOUT, RETRY_DELAY};
use crate::error::PipelineError;
use crate::TARGET_WEB_REQUEST;

pub fn create_http_client() -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .cookie_store(true)
        .gzip(true)
        .redirect(reqwest::redirect::Policy::default())
        .build()
        .map_err(|e| PipelineError::external("feeds", e))
}

/// Fetches one feed URL, retrying transient failures. Returns the response
/// body for the parser.
pub async fn fetch_feed(feed_url: &str) -> Result<String, PipelineError> {
    let client = create_http_client()?;
    let mut last_error = String::new();

    for attempt in 0..MAX_RETRIES {
        debug!(target: TARGET_WEB_REQUEST, "Loading feed from {} (attempt {})", feed_url, attempt + 1);

        let request = client
            .get(feed_url)
            .header(header::USER_AGENT, "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .header(header::ACCEPT, "application/feed+json, application/json, application/rss+xml, application/atom+xml, application/xml, text/xml, */*;q=0.9")
            .send();

        match timeout(REQUEST_TIMEOUT, request).await {
            Ok(Ok(response)) if response.status().is_success() => {
                return response
                    .text()
                    .await
                    .map_err(|e| PipelineError::external("feeds", e));
            }
            Ok(Ok(response)) => {
                last_error = format!("status {}", response.status());
                warn!(target: TARGET_WEB_REQUEST, "Non-success status {} from {}", response.status(), feed_url);
            }
            Ok(Err(err)) => {
                last_error = err.to_string();
                warn!(target: TARGET_WEB_REQUEST, "Request to {} failed: {}", feed_url, err);
            }
            Err(_) => {
                last_error = format!("timed out after {}s", REQUEST_TIMEOUT.as_secs());
                warn!(target: TARGET_WEB_REQUEST, "Request to {} timed out", feed_url);
            }
        }

        if attempt < MAX_RETRIES - 1 {
            sleep(RETRY_DELAY).await;
        }
    }

    Err(PipelineError::ExternalService {
        service: "feeds",
        message: format!("{}: {}", feed_url, last_error),
    })
}
