//! Full-text retrieval for the selected story.

use readability::extractor;
use tokio::time::{sleep, timeout, Duration};
use tracing::{info, warn};

use crate::artifact::{ExtractedArticle, SelectedStory};
use crate::error::PipelineError;
use crate::TARGET_WEB_REQUEST;

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_PAUSE: Duration = Duration::from_secs(2);
const MAX_RETRIES: usize = 3;

/// Drafting from a headline alone invites hallucinated details; the guard
/// refuses bodies too thin to ground verification.
const MIN_ARTICLE_WORDS: usize = 50;

/// Retrieves and extracts the article body for the selected story.
pub async fn extract_article(story: SelectedStory) -> Result<ExtractedArticle, PipelineError> {
    let mut last_error = String::new();

    for retry_count in 0..MAX_RETRIES {
        let scrape_future = async { extractor::scrape(&story.url) };
        match timeout(EXTRACT_TIMEOUT, scrape_future).await {
            Ok(Ok(product)) => {
                let full_text = format!("Title: {}\nBody: {}\n", product.title, product.text);
                if full_text.split_whitespace().count() < MIN_ARTICLE_WORDS {
                    return Err(PipelineError::ExternalService {
                        service: "extractor",
                        message: format!(
                            "article body under {} words: {}",
                            MIN_ARTICLE_WORDS, story.url
                        ),
                    });
                }
                info!(target: TARGET_WEB_REQUEST, "Extracted {} chars from {}", full_text.len(), story.url);
                return Ok(ExtractedArticle { story, full_text });
            }
            Ok(Err(e)) => {
                last_error = e.to_string();
                warn!(target: TARGET_WEB_REQUEST, "Error extracting page: {}", e);
            }
            Err(_) => {
                last_error = format!("timed out after {}s", EXTRACT_TIMEOUT.as_secs());
                warn!(target: TARGET_WEB_REQUEST, "Extraction timed out for {}", story.url);
            }
        }

        if retry_count < MAX_RETRIES - 1 {
            info!(target: TARGET_WEB_REQUEST, "Retrying extraction... ({}/{})", retry_count + 1, MAX_RETRIES);
            sleep(RETRY_PAUSE).await;
        }
    }

    Err(PipelineError::ExternalService {
        service: "extractor",
        message: format!("{}: {}", story.url, last_error),
    })
}
