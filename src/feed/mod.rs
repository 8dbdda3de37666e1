//! Candidate ingestion for the pipeline's Fetching stage.
//!
//! Two providers feed the run: configured RSS/Atom feeds and an optional
//! Perplexity-style search call. Results are merged, deduplicated by URL,
//! and filtered against articles already seen in earlier runs.

mod client;
mod parser;
mod search;
mod types;

pub use self::types::*;

use tracing::{info, warn};

use crate::artifact::CandidateItem;
use crate::config::Config;
use crate::db::Database;
use crate::error::PipelineError;
use crate::TARGET_WEB_REQUEST;

/// Gathers the run's candidate list from every configured provider. An empty
/// combined result fails the Fetching stage: there is nothing to select from.
pub async fn gather_candidates(
    cfg: &Config,
    db: &Database,
) -> Result<Vec<CandidateItem>, PipelineError> {
    let mut candidates: Vec<CandidateItem> = Vec::new();

    for feed_url in &cfg.feed_urls {
        match client::fetch_feed(feed_url).await {
            Ok(body) => match parser::parse_feed(&body, feed_url) {
                Ok(mut items) => {
                    info!(target: TARGET_WEB_REQUEST, "Feed {} yielded {} candidates", feed_url, items.len());
                    candidates.append(&mut items);
                }
                Err(err) => {
                    warn!(target: TARGET_WEB_REQUEST, "Failed to parse feed {}: {}", feed_url, err);
                }
            },
            Err(err) => {
                warn!(target: TARGET_WEB_REQUEST, "Failed to fetch feed {}: {}", feed_url, err);
            }
        }
    }

    if let Some(search_cfg) = &cfg.search {
        match search::search_candidates(search_cfg).await {
            Ok(mut items) => {
                info!(target: TARGET_WEB_REQUEST, "Search provider yielded {} candidates", items.len());
                candidates.append(&mut items);
            }
            Err(err) => {
                warn!(target: TARGET_WEB_REQUEST, "Search provider failed: {}", err);
            }
        }
    }

    let candidates = dedupe_by_url(candidates);

    let mut fresh = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if db.has_seen(&candidate.url).await.unwrap_or(false) {
            continue;
        }
        fresh.push(candidate);
    }

    if fresh.is_empty() {
        return Err(PipelineError::ExternalService {
            service: "feeds",
            message: "no fresh candidates from any provider".to_string(),
        });
    }
    Ok(fresh)
}

/// Fetches and parses a single feed URL. The feed debugging tool calls this
/// directly, bypassing dedup and the seen-filter.
pub async fn fetch_and_parse(feed_url: &str) -> Result<Vec<CandidateItem>, PipelineError> {
    let body = client::fetch_feed(feed_url).await?;
    parser::parse_feed(&body, feed_url)
}

/// Keeps the first occurrence of each URL, preserving provider order.
pub fn dedupe_by_url(candidates: Vec<CandidateItem>) -> Vec<CandidateItem> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> CandidateItem {
        CandidateItem {
            headline: format!("headline for {}", url),
            source: "Test".to_string(),
            url: url.to_string(),
            published_at: None,
        }
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let deduped = dedupe_by_url(vec![
            candidate("https://a.example/1"),
            candidate("https://b.example/2"),
            candidate("https://a.example/1"),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].url, "https://a.example/1");
        assert_eq!(deduped[1].url, "https://b.example/2");
    }
}
