//! Type definitions and tuning constants for the feed module.

use serde::Deserialize;
use tokio::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const RETRY_DELAY: Duration = Duration::from_secs(5);
pub const MAX_RETRIES: usize = 3;

/// Response envelope from the search provider's reasoning call.
#[derive(Debug, Deserialize)]
pub struct SearchCandidates {
    #[serde(default)]
    pub candidates: Vec<SearchCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct SearchCandidate {
    pub headline: String,
    #[serde(default)]
    pub source: Option<String>,
    pub url: String,
    #[serde(default)]
    pub published_at: Option<String>,
}
