//! Search-backed candidate discovery via a Perplexity-style chat API.

use serde::Deserialize;
use serde_json::json;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::types::{SearchCandidate, SearchCandidates};
use crate::artifact::{parse_stage_json, CandidateItem};
use crate::config::SearchConfig;
use crate::error::PipelineError;
use crate::prompt;
use crate::TARGET_WEB_REQUEST;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// One recency-filtered search call returning schema-validated candidates.
pub async fn search_candidates(cfg: &SearchConfig) -> Result<Vec<CandidateItem>, PipelineError> {
    let client = reqwest::Client::new();
    let payload = json!({
        "model": cfg.model,
        "messages": [
            {"role": "system", "content": prompt::search_system_prompt()},
            {"role": "user", "content": prompt::search_user_query()},
        ],
        "max_tokens": 1000,
        "temperature": 0.3,
        "search_recency_filter": "day",
        "return_citations": false,
    });

    debug!(target: TARGET_WEB_REQUEST, "Querying search provider {}", cfg.base_url);

    let request = client
        .post(format!("{}/chat/completions", cfg.base_url))
        .bearer_auth(&cfg.api_key)
        .json(&payload)
        .send();

    let response = timeout(SEARCH_TIMEOUT, request)
        .await
        .map_err(|_| PipelineError::external("search", "request timed out"))?
        .map_err(|e| PipelineError::external("search", e))?;

    if !response.status().is_success() {
        return Err(PipelineError::ExternalService {
            service: "search",
            message: format!("status {}", response.status()),
        });
    }

    let body: ChatResponse = response
        .json()
        .await
        .map_err(|e| PipelineError::external("search", e))?;
    let content = body
        .choices
        .first()
        .map(|choice| choice.message.content.as_str())
        .ok_or_else(|| PipelineError::external("search", "completion had no choices"))?;

    let parsed: SearchCandidates = parse_stage_json("fetch", content)?;
    Ok(parsed.candidates.into_iter().map(into_candidate).collect())
}

fn into_candidate(found: SearchCandidate) -> CandidateItem {
    CandidateItem {
        headline: found.headline,
        source: found.source.unwrap_or_else(|| "web search".to_string()),
        url: found.url,
        published_at: found.published_at,
    }
}
