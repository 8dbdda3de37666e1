//! Story selection: a scoring pass over every candidate, a local argmax, and
//! a profile pass expanding the winner.

use tracing::{debug, info};

use crate::artifact::{parse_stage_json, CandidateItem, CandidateScore, ScoreSheet, SelectedStory};
use crate::error::PipelineError;
use crate::llm::generate_response;
use crate::prompt;
use crate::{LLMParams, TARGET_LLM_REQUEST};

pub async fn select_story(
    candidates: &[CandidateItem],
    params: &LLMParams,
) -> Result<SelectedStory, PipelineError> {
    if candidates.is_empty() {
        return Err(PipelineError::schema("select", "empty candidate list"));
    }

    let raw = generate_response(
        &prompt::scoring_system_prompt(),
        &prompt::scoring_prompt(candidates),
        params,
        "select",
    )
    .await?;
    let sheet: ScoreSheet = parse_stage_json("select", &raw)?;

    let (winner, score) = pick_top(&sheet.scores, candidates)?;
    info!(
        target: TARGET_LLM_REQUEST,
        "[select]: picked \"{}\" with score {}", winner.headline, score
    );

    let raw = generate_response(
        &prompt::scoring_system_prompt(),
        &prompt::story_profile_prompt(winner, score),
        params,
        "select",
    )
    .await?;
    let mut story: SelectedStory = parse_stage_json("select", &raw)?;

    if story.url != winner.url {
        return Err(PipelineError::schema(
            "select",
            format!("profile url {} does not match winner {}", story.url, winner.url),
        ));
    }
    // The scoring pass is authoritative; the profile pass cannot restate it.
    story.score = score;
    debug!(target: TARGET_LLM_REQUEST, "[select]: profiled story {}", story.url);
    Ok(story)
}

/// Picks the highest-scored candidate. Every presented candidate must be
/// scored and every score must refer to a presented candidate; ties resolve
/// to the earlier presented candidate.
pub fn pick_top<'a>(
    scores: &[CandidateScore],
    candidates: &'a [CandidateItem],
) -> Result<(&'a CandidateItem, f64), PipelineError> {
    for scored in scores {
        if !candidates.iter().any(|c| c.url == scored.url) {
            return Err(PipelineError::schema(
                "select",
                format!("score for unknown url {}", scored.url),
            ));
        }
    }

    let mut best: Option<(&CandidateItem, f64)> = None;
    for candidate in candidates {
        let Some(scored) = scores.iter().find(|s| s.url == candidate.url) else {
            return Err(PipelineError::schema(
                "select",
                format!("no score returned for {}", candidate.url),
            ));
        };
        match best {
            Some((_, best_score)) if scored.score <= best_score => {}
            _ => best = Some((candidate, scored.score)),
        }
    }
    best.ok_or_else(|| PipelineError::schema("select", "empty candidate list"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> CandidateItem {
        CandidateItem {
            headline: format!("headline {}", url),
            source: "Test".to_string(),
            url: url.to_string(),
            published_at: None,
        }
    }

    fn score(url: &str, score: f64) -> CandidateScore {
        CandidateScore {
            url: url.to_string(),
            score,
        }
    }

    #[test]
    fn test_pick_top_takes_highest_score() {
        let candidates = vec![candidate("a"), candidate("b"), candidate("c")];
        let scores = vec![score("a", 15.0), score("b", 5.0), score("c", 0.0)];
        let (winner, winning) = pick_top(&scores, &candidates).unwrap();
        assert_eq!(winner.url, "a");
        assert_eq!(winning, 15.0);
    }

    #[test]
    fn test_pick_top_order_in_scores_does_not_matter() {
        let candidates = vec![candidate("a"), candidate("b"), candidate("c")];
        let scores = vec![score("c", 0.0), score("a", 15.0), score("b", 5.0)];
        let (winner, _) = pick_top(&scores, &candidates).unwrap();
        assert_eq!(winner.url, "a");
    }

    #[test]
    fn test_pick_top_tie_keeps_first_presented() {
        let candidates = vec![candidate("a"), candidate("b")];
        let scores = vec![score("a", 10.0), score("b", 10.0)];
        let (winner, _) = pick_top(&scores, &candidates).unwrap();
        assert_eq!(winner.url, "a");
    }

    #[test]
    fn test_pick_top_rejects_unknown_url() {
        let candidates = vec![candidate("a")];
        let scores = vec![score("a", 3.0), score("hallucinated", 20.0)];
        assert!(pick_top(&scores, &candidates).is_err());
    }

    #[test]
    fn test_pick_top_requires_every_candidate_scored() {
        let candidates = vec![candidate("a"), candidate("b")];
        let scores = vec![score("a", 3.0)];
        assert!(pick_top(&scores, &candidates).is_err());
    }
}
