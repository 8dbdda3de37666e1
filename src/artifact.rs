//! Artifacts carried between pipeline stages. Everything the reasoning
//! engine returns is parsed fail-closed into one of these shapes; a response
//! that does not fit fails the stage instead of flowing downstream.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PipelineError;
use crate::util::strip_code_fences;

/// One headline pulled from a source feed. Lives in memory for a single run.
#[derive(Clone, Debug, Serialize)]
pub struct CandidateItem {
    pub headline: String,
    pub source: String,
    pub url: String,
    pub published_at: Option<String>,
}

/// Relevance score the reasoning engine assigns to one presented candidate.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct CandidateScore {
    pub url: String,
    pub score: f64,
}

/// Wrapper object for the scoring pass. JSON-object response mode cannot
/// return a bare array, so scores arrive under a single key.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct ScoreSheet {
    pub scores: Vec<CandidateScore>,
}

/// The single story chosen for this run. Immutable once created.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct SelectedStory {
    pub headline: String,
    pub summary: String,
    pub source: String,
    pub url: String,
    pub systemic_link: String,
    pub key_fact: String,
    pub politicians_involved: String,
    pub score: f64,
}

/// Full text retrieved for the selected story, used to ground verification
/// and drafting.
#[derive(Clone, Debug, Serialize)]
pub struct ExtractedArticle {
    pub story: SelectedStory,
    pub full_text: String,
}

/// Cross-checked claims for the extracted article.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct VerificationResult {
    pub verified_facts: Vec<String>,
    pub unverified_claims: Vec<String>,
    pub promises_vs_reality: String,
    pub verification_score: f64,
}

impl VerificationResult {
    /// Scores live on a 0-10 scale; anything else means the engine ignored
    /// the schema and the stage must fail.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=10.0).contains(&self.verification_score) {
            return Err(PipelineError::schema(
                "verify",
                format!(
                    "verification_score {} outside 0-10",
                    self.verification_score
                ),
            ));
        }
        Ok(())
    }
}

/// The five presentation formats the drafter chooses between. Closed set:
/// adding a sixth means touching every match below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum PostFormat {
    #[serde(rename = "Devastating News Thread")]
    DevastatingNewsThread,
    #[serde(rename = "Propaganda Slayer Quote-Tweet")]
    PropagandaSlayerQuoteTweet,
    #[serde(rename = "Broken Promise Ledger")]
    BrokenPromiseLedger,
    #[serde(rename = "Citizen Impact Story")]
    CitizenImpactStory,
    #[serde(rename = "Satirical Takedown")]
    SatiricalTakedown,
}

impl PostFormat {
    pub const ALL: [PostFormat; 5] = [
        PostFormat::DevastatingNewsThread,
        PostFormat::PropagandaSlayerQuoteTweet,
        PostFormat::BrokenPromiseLedger,
        PostFormat::CitizenImpactStory,
        PostFormat::SatiricalTakedown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PostFormat::DevastatingNewsThread => "Devastating News Thread",
            PostFormat::PropagandaSlayerQuoteTweet => "Propaganda Slayer Quote-Tweet",
            PostFormat::BrokenPromiseLedger => "Broken Promise Ledger",
            PostFormat::CitizenImpactStory => "Citizen Impact Story",
            PostFormat::SatiricalTakedown => "Satirical Takedown",
        }
    }
}

/// One candidate post awaiting review. Regeneration replaces the prior Draft
/// outright; old drafts are discarded, not archived.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct Draft {
    pub chosen_format: PostFormat,
    pub twitter_post: String,
    pub instagram_post: String,
    pub image_prompt: String,
}

impl Draft {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.twitter_post.trim().is_empty() {
            return Err(PipelineError::schema("draft", "empty twitter_post"));
        }
        if self.instagram_post.trim().is_empty() {
            return Err(PipelineError::schema("draft", "empty instagram_post"));
        }
        Ok(())
    }

    /// Stable fingerprint tying database markers to this exact draft text.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.chosen_format.label().as_bytes());
        hasher.update([0]);
        hasher.update(self.twitter_post.as_bytes());
        hasher.update([0]);
        hasher.update(self.instagram_post.as_bytes());
        hasher.update([0]);
        hasher.update(self.image_prompt.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Cartoon generated for the draft under review.
#[derive(Clone, Debug)]
pub struct GeneratedImage {
    pub local_path: PathBuf,
    pub source_image_prompt: String,
}

/// Exactly one of these is produced per presented Draft.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Regenerate,
    Skip,
    ConvertToQuoteTweet,
    TimedOut,
}

impl ReviewDecision {
    pub fn label(&self) -> &'static str {
        match self {
            ReviewDecision::Approve => "approve",
            ReviewDecision::Regenerate => "regenerate",
            ReviewDecision::Skip => "skip",
            ReviewDecision::ConvertToQuoteTweet => "quote",
            ReviewDecision::TimedOut => "timed_out",
        }
    }
}

/// Terminal record of a successful publish. Never mutated.
#[derive(Clone, Debug, Serialize)]
pub struct PublishedPost {
    pub platform_post_id: String,
    pub published_at: DateTime<Utc>,
    pub draft_format: PostFormat,
    pub twitter_text: String,
}

/// Parses a reasoning response into the stage's expected shape, stripping
/// code fences first. Any mismatch is a schema failure for that stage.
pub fn parse_stage_json<T: DeserializeOwned>(
    stage: &'static str,
    raw: &str,
) -> Result<T, PipelineError> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str::<T>(cleaned).map_err(|e| PipelineError::schema(stage, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selected_story() {
        let raw = r#"{
            "headline": "Bridge collapses weeks after inauguration",
            "summary": "A newly inaugurated river bridge collapsed during morning traffic.",
            "source": "The National Ledger",
            "url": "https://example.com/bridge",
            "systemic_link": "Contractor selection bypassed tender review",
            "key_fact": "Rs 312 crore spent; 4 structural audits skipped",
            "politicians_involved": "State PWD minister",
            "score": 15
        }"#;
        let story: SelectedStory = parse_stage_json("select", raw).unwrap();
        assert_eq!(story.url, "https://example.com/bridge");
        assert_eq!(story.score, 15.0);
    }

    #[test]
    fn test_missing_field_fails_closed() {
        let raw = r#"{"headline": "x", "summary": "y"}"#;
        let err = parse_stage_json::<SelectedStory>("select", raw).unwrap_err();
        match err {
            PipelineError::SchemaValidation { stage, .. } => assert_eq!(stage, "select"),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_fenced_response_parses() {
        let raw = "```json\n[{\"url\": \"https://a\", \"score\": 7.5}]\n```";
        let scores: Vec<CandidateScore> = parse_stage_json("select", raw).unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 7.5);
    }

    #[test]
    fn test_verification_score_range() {
        let ok = VerificationResult {
            verified_facts: vec!["fact".into()],
            unverified_claims: vec![],
            promises_vs_reality: "promised 4 lanes, delivered 2".into(),
            verification_score: 8.0,
        };
        assert!(ok.validate().is_ok());

        let bad = VerificationResult {
            verification_score: 14.0,
            ..ok
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_post_format_wire_names() {
        let json = serde_json::to_string(&PostFormat::PropagandaSlayerQuoteTweet).unwrap();
        assert_eq!(json, "\"Propaganda Slayer Quote-Tweet\"");
        let parsed: PostFormat = serde_json::from_str("\"Devastating News Thread\"").unwrap();
        assert_eq!(parsed, PostFormat::DevastatingNewsThread);
        // Unknown format names are rejected, not coerced.
        assert!(serde_json::from_str::<PostFormat>("\"Hot Take\"").is_err());
    }

    #[test]
    fn test_draft_validation_and_fingerprint() {
        let draft = Draft {
            chosen_format: PostFormat::DevastatingNewsThread,
            twitter_post: "Thread 1/4 ...".into(),
            instagram_post: "Story ...".into(),
            image_prompt: "A hand-drawn cartoon ...".into(),
        };
        assert!(draft.validate().is_ok());
        let fp = draft.fingerprint();
        assert_eq!(fp.len(), 64);
        let mut changed = draft.clone();
        changed.twitter_post.push('!');
        assert_ne!(fp, changed.fingerprint());

        let empty = Draft {
            twitter_post: "  ".into(),
            ..draft
        };
        assert!(empty.validate().is_err());
    }
}
