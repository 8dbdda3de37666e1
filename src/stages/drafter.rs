//! Draft generation. Re-entrant: a Regenerate or ConvertToQuoteTweet
//! decision calls back in with the same article and verification result.

use tracing::warn;

use crate::artifact::{parse_stage_json, Draft, ExtractedArticle, PostFormat, VerificationResult};
use crate::error::PipelineError;
use crate::llm::generate_response;
use crate::prompt;
use crate::{LLMParams, TARGET_LLM_REQUEST};

pub async fn draft_post(
    article: &ExtractedArticle,
    verification: &VerificationResult,
    forced_format: Option<PostFormat>,
    params: &LLMParams,
) -> Result<Draft, PipelineError> {
    let raw = generate_response(
        &prompt::drafting_system_prompt(forced_format),
        &prompt::drafting_user_message(article, verification),
        params,
        "draft",
    )
    .await?;

    let draft: Draft = parse_stage_json("draft", &raw)?;
    finalize_draft(draft, forced_format)
}

/// Applies the forced-format override and the image-prompt failsafe, then
/// validates the draft.
pub fn finalize_draft(
    mut draft: Draft,
    forced_format: Option<PostFormat>,
) -> Result<Draft, PipelineError> {
    if let Some(format) = forced_format {
        if draft.chosen_format != format {
            warn!(
                target: TARGET_LLM_REQUEST,
                "[draft]: model chose {} despite forced format, overriding",
                draft.chosen_format.label()
            );
            draft.chosen_format = format;
        }
    }

    if draft.image_prompt.trim().is_empty() {
        warn!(target: TARGET_LLM_REQUEST, "[draft]: empty image_prompt, supplying failsafe");
        draft.image_prompt = prompt::FALLBACK_IMAGE_PROMPT.to_string();
    }

    draft.validate()?;
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(format: PostFormat) -> Draft {
        Draft {
            chosen_format: format,
            twitter_post: "Thread 1/4: the bridge lasted 23 days.".to_string(),
            instagram_post: "23 days. That is how long the bridge lasted.".to_string(),
            image_prompt: "A watercolor cartoon of a collapsing bridge.".to_string(),
        }
    }

    #[test]
    fn test_forced_format_overrides_model_choice() {
        let finalized = finalize_draft(
            draft(PostFormat::DevastatingNewsThread),
            Some(PostFormat::PropagandaSlayerQuoteTweet),
        )
        .unwrap();
        assert_eq!(
            finalized.chosen_format,
            PostFormat::PropagandaSlayerQuoteTweet
        );
    }

    #[test]
    fn test_unforced_format_is_kept() {
        let finalized = finalize_draft(draft(PostFormat::SatiricalTakedown), None).unwrap();
        assert_eq!(finalized.chosen_format, PostFormat::SatiricalTakedown);
    }

    #[test]
    fn test_empty_image_prompt_gets_failsafe() {
        let mut empty = draft(PostFormat::CitizenImpactStory);
        empty.image_prompt = "   ".to_string();
        let finalized = finalize_draft(empty, None).unwrap();
        assert_eq!(finalized.image_prompt, prompt::FALLBACK_IMAGE_PROMPT);
    }

    #[test]
    fn test_empty_post_body_fails_closed() {
        let mut bad = draft(PostFormat::BrokenPromiseLedger);
        bad.twitter_post = String::new();
        assert!(finalize_draft(bad, None).is_err());
    }
}
