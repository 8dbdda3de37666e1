//! Fact verification over the extracted article.

use tracing::info;

use crate::artifact::{parse_stage_json, ExtractedArticle, VerificationResult};
use crate::error::PipelineError;
use crate::llm::generate_response;
use crate::prompt;
use crate::{LLMParams, TARGET_LLM_REQUEST};

pub async fn verify_article(
    article: &ExtractedArticle,
    params: &LLMParams,
    score_floor: f64,
) -> Result<VerificationResult, PipelineError> {
    let raw = generate_response(
        &prompt::verification_system_prompt(),
        &prompt::verification_prompt(article),
        params,
        "verify",
    )
    .await?;

    let result: VerificationResult = parse_stage_json("verify", &raw)?;
    result.validate()?;

    info!(
        target: TARGET_LLM_REQUEST,
        "[verify]: {} verified facts, {} unverified claims, score {}",
        result.verified_facts.len(),
        result.unverified_claims.len(),
        result.verification_score
    );

    // Drafting from facts the verifier could not support would defeat the
    // whole verification stage.
    if result.verification_score < score_floor {
        return Err(PipelineError::ExternalService {
            service: "verifier",
            message: format!(
                "verification score {} below floor {}",
                result.verification_score, score_floor
            ),
        });
    }
    Ok(result)
}
