//! The approval-gated orchestrator: one end-to-end run through the fixed
//! stage order, with the regenerate/skip/quote-tweet/timeout control loop
//! around review.
//!
//! Stage order is a straight line; the only cycle is review sending control
//! back to Drafting, and the only suspension point is AwaitingReview.

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifact::{Draft, ExtractedArticle, PostFormat, PublishedPost, ReviewDecision,
    VerificationResult};
use crate::config::Config;
use crate::db::Database;
use crate::error::PipelineError;
use crate::feed;
use crate::image;
use crate::publish::TwitterPublisher;
use crate::scrape;
use crate::stages::{drafter, selector, verifier};
use crate::telegram::{escape_html, TelegramGateway};
use crate::util::timestamp_slug;
use crate::LLMParams;

/// Run-level states. The four rightmost are terminal; every run reaches
/// exactly one of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Fetching,
    Selecting,
    Extracting,
    Verifying,
    Drafting,
    ImageGenerating,
    AwaitingReview,
    Publishing,
    Published,
    Skipped,
    Failed,
    TimedOut,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Published | RunState::Skipped | RunState::Failed | RunState::TimedOut
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunState::Fetching => "fetching",
            RunState::Selecting => "selecting",
            RunState::Extracting => "extracting",
            RunState::Verifying => "verifying",
            RunState::Drafting => "drafting",
            RunState::ImageGenerating => "image_generating",
            RunState::AwaitingReview => "awaiting_review",
            RunState::Publishing => "publishing",
            RunState::Published => "published",
            RunState::Skipped => "skipped",
            RunState::Failed => "failed",
            RunState::TimedOut => "timed_out",
        }
    }
}

/// The legal transition relation. Anything not listed here is a bug in the
/// orchestrator, not a condition to recover from.
pub fn is_valid_transition(from: RunState, to: RunState) -> bool {
    use RunState::*;
    if from.is_terminal() {
        return false;
    }
    // Any live state may fail.
    if to == Failed {
        return true;
    }
    matches!(
        (from, to),
        (Fetching, Selecting)
            | (Selecting, Extracting)
            | (Extracting, Verifying)
            | (Verifying, Drafting)
            | (Drafting, ImageGenerating)
            | (ImageGenerating, AwaitingReview)
            | (AwaitingReview, Publishing)
            | (AwaitingReview, Drafting)
            | (AwaitingReview, Skipped)
            | (AwaitingReview, TimedOut)
            | (Publishing, Published)
    )
}

/// How one run ended. Exit codes distinguish "nobody answered" from a real
/// fault for the outer scheduler.
#[derive(Debug)]
pub enum RunOutcome {
    Published(PublishedPost),
    Skipped,
    TimedOut,
    Failed(PipelineError),
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Published(_) => "published",
            RunOutcome::Skipped => "skipped",
            RunOutcome::TimedOut => "timed_out",
            RunOutcome::Failed(_) => "failed",
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            RunOutcome::Published(post) => Some(post.platform_post_id.clone()),
            RunOutcome::Failed(err) => Some(err.to_string()),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Published(_) | RunOutcome::Skipped => 0,
            RunOutcome::Failed(_) => 1,
            RunOutcome::TimedOut => 2,
        }
    }
}

/// A stage error becomes a terminal state: review timeouts are TimedOut,
/// everything else is Failed.
pub fn outcome_from_error(err: PipelineError) -> RunOutcome {
    match err {
        PipelineError::ReviewTimeout => RunOutcome::TimedOut,
        other => RunOutcome::Failed(other),
    }
}

/// What the review loop does next after a decision.
#[derive(Debug, PartialEq, Eq)]
pub enum ReviewStep {
    Publish,
    Redraft {
        forced_format: Option<PostFormat>,
        regen_count: u32,
    },
    Skip,
    TimedOut,
}

/// Pure policy for the AwaitingReview transitions. Regeneration (plain or
/// quote-tweet conversion) is bounded: once the cap is reached, the next
/// request converts to Skip.
pub fn apply_review_policy(
    decision: ReviewDecision,
    regen_count: u32,
    max_regenerations: u32,
) -> ReviewStep {
    match decision {
        ReviewDecision::Approve => ReviewStep::Publish,
        ReviewDecision::Skip => ReviewStep::Skip,
        ReviewDecision::TimedOut => ReviewStep::TimedOut,
        ReviewDecision::Regenerate => {
            if regen_count >= max_regenerations {
                ReviewStep::Skip
            } else {
                ReviewStep::Redraft {
                    forced_format: None,
                    regen_count: regen_count + 1,
                }
            }
        }
        ReviewDecision::ConvertToQuoteTweet => {
            if regen_count >= max_regenerations {
                ReviewStep::Skip
            } else {
                ReviewStep::Redraft {
                    forced_format: Some(PostFormat::PropagandaSlayerQuoteTweet),
                    regen_count: regen_count + 1,
                }
            }
        }
    }
}

struct Pipeline<'a> {
    cfg: &'a Config,
    db: &'a Database,
    run_id: Uuid,
    state: RunState,
}

/// Drives one run to its terminal state. All stage errors are absorbed here;
/// the caller only sees the outcome.
pub async fn execute(cfg: &Config, db: &Database, run_id: Uuid) -> RunOutcome {
    if let Err(err) = db.begin_run(run_id).await {
        return RunOutcome::Failed(PipelineError::external("ledger", err));
    }

    let mut pipeline = Pipeline {
        cfg,
        db,
        run_id,
        state: RunState::Fetching,
    };
    let _ = db
        .record_event(run_id, RunState::Fetching.label(), None)
        .await;
    info!("[run {}]: entering {}", run_id, RunState::Fetching.label());

    let outcome = match pipeline.run().await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("[run {}]: {}", run_id, err);
            let outcome = outcome_from_error(err);
            let terminal = match outcome {
                RunOutcome::TimedOut => RunState::TimedOut,
                _ => RunState::Failed,
            };
            pipeline.enter(terminal).await;
            outcome
        }
    };

    let _ = db
        .finish_run(run_id, outcome.label(), outcome.detail().as_deref())
        .await;
    info!("[run {}]: terminal state {}", run_id, outcome.label());
    outcome
}

impl Pipeline<'_> {
    async fn enter(&mut self, state: RunState) {
        if !is_valid_transition(self.state, state) {
            // Orchestrator bug; record it loudly but keep the run coherent.
            error!(
                "[run {}]: illegal transition {} -> {}",
                self.run_id,
                self.state.label(),
                state.label()
            );
        }
        self.state = state;
        let _ = self.db.record_event(self.run_id, state.label(), None).await;
        info!("[run {}]: entering {}", self.run_id, state.label());
    }

    async fn run(&mut self) -> Result<RunOutcome, PipelineError> {
        let cfg = self.cfg;
        let llm_client = cfg.build_llm_client();
        let analytic = LLMParams {
            llm_client: llm_client.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            require_json: true,
        };
        let drafting = LLMParams {
            llm_client,
            model: cfg.model.clone(),
            temperature: cfg.draft_temperature,
            require_json: true,
        };

        let candidates = feed::gather_candidates(cfg, self.db).await?;
        info!(
            "[run {}]: {} fresh candidates",
            self.run_id,
            candidates.len()
        );

        self.enter(RunState::Selecting).await;
        let story = selector::select_story(&candidates, &analytic).await?;

        self.enter(RunState::Extracting).await;
        let article = scrape::extract_article(story).await?;

        self.enter(RunState::Verifying).await;
        let verification =
            verifier::verify_article(&article, &analytic, cfg.verification_floor).await?;

        let mut gateway = TelegramGateway::new(&cfg.telegram);
        let publisher = TwitterPublisher::new(&cfg.twitter);

        let mut regen_count: u32 = 0;
        let mut forced_format: Option<PostFormat> = None;
        let mut cycle: u32 = 0;

        loop {
            cycle += 1;
            self.enter(RunState::Drafting).await;
            let draft =
                drafter::draft_post(&article, &verification, forced_format, &drafting).await?;

            self.enter(RunState::ImageGenerating).await;
            let generated = image::generate_image(
                &cfg.image,
                &draft.image_prompt,
                &cfg.drafts_dir,
                self.run_id,
                cycle,
            )
            .await?;

            self.archive_draft(&article, &verification, &draft, &generated.local_path)
                .await;

            self.enter(RunState::AwaitingReview).await;
            if cycle == 1 {
                let _ = self.db.mark_seen(&article.story.url).await;
            }
            let token = gateway
                .present_draft(&article.story, &verification, &draft, &generated)
                .await?;
            let _ = self.db.record_token(self.run_id, token).await;

            let decision = gateway.await_decision(token, cfg.review_timeout).await?;
            let _ = self.db.record_decision(token, decision.label()).await;
            info!(
                "[run {}]: review decision {} (regenerations so far: {})",
                self.run_id,
                decision.label(),
                regen_count
            );

            match apply_review_policy(decision, regen_count, cfg.max_regenerations) {
                ReviewStep::Publish => {
                    self.enter(RunState::Publishing).await;
                    // Persist the approved draft first; a publish failure
                    // must not lose what the reviewer signed off on.
                    let _ = self
                        .db
                        .record_approved_draft(self.run_id, token, &draft)
                        .await;

                    if self.db.is_published(token).await.unwrap_or(false) {
                        return Err(PipelineError::ExternalService {
                            service: "publisher",
                            message: format!("token {} already published", token),
                        });
                    }

                    match publisher.publish(&draft, &generated).await {
                        Ok(post) => {
                            let image_path = generated.local_path.to_string_lossy();
                            let _ = self
                                .db
                                .record_published(self.run_id, token, &post, Some(image_path.as_ref()))
                                .await;
                            gateway
                                .notify(&format!(
                                    "🚀 <b>Live on Twitter!</b>\nhttps://x.com/i/status/{}",
                                    post.platform_post_id
                                ))
                                .await;
                            self.enter(RunState::Published).await;
                            return Ok(RunOutcome::Published(post));
                        }
                        Err(err) => {
                            warn!(
                                "[run {}]: publish failed for approved draft {} ({})",
                                self.run_id,
                                draft.fingerprint(),
                                err
                            );
                            gateway
                                .notify(&format!(
                                    "❌ <b>Twitter Post Failed</b>\n<pre>{}</pre>",
                                    escape_html(&err.to_string())
                                ))
                                .await;
                            return Err(err);
                        }
                    }
                }
                ReviewStep::Redraft {
                    forced_format: forced,
                    regen_count: next,
                } => {
                    regen_count = next;
                    forced_format = forced;
                    info!(
                        "[run {}]: re-entering drafting (regeneration {}/{})",
                        self.run_id, regen_count, cfg.max_regenerations
                    );
                }
                ReviewStep::Skip => {
                    if decision != ReviewDecision::Skip {
                        gateway
                            .notify(&format!(
                                "⛔ Regeneration limit ({}) reached. Skipping this post.",
                                cfg.max_regenerations
                            ))
                            .await;
                    }
                    self.enter(RunState::Skipped).await;
                    return Ok(RunOutcome::Skipped);
                }
                ReviewStep::TimedOut => {
                    self.enter(RunState::TimedOut).await;
                    return Ok(RunOutcome::TimedOut);
                }
            }
        }
    }

    /// Best-effort local archive of the full draft, one file per cycle.
    async fn archive_draft(
        &self,
        article: &ExtractedArticle,
        verification: &VerificationResult,
        draft: &Draft,
        image_path: &std::path::Path,
    ) {
        let content = render_draft_archive(article, verification, draft, image_path);
        let path = self
            .cfg
            .drafts_dir
            .join(format!("post_draft_{}.txt", timestamp_slug()));
        if let Err(err) = tokio::fs::create_dir_all(&self.cfg.drafts_dir).await {
            warn!("[run {}]: could not create drafts dir: {}", self.run_id, err);
            return;
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => info!("[run {}]: draft archived at {}", self.run_id, path.display()),
            Err(err) => warn!("[run {}]: could not archive draft: {}", self.run_id, err),
        }
    }
}

fn render_draft_archive(
    article: &ExtractedArticle,
    verification: &VerificationResult,
    draft: &Draft,
    image_path: &std::path::Path,
) -> String {
    format!(
        "DRAFT POST — {}\n\n\
         == SOURCE NEWS ==\n\
         Headline : {}\n\
         Summary  : {}\n\
         Key Fact : {}\n\
         Source   : {}\n\
         Verified : {}/10\n\n\
         == FORMAT ==\n{}\n\n\
         == TWITTER POST ==\n{}\n\n\
         == INSTAGRAM POST ==\n{}\n\n\
         == IMAGE ==\nPrompt : {}\nFile   : {}\n\n\
         STATUS: PENDING APPROVAL\n",
        timestamp_slug(),
        article.story.headline,
        article.story.summary,
        article.story.key_fact,
        article.story.source,
        verification.verification_score,
        draft.chosen_format.label(),
        draft.twitter_post,
        draft.instagram_post,
        draft.image_prompt,
        image_path.display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approve_publishes() {
        assert_eq!(
            apply_review_policy(ReviewDecision::Approve, 0, 3),
            ReviewStep::Publish
        );
        // Approval is unaffected by how many regenerations happened.
        assert_eq!(
            apply_review_policy(ReviewDecision::Approve, 3, 3),
            ReviewStep::Publish
        );
    }

    #[test]
    fn test_regenerate_increments_until_cap() {
        assert_eq!(
            apply_review_policy(ReviewDecision::Regenerate, 0, 3),
            ReviewStep::Redraft {
                forced_format: None,
                regen_count: 1
            }
        );
        assert_eq!(
            apply_review_policy(ReviewDecision::Regenerate, 2, 3),
            ReviewStep::Redraft {
                forced_format: None,
                regen_count: 3
            }
        );
        // The fourth consecutive request converts to Skip.
        assert_eq!(
            apply_review_policy(ReviewDecision::Regenerate, 3, 3),
            ReviewStep::Skip
        );
    }

    #[test]
    fn test_three_regenerations_then_fourth_skips() {
        let mut regen_count = 0;
        for _ in 0..3 {
            match apply_review_policy(ReviewDecision::Regenerate, regen_count, 3) {
                ReviewStep::Redraft {
                    regen_count: next, ..
                } => regen_count = next,
                other => panic!("expected redraft, got {other:?}"),
            }
        }
        assert_eq!(regen_count, 3);
        assert_eq!(
            apply_review_policy(ReviewDecision::Regenerate, regen_count, 3),
            ReviewStep::Skip
        );
    }

    #[test]
    fn test_quote_tweet_forces_format_and_shares_cap() {
        assert_eq!(
            apply_review_policy(ReviewDecision::ConvertToQuoteTweet, 1, 3),
            ReviewStep::Redraft {
                forced_format: Some(PostFormat::PropagandaSlayerQuoteTweet),
                regen_count: 2
            }
        );
        assert_eq!(
            apply_review_policy(ReviewDecision::ConvertToQuoteTweet, 3, 3),
            ReviewStep::Skip
        );
    }

    #[test]
    fn test_skip_and_timeout_are_terminal_steps() {
        assert_eq!(
            apply_review_policy(ReviewDecision::Skip, 0, 3),
            ReviewStep::Skip
        );
        assert_eq!(
            apply_review_policy(ReviewDecision::TimedOut, 0, 3),
            ReviewStep::TimedOut
        );
    }

    #[test]
    fn test_transition_relation() {
        use RunState::*;
        assert!(is_valid_transition(Fetching, Selecting));
        assert!(is_valid_transition(Selecting, Extracting));
        assert!(is_valid_transition(ImageGenerating, AwaitingReview));
        // Review fans out.
        assert!(is_valid_transition(AwaitingReview, Publishing));
        assert!(is_valid_transition(AwaitingReview, Drafting));
        assert!(is_valid_transition(AwaitingReview, Skipped));
        assert!(is_valid_transition(AwaitingReview, TimedOut));
        // Every live state may fail.
        assert!(is_valid_transition(Fetching, Failed));
        assert!(is_valid_transition(Publishing, Failed));
        // No skipping ahead, no resurrecting terminals.
        assert!(!is_valid_transition(Fetching, Drafting));
        assert!(!is_valid_transition(Drafting, AwaitingReview));
        assert!(!is_valid_transition(Published, Drafting));
        assert!(!is_valid_transition(Skipped, Failed));
        assert!(!is_valid_transition(TimedOut, Publishing));
    }

    #[test]
    fn test_exactly_four_terminal_states() {
        use RunState::*;
        let all = [
            Fetching,
            Selecting,
            Extracting,
            Verifying,
            Drafting,
            ImageGenerating,
            AwaitingReview,
            Publishing,
            Published,
            Skipped,
            Failed,
            TimedOut,
        ];
        let terminals: Vec<_> = all.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminals.len(), 4);
        for terminal in terminals {
            for next in all {
                assert!(!is_valid_transition(*terminal, next));
            }
        }
    }

    #[test]
    fn test_exit_codes() {
        use chrono::Utc;
        let post = PublishedPost {
            platform_post_id: "1".to_string(),
            published_at: Utc::now(),
            draft_format: PostFormat::DevastatingNewsThread,
            twitter_text: "text".to_string(),
        };
        assert_eq!(RunOutcome::Published(post).exit_code(), 0);
        assert_eq!(RunOutcome::Skipped.exit_code(), 0);
        assert_eq!(RunOutcome::Failed(PipelineError::ReviewTimeout).exit_code(), 1);
        assert_eq!(RunOutcome::TimedOut.exit_code(), 2);
    }

    #[test]
    fn test_outcome_from_error_distinguishes_timeout() {
        assert!(matches!(
            outcome_from_error(PipelineError::ReviewTimeout),
            RunOutcome::TimedOut
        ));
        assert!(matches!(
            outcome_from_error(PipelineError::ExternalService {
                service: "image",
                message: "boom".to_string()
            }),
            RunOutcome::Failed(_)
        ));
    }
}
