//! Injects a custom headline and URL, then runs the back half of the
//! pipeline (extract, verify, draft, image, review) without the feed and
//! selector front end. Nothing is published; this is for trying stories the
//! feeds did not surface.

use anyhow::{anyhow, Result};
use clap::Parser;
use uuid::Uuid;

use sawal::artifact::SelectedStory;
use sawal::config::Config;
use sawal::image;
use sawal::logging;
use sawal::scrape;
use sawal::stages::{drafter, verifier};
use sawal::telegram::TelegramGateway;
use sawal::LLMParams;

#[derive(Parser)]
#[command(name = "custom_article", about = "Run the draft pipeline on a custom article")]
struct Cli {
    /// The headline to cover.
    headline: String,
    /// URL of the article to extract and verify.
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();
    let cli = Cli::parse();
    let cfg = Config::from_env().map_err(|e| anyhow!(e.to_string()))?;

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

    let story = SelectedStory {
        headline: cli.headline.clone(),
        summary: cli.headline.clone(),
        source: "custom".to_string(),
        url: cli.url.clone(),
        systemic_link: String::new(),
        key_fact: String::new(),
        politicians_involved: String::new(),
        score: 0.0,
    };

    println!("[1/4] Extracting article...");
    let article = scrape::extract_article(story).await?;

    println!("[2/4] Verifying claims...");
    let verification =
        verifier::verify_article(&article, &analytic, cfg.verification_floor).await?;
    println!(
        "  verified {} facts, score {}",
        verification.verified_facts.len(),
        verification.verification_score
    );

    println!("[3/4] Drafting post...");
    let draft = drafter::draft_post(&article, &verification, None, &drafting).await?;
    println!("  format: {}", draft.chosen_format.label());

    println!("[4/4] Generating image and sending to Telegram for review...");
    let run_id = Uuid::new_v4();
    let generated =
        image::generate_image(&cfg.image, &draft.image_prompt, &cfg.drafts_dir, run_id, 1).await?;

    let mut gateway = TelegramGateway::new(&cfg.telegram);
    let token = gateway
        .present_draft(&article.story, &verification, &draft, &generated)
        .await?;
    let decision = gateway.await_decision(token, cfg.review_timeout).await?;
    println!("Decision: {}", decision.label());
    println!("Draft image: {}", generated.local_path.display());

    Ok(())
}
