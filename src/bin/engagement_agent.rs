//! Standalone engagement tool: fetches the most recent original tweet from a
//! target handle, drafts a fact-first quote-tweet reply, and posts it. Runs
//! outside the approval pipeline; nothing here touches the run ledger.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Deserialize;

use sawal::config::Config;
use sawal::llm::generate_response;
use sawal::logging;
use sawal::prompt;
use sawal::publish::TwitterPublisher;
use sawal::LLMParams;

#[derive(Parser)]
#[command(name = "engagement_agent", about = "Quote-tweet the latest post from a target handle")]
struct Cli {
    /// Handle to respond to, without the leading @.
    target_handle: String,

    /// Draft the reply and print it without posting.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
struct UserLookup {
    data: UserData,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TweetList {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();
    let cli = Cli::parse();
    let cfg = Config::from_env().map_err(|e| anyhow!(e.to_string()))?;
    let bearer_token = std::env::var("TWITTER_BEARER_TOKEN")
        .map_err(|_| anyhow!("TWITTER_BEARER_TOKEN is not set"))?;

    println!("[1/3] Fetching latest tweet from @{}...", cli.target_handle);
    let http = reqwest::Client::new();

    let lookup: UserLookup = http
        .get(format!(
            "https://api.x.com/2/users/by/username/{}",
            cli.target_handle
        ))
        .bearer_auth(&bearer_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let tweets: TweetList = http
        .get(format!("https://api.x.com/2/users/{}/tweets", lookup.data.id))
        .query(&[("max_results", "5"), ("exclude", "retweets,replies")])
        .bearer_auth(&bearer_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let Some(target) = tweets.data.first() else {
        println!("@{} has not posted anything new.", cli.target_handle);
        return Ok(());
    };
    println!("  target tweet ({}): {}", target.id, target.text);

    println!("[2/3] Drafting quote-tweet response...");
    let params = LLMParams {
        llm_client: cfg.build_llm_client(),
        model: cfg.model.clone(),
        temperature: cfg.draft_temperature,
        require_json: false,
    };
    let dunk = generate_response(
        &prompt::quote_dunk_system_prompt(),
        &prompt::quote_dunk_user_message(&target.text),
        &params,
        "quote-dunk",
    )
    .await?;
    let dunk = dunk.trim().trim_matches('"').to_string();
    println!("  draft: {}", dunk);

    if cli.dry_run {
        println!("[3/3] Dry run; not posting.");
        return Ok(());
    }

    println!("[3/3] Posting quote-tweet...");
    let publisher = TwitterPublisher::new(&cfg.twitter);
    let tweet_id = publisher.quote_tweet(&dunk, &target.id).await?;
    println!("  live: https://x.com/i/status/{}", tweet_id);

    Ok(())
}
