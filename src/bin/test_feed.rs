//! Fetches the configured feeds and prints the candidate list, without
//! touching the database or starting a run. Useful when tuning FEED_URLS.

use anyhow::Result;
use sawal::config::get_env_var_as_vec;
use sawal::feed;
use sawal::logging;

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();

    let feed_urls = get_env_var_as_vec("FEED_URLS", ';');
    if feed_urls.is_empty() {
        eprintln!("FEED_URLS is empty; set it to a ';'-separated list of feed URLs");
        std::process::exit(1);
    }

    for feed_url in &feed_urls {
        println!("\nFeed: {}", feed_url);
        match feed::fetch_and_parse(feed_url).await {
            Ok(candidates) => {
                println!("  {} candidates", candidates.len());
                for candidate in candidates {
                    println!(
                        "  - {} [{}] {}",
                        candidate.headline,
                        candidate.published_at.unwrap_or_else(|| "no date".to_string()),
                        candidate.url
                    );
                }
            }
            Err(err) => println!("  error: {}", err),
        }
    }

    Ok(())
}
