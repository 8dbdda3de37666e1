//! Maps parsed feed entries onto candidate items.

use std::io;

use feed_rs::parser;
use tracing::warn;
use url::Url;

use crate::artifact::CandidateItem;
use crate::error::PipelineError;
use crate::TARGET_WEB_REQUEST;

/// Parses a feed body into candidates. Entries without a link or title are
/// skipped with a warning; they cannot be selected or extracted anyway.
pub fn parse_feed(body: &str, feed_url: &str) -> Result<Vec<CandidateItem>, PipelineError> {
    let reader = io::Cursor::new(body);
    let feed = parser::parse(reader).map_err(|e| PipelineError::external("feeds", e))?;

    let feed_title = feed.title.map(|t| t.content);
    let fallback_source = feed_title.unwrap_or_else(|| host_of(feed_url));

    let mut candidates = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let Some(link) = entry.links.first().map(|link| link.href.clone()) else {
            warn!(target: TARGET_WEB_REQUEST, "Feed entry missing link, skipping");
            continue;
        };
        let Some(title) = entry.title.as_ref().map(|t| t.content.clone()) else {
            warn!(target: TARGET_WEB_REQUEST, "Feed entry missing title, skipping: {}", link);
            continue;
        };
        candidates.push(CandidateItem {
            headline: title,
            source: fallback_source.clone(),
            url: link,
            published_at: entry.published.map(|date| date.to_rfc3339()),
        });
    }
    Ok(candidates)
}

fn host_of(feed_url: &str) -> String {
    Url::parse(feed_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| feed_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>The National Ledger</title>
    <link>https://ledger.example</link>
    <item>
      <title>Bridge collapses weeks after inauguration</title>
      <link>https://ledger.example/bridge</link>
      <pubDate>Mon, 03 Aug 2026 06:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Entry with no link is skipped</title>
    </item>
    <item>
      <title>Fuel price protest spreads to six districts</title>
      <link>https://ledger.example/fuel</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed_maps_entries() {
        let candidates = parse_feed(SAMPLE_RSS, "https://ledger.example/rss").unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0].headline,
            "Bridge collapses weeks after inauguration"
        );
        assert_eq!(candidates[0].url, "https://ledger.example/bridge");
        assert_eq!(candidates[0].source, "The National Ledger");
        assert!(candidates[0].published_at.is_some());
        assert_eq!(candidates[1].url, "https://ledger.example/fuel");
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        assert!(parse_feed("not a feed at all", "https://x.example").is_err());
    }

    #[test]
    fn test_host_fallback_for_untitled_feed() {
        assert_eq!(host_of("https://ledger.example/rss"), "ledger.example");
    }
}
