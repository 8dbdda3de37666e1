//! Prompt builders for every reasoning call. Each function returns the full
//! instruction text; the expected response shape is rendered from the same
//! schemars definitions the parser validates against, so prompt and parser
//! cannot drift apart.

use schemars::{schema_for, JsonSchema};

use crate::artifact::{CandidateItem, ExtractedArticle, PostFormat, VerificationResult};

/// Stock cartoon prompt substituted when the drafter returns an empty
/// image_prompt.
pub const FALLBACK_IMAGE_PROMPT: &str = "A clever, hand-drawn Indian newspaper political cartoon \
showing a giant politician ignoring a struggling common man. Watercolor caricature style, no text \
or words.";

fn schema_block<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

pub fn search_system_prompt() -> String {
    "You are an objective, data-driven research assistant for an Indian political news channel. \
Your job is to find breaking news stories (strictly from the last 24-48 hours) that clearly \
demonstrate a recent failure of the government, infrastructure collapse, massive public protest, \
or immediate economic crisis. Do not return old statistical reports. We need current, actionable, \
burning issues occurring right now in India. Extract hard data and the exact names of the public \
officials or institutions involved.

Return ONLY a JSON object of the form {\"candidates\": [{\"headline\": \"...\", \"source\": \"...\", \
\"url\": \"...\", \"published_at\": \"...\"}]} with up to eight candidates, no extra text."
        .to_string()
}

pub fn search_user_query() -> String {
    "What are the most significant breaking news stories from India in the last 24 to 48 hours \
that clearly show a failure of governance, infrastructure malfunction, or immediate crisis? \
Do not give me old data or general surveys. Give me specific incidents or policy failures that \
just happened, each with its source publication and article URL."
        .to_string()
}

pub fn scoring_system_prompt() -> String {
    "You are the editor-in-chief of a political accountability channel. You rank candidate \
stories by impact: concrete recent failures with hard numbers and named officials score high, \
vague op-eds and stale statistics score low."
        .to_string()
}

pub fn scoring_prompt(candidates: &[CandidateItem]) -> String {
    let mut listing = String::new();
    for (i, candidate) in candidates.iter().enumerate() {
        listing.push_str(&format!(
            "{}. {} — {} ({})\n",
            i + 1,
            candidate.headline,
            candidate.source,
            candidate.url
        ));
    }
    format!(
        "Here are today's candidate stories:

{listing}
Assign each candidate an impact score from 0 (ignore) to 20 (drop everything and cover this).
Score every candidate, copying its url exactly as given.

Your reply must be ONLY a JSON object validating against this schema:

{schema}",
        listing = listing,
        schema = schema_block::<crate::artifact::ScoreSheet>()
    )
}

pub fn story_profile_prompt(candidate: &CandidateItem, score: f64) -> String {
    format!(
        "Selected story: \"{}\" from {} ({}).

Profile this story for the channel. Summarize what happened in 2-3 sentences, name the single
most important hard fact (money lost, people affected, deadlines missed), explicitly name the
politicians or institutions involved, and state the systemic failure this incident is one
instance of. Set \"score\" to {} and copy \"url\" exactly as given above.

Your reply must be ONLY a JSON object validating against this schema:

{}",
        candidate.headline,
        candidate.source,
        candidate.url,
        score,
        schema_block::<crate::artifact::SelectedStory>()
    )
}

pub fn verification_system_prompt() -> String {
    "You are an investigative political researcher. You cross-check claims against the public \
record: official statements, budget documents, prior promises by the same officials, and \
comparable past incidents. You are brutally factual and you never soften a finding."
        .to_string()
}

pub fn verification_prompt(article: &ExtractedArticle) -> String {
    format!(
        "Headline: {}
Key fact claimed: {}
Politicians involved: {}

Full article text:
{}

Separate what is verifiable from what is not. List the claims you can confirm as
verified_facts (most load-bearing first) and the claims you cannot as unverified_claims.
In promises_vs_reality, contrast what the named officials promised with what this incident
shows was delivered. Set verification_score between 0 (nothing checks out) and 10 (every
claim solid).

Your reply must be ONLY a JSON object validating against this schema:

{}",
        article.story.headline,
        article.story.key_fact,
        article.story.politicians_involved,
        article.full_text,
        schema_block::<VerificationResult>()
    )
}

pub fn drafting_system_prompt(forced_format: Option<PostFormat>) -> String {
    let format_instruction = match forced_format {
        Some(format) => format!(
            "chosen_format MUST be \"{}\". Do not pick another format. Write a quote-tweet style \
takedown: under 250 characters, sharp, sarcastic, fact-first, NO hashtags.",
            format.label()
        ),
        None => {
            let mut names = String::new();
            for format in PostFormat::ALL {
                names.push_str(&format!("\"{}\", ", format.label()));
            }
            format!(
                "First pick the single best presentation format for this story from exactly \
these five: {}and put it in chosen_format.",
                names
            )
        }
    };

    format!(
        "You are a fearless, data-driven Indian political commentator running a highly influential \
social media accountability channel. Your goal is to systematically dismantle government \
propaganda and expose failures using logic, undeniable facts, and sharp, direct criticism. You \
are not afraid to explicitly name those responsible. Your tone is authoritative, analytical, and \
brutally honest, combining hard statistics with deep empathy for the common citizen. You write in \
clear, impactful English. Only use facts the verifier confirmed; never present an unverified \
claim as settled.

{format_instruction}

twitter_post rules:
- You are NOT bound by character limits unless the format says otherwise.
- Paragraph 1: The Hook. A shocking, hard-hitting summary of the failure, naming those responsible.
- Paragraph 2: The Data. The verified statistics, money lost, or numbers of people affected.
- Paragraph 3: The Accountability. Sharp, direct questions to the leadership.
- End with a strong call-to-action and 4-6 highly relevant hashtags.

instagram_post rules:
- Adapt the twitter post into an emotionally resonant, storytelling format. End with a powerful
citizen call-to-action and 6-8 hashtags.

image_prompt rules:
- Write a prompt for a clever, hand-drawn editorial political cartoon in watercolor-and-ink
newspaper caricature style.
- Do NOT mention real political figures' true names (use generic terms like 'politician' or
'leader').
- DO NOT include any words, labels, or speech bubbles in the image; the metaphor must be
entirely visual, on a clean minimalist background.

Your reply must be ONLY a JSON object validating against this schema:

{schema}",
        format_instruction = format_instruction,
        schema = schema_block::<crate::artifact::Draft>()
    )
}

pub fn quote_dunk_system_prompt() -> String {
    "You are the fearless voice of a political accountability channel. You have been provided \
with a PR tweet from the ruling party. Your job is to quote-tweet them by instantly dismantling \
their claim with hard facts, broken promises, or systemic reality. Keep it under 250 characters. \
Be sharp, sarcastic, and brutal. DO NOT use hashtags. Return ONLY the text of the quote-tweet, \
nothing else."
        .to_string()
}

pub fn quote_dunk_user_message(target_tweet: &str) -> String {
    format!("Target PR Tweet: \"{}\"", target_tweet)
}

pub fn drafting_user_message(
    article: &ExtractedArticle,
    verification: &VerificationResult,
) -> String {
    format!(
        "News Headline: {}
Summary: {}
Key Fact: {}
Politicians Involved: {}
Systemic Link: {}
Source: {}

Verified facts:
{}

Unverified claims (do not state these as settled):
{}

Promises vs reality: {}
Verification score: {}",
        article.story.headline,
        article.story.summary,
        article.story.key_fact,
        article.story.politicians_involved,
        article.story.systemic_link,
        article.story.source,
        bullet_list(&verification.verified_facts),
        bullet_list(&verification.unverified_claims),
        verification.promises_vs_reality,
        verification.verification_score,
    )
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(headline: &str, url: &str) -> CandidateItem {
        CandidateItem {
            headline: headline.to_string(),
            source: "Test Ledger".to_string(),
            url: url.to_string(),
            published_at: None,
        }
    }

    #[test]
    fn test_scoring_prompt_lists_every_candidate() {
        let candidates = vec![
            candidate("Bridge collapse", "https://a.example/1"),
            candidate("Fuel price protest", "https://b.example/2"),
        ];
        let prompt = scoring_prompt(&candidates);
        assert!(prompt.contains("https://a.example/1"));
        assert!(prompt.contains("https://b.example/2"));
        assert!(prompt.contains("\"scores\""));
    }

    #[test]
    fn test_forced_format_pins_the_variant() {
        let system = drafting_system_prompt(Some(PostFormat::PropagandaSlayerQuoteTweet));
        assert!(system.contains("MUST be \"Propaganda Slayer Quote-Tweet\""));
        assert!(!system.contains("pick the single best presentation format"));
    }

    #[test]
    fn test_open_format_offers_all_five() {
        let system = drafting_system_prompt(None);
        for format in PostFormat::ALL {
            assert!(system.contains(format.label()));
        }
    }
}
