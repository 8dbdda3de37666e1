//! Approval gateway over a Telegram bot.
//!
//! The gateway presents one Draft (context, cartoon, post texts, action
//! keyboard) and collects exactly one decision for it. Every presented Draft
//! gets a single-use token; whichever decision arrives first resolves the
//! token and every later decision against it is ignored.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::json;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifact::{Draft, GeneratedImage, ReviewDecision, SelectedStory, VerificationResult};
use crate::config::TelegramConfig;
use crate::error::PipelineError;
use crate::TARGET_WEB_REQUEST;

/// Telegram truncates messages at 4096 characters; stay under it.
const MESSAGE_CHUNK: usize = 4000;
/// Long-poll duration per getUpdates request.
const POLL_SECS: u64 = 25;

/// Tracks which decision tokens are open and which have resolved. Lives for
/// the whole run so buttons from a replaced draft stay dead.
#[derive(Default)]
pub struct DecisionRegistry {
    resolved: HashMap<Uuid, ReviewDecision>,
    open: Vec<Uuid>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    /// First decision for an open token; the token is now spent.
    Accepted(ReviewDecision),
    /// The token was already resolved; no state change.
    Duplicate,
    /// Not a token this process issued.
    Unknown,
}

impl DecisionRegistry {
    pub fn issue(&mut self) -> Uuid {
        let token = Uuid::new_v4();
        self.open.push(token);
        token
    }

    pub fn resolve(&mut self, token: Uuid, decision: ReviewDecision) -> Resolution {
        if self.resolved.contains_key(&token) {
            return Resolution::Duplicate;
        }
        let Some(position) = self.open.iter().position(|t| *t == token) else {
            return Resolution::Unknown;
        };
        self.open.remove(position);
        self.resolved.insert(token, decision);
        Resolution::Accepted(decision)
    }
}

/// Maps a callback action identifier onto a decision.
pub fn decision_from_action(action: &str) -> Option<ReviewDecision> {
    match action {
        "approve" => Some(ReviewDecision::Approve),
        "regen" => Some(ReviewDecision::Regenerate),
        "skip" => Some(ReviewDecision::Skip),
        "quote" => Some(ReviewDecision::ConvertToQuoteTweet),
        _ => None,
    }
}

/// Typed replies work as well as button taps.
pub fn decision_from_text(text: &str) -> Option<ReviewDecision> {
    match text.trim().to_lowercase().as_str() {
        "approve" | "yes" | "ok" | "✅" => Some(ReviewDecision::Approve),
        "regen" | "regenerate" | "redo" | "🔄" => Some(ReviewDecision::Regenerate),
        "skip" | "no" | "next" | "⏭" => Some(ReviewDecision::Skip),
        "quote" | "qt" | "⚔" => Some(ReviewDecision::ConvertToQuoteTweet),
        _ => None,
    }
}

/// Splits `action_token` callback data back apart.
pub fn parse_callback(data: &str) -> Option<(&str, Uuid)> {
    let (action, raw_token) = data.split_once('_')?;
    let token = Uuid::parse_str(raw_token).ok()?;
    Some((action, token))
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    #[allow(dead_code)]
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    callback_query: Option<CallbackQuery>,
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    text: Option<String>,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

pub struct TelegramGateway {
    http: reqwest::Client,
    api_base: String,
    chat_id: String,
    registry: DecisionRegistry,
}

impl TelegramGateway {
    pub fn new(cfg: &TelegramConfig) -> Self {
        TelegramGateway {
            http: reqwest::Client::new(),
            api_base: format!("https://api.telegram.org/bot{}", cfg.bot_token),
            chat_id: cfg.chat_id.clone(),
            registry: DecisionRegistry::default(),
        }
    }

    /// Presents the draft and returns its single-use decision token.
    pub async fn present_draft(
        &mut self,
        story: &SelectedStory,
        verification: &VerificationResult,
        draft: &Draft,
        image: &GeneratedImage,
    ) -> Result<Uuid, PipelineError> {
        let token = self.registry.issue();

        self.send_message(&format!(
            "🇮🇳 <b>NEW POST DRAFT READY</b>\n\n📰 <b>News:</b> {}\n📊 <b>Key Fact:</b> {}\n🔎 <b>Verification:</b> {}/10",
            escape_html(&story.headline),
            escape_html(&story.key_fact),
            verification.verification_score
        ))
        .await?;

        self.send_photo(&image.local_path, "(Image generated for this post)")
            .await?;

        self.send_long_message(&format!(
            "🐦 <b>Twitter — {}:</b>\n\n{}",
            draft.chosen_format.label(),
            escape_html(&draft.twitter_post)
        ))
        .await?;
        self.send_long_message(&format!(
            "📸 <b>Instagram:</b>\n\n{}",
            escape_html(&draft.instagram_post)
        ))
        .await?;

        self.send_approval_prompt(token).await?;
        info!(target: TARGET_WEB_REQUEST, " ** Draft presented for review, token {}", token);
        Ok(token)
    }

    /// Long-polls for the decision on `token` until the window elapses.
    /// Timeout resolves the token itself, so a tap arriving after the
    /// deadline is treated as a duplicate rather than reviving the run.
    pub async fn await_decision(
        &mut self,
        token: Uuid,
        window: Duration,
    ) -> Result<ReviewDecision, PipelineError> {
        info!(
            target: TARGET_WEB_REQUEST,
            "Waiting for review decision (timeout: {} min). Tap a button or reply: approve / regen / skip / quote",
            window.as_secs() / 60
        );

        let deadline = Instant::now() + window;
        let mut offset: Option<i64> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let _ = self.registry.resolve(token, ReviewDecision::TimedOut);
                let _ = self
                    .send_message("⏰ No response received in the review window. Skipping this post.")
                    .await;
                return Ok(ReviewDecision::TimedOut);
            }

            let poll_secs = POLL_SECS.min(remaining.as_secs().max(1));
            let updates = match self.get_updates(poll_secs, offset).await {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(target: TARGET_WEB_REQUEST, "getUpdates failed: {}", err);
                    sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);

                if let Some(callback) = update.callback_query {
                    let Some(data) = callback.data.as_deref() else {
                        continue;
                    };
                    let Some((action, cb_token)) = parse_callback(data) else {
                        continue;
                    };
                    let Some(decision) = decision_from_action(action) else {
                        continue;
                    };

                    match self.registry.resolve(cb_token, decision) {
                        Resolution::Accepted(decision) => {
                            self.answer_callback(&callback.id, ack_text(decision)).await;
                            let _ = self.send_message(confirmation_text(decision)).await;
                            if cb_token == token {
                                return Ok(decision);
                            }
                            // A still-open token from an earlier cycle; the
                            // current draft superseded it.
                            debug!(target: TARGET_WEB_REQUEST, "Decision for superseded token {} ignored", cb_token);
                        }
                        Resolution::Duplicate => {
                            warn!(
                                target: TARGET_WEB_REQUEST,
                                "{}",
                                PipelineError::DuplicateDecision { token: cb_token }
                            );
                            self.answer_callback(&callback.id, "Already decided").await;
                        }
                        Resolution::Unknown => {
                            debug!(target: TARGET_WEB_REQUEST, "Callback for unknown token {} ignored", cb_token);
                        }
                    }
                } else if let Some(message) = update.message {
                    if message.chat.id.to_string() != self.chat_id {
                        continue;
                    }
                    let Some(decision) = message.text.as_deref().and_then(decision_from_text)
                    else {
                        continue;
                    };
                    if let Resolution::Accepted(decision) = self.registry.resolve(token, decision)
                    {
                        let _ = self.send_message(confirmation_text(decision)).await;
                        return Ok(decision);
                    }
                }
            }
        }
    }

    /// Operator notification outside the review flow (publish results,
    /// failures). Best-effort.
    pub async fn notify(&self, text: &str) {
        if let Err(err) = self.send_message(text).await {
            warn!(target: TARGET_WEB_REQUEST, " !! Error sending Telegram notification: {}", err);
        }
    }

    async fn send_approval_prompt(&self, token: Uuid) -> Result<(), PipelineError> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": format!(
                "⏳ <b>Post Draft Ready for Review</b>\nDraft ID: <code>{}</code>\n\nChoose an action:",
                token
            ),
            "parse_mode": "HTML",
            "reply_markup": {
                "inline_keyboard": [
                    [
                        {"text": "✅ Approve & Post", "callback_data": format!("approve_{}", token)},
                        {"text": "🔄 Regenerate", "callback_data": format!("regen_{}", token)},
                    ],
                    [
                        {"text": "⏭️ Skip", "callback_data": format!("skip_{}", token)},
                        {"text": "⚔️ Quote-Tweet", "callback_data": format!("quote_{}", token)},
                    ],
                ],
            },
        });
        self.call::<SentMessage>("sendMessage", &payload).await?;
        Ok(())
    }

    async fn send_message(&self, text: &str) -> Result<(), PipelineError> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        self.call::<SentMessage>("sendMessage", &payload).await?;
        Ok(())
    }

    async fn send_long_message(&self, text: &str) -> Result<(), PipelineError> {
        for chunk in chunk_message(text, MESSAGE_CHUNK) {
            self.send_message(&chunk).await?;
        }
        Ok(())
    }

    async fn send_photo(&self, path: &Path, caption: &str) -> Result<(), PipelineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::external("telegram", e))?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("cartoon.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| PipelineError::external("telegram", e))?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part("photo", part);

        let request = self
            .http
            .post(format!("{}/sendPhoto", self.api_base))
            .multipart(form)
            .send();
        let response = timeout(Duration::from_secs(30), request)
            .await
            .map_err(|_| PipelineError::external("telegram", "sendPhoto timed out"))?
            .map_err(|e| PipelineError::external("telegram", e))?;
        if !response.status().is_success() {
            return Err(PipelineError::ExternalService {
                service: "telegram",
                message: format!("sendPhoto status {}", response.status()),
            });
        }
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) {
        let payload = json!({
            "callback_query_id": callback_id,
            "text": text,
            "show_alert": false,
        });
        if let Err(err) = self.call::<bool>("answerCallbackQuery", &payload).await {
            debug!(target: TARGET_WEB_REQUEST, "answerCallbackQuery failed: {}", err);
        }
    }

    async fn get_updates(
        &self,
        poll_secs: u64,
        offset: Option<i64>,
    ) -> Result<Vec<Update>, PipelineError> {
        let mut payload = json!({
            "timeout": poll_secs,
            "allowed_updates": ["callback_query", "message"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }

        let request = self
            .http
            .post(format!("{}/getUpdates", self.api_base))
            .json(&payload)
            .send();
        // Leave headroom past the long-poll duration before giving up.
        let response = timeout(Duration::from_secs(poll_secs + 10), request)
            .await
            .map_err(|_| PipelineError::external("telegram", "getUpdates timed out"))?
            .map_err(|e| PipelineError::external("telegram", e))?;

        let envelope: ApiEnvelope<Vec<Update>> = response
            .json()
            .await
            .map_err(|e| PipelineError::external("telegram", e))?;
        if !envelope.ok {
            return Err(PipelineError::ExternalService {
                service: "telegram",
                message: envelope
                    .description
                    .unwrap_or_else(|| "getUpdates not ok".to_string()),
            });
        }
        Ok(envelope.result.unwrap_or_default())
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<T, PipelineError> {
        let request = self
            .http
            .post(format!("{}/{}", self.api_base, method))
            .json(payload)
            .send();
        let response = timeout(Duration::from_secs(15), request)
            .await
            .map_err(|_| PipelineError::external("telegram", format!("{} timed out", method)))?
            .map_err(|e| PipelineError::external("telegram", e))?;

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| PipelineError::external("telegram", e))?;
        if !envelope.ok {
            return Err(PipelineError::ExternalService {
                service: "telegram",
                message: envelope
                    .description
                    .unwrap_or_else(|| format!("{} not ok", method)),
            });
        }
        envelope
            .result
            .ok_or_else(|| PipelineError::external("telegram", format!("{} returned no result", method)))
    }
}

fn ack_text(decision: ReviewDecision) -> &'static str {
    match decision {
        ReviewDecision::Approve => "✅ Approved!",
        ReviewDecision::Regenerate => "🔄 Regenerating...",
        ReviewDecision::Skip => "⏭️ Skipped",
        ReviewDecision::ConvertToQuoteTweet => "⚔️ Converting...",
        ReviewDecision::TimedOut => "Got it!",
    }
}

fn confirmation_text(decision: ReviewDecision) -> &'static str {
    match decision {
        ReviewDecision::Approve => "✅ Approved! Publishing now.",
        ReviewDecision::Regenerate => "🔄 Regenerating a new post...",
        ReviewDecision::Skip => "⏭️ Skipped. Next post on the following run.",
        ReviewDecision::ConvertToQuoteTweet => "⚔️ Converting to a quote-tweet takedown...",
        ReviewDecision::TimedOut => "⏰ Review window elapsed.",
    }
}

/// Splits a message on char boundaries so no chunk exceeds `limit` bytes.
fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if current.len() + ch.len_utf8() > limit {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_single_use_token() {
        let mut registry = DecisionRegistry::default();
        let token = registry.issue();

        assert_eq!(
            registry.resolve(token, ReviewDecision::Approve),
            Resolution::Accepted(ReviewDecision::Approve)
        );
        // A second decision against the resolved token is a no-op.
        assert_eq!(
            registry.resolve(token, ReviewDecision::Skip),
            Resolution::Duplicate
        );
        assert_eq!(
            registry.resolve(token, ReviewDecision::Approve),
            Resolution::Duplicate
        );
    }

    #[test]
    fn test_registry_unknown_token() {
        let mut registry = DecisionRegistry::default();
        registry.issue();
        assert_eq!(
            registry.resolve(Uuid::new_v4(), ReviewDecision::Approve),
            Resolution::Unknown
        );
    }

    #[test]
    fn test_timed_out_token_makes_late_taps_duplicates() {
        let mut registry = DecisionRegistry::default();
        let token = registry.issue();
        assert_eq!(
            registry.resolve(token, ReviewDecision::TimedOut),
            Resolution::Accepted(ReviewDecision::TimedOut)
        );
        assert_eq!(
            registry.resolve(token, ReviewDecision::Approve),
            Resolution::Duplicate
        );
    }

    #[test]
    fn test_parse_callback_round_trip() {
        let token = Uuid::new_v4();
        let data = format!("approve_{}", token);
        let (action, parsed) = parse_callback(&data).unwrap();
        assert_eq!(action, "approve");
        assert_eq!(parsed, token);

        assert!(parse_callback("garbage").is_none());
        assert!(parse_callback("approve_not-a-uuid").is_none());
    }

    #[test]
    fn test_decision_mappings() {
        assert_eq!(decision_from_action("regen"), Some(ReviewDecision::Regenerate));
        assert_eq!(
            decision_from_action("quote"),
            Some(ReviewDecision::ConvertToQuoteTweet)
        );
        assert_eq!(decision_from_action("publish"), None);

        assert_eq!(decision_from_text(" YES "), Some(ReviewDecision::Approve));
        assert_eq!(decision_from_text("redo"), Some(ReviewDecision::Regenerate));
        assert_eq!(decision_from_text("next"), Some(ReviewDecision::Skip));
        assert_eq!(decision_from_text("qt"), Some(ReviewDecision::ConvertToQuoteTweet));
        assert_eq!(decision_from_text("hello"), None);
    }

    #[test]
    fn test_chunk_message_respects_limit() {
        let text = "a".repeat(9000);
        let chunks = chunk_message(&text, 4000);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 4000));
        assert_eq!(chunks.concat(), text);

        assert!(chunk_message("", 4000).is_empty());
    }
}
