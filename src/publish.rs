//! Twitter/X publisher: OAuth1-signed media upload followed by tweet
//! creation. Exactly one publish attempt per approval, plus the single
//! immediate retry allowed by the failure policy.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use rand::{distr::Alphanumeric, Rng};
use ring::hmac;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use crate::artifact::{Draft, GeneratedImage, PublishedPost};
use crate::config::TwitterConfig;
use crate::error::PipelineError;
use crate::TARGET_WEB_REQUEST;

const MEDIA_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
const CREATE_TWEET_URL: &str = "https://api.x.com/2/tweets";
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

pub struct TwitterPublisher {
    cfg: TwitterConfig,
    http: reqwest::Client,
}

impl TwitterPublisher {
    pub fn new(cfg: &TwitterConfig) -> Self {
        TwitterPublisher {
            cfg: cfg.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// Publishes the approved draft. One immediate retry on failure; a second
    /// failure surfaces to the orchestrator, which fails the run with the
    /// approved draft already persisted.
    pub async fn publish(
        &self,
        draft: &Draft,
        image: &GeneratedImage,
    ) -> Result<PublishedPost, PipelineError> {
        match self.publish_once(draft, image).await {
            Ok(post) => Ok(post),
            Err(first) => {
                warn!(target: TARGET_WEB_REQUEST, "Publish attempt failed ({}), retrying once", first);
                self.publish_once(draft, image).await
            }
        }
    }

    async fn publish_once(
        &self,
        draft: &Draft,
        image: &GeneratedImage,
    ) -> Result<PublishedPost, PipelineError> {
        let media_id = self.upload_media(image).await?;
        info!(target: TARGET_WEB_REQUEST, " ** Media uploaded, id {}", media_id);

        let tweet_id = self.create_tweet(&draft.twitter_post, &media_id).await?;
        info!(target: TARGET_WEB_REQUEST, " ** Tweet published, id {}", tweet_id);

        Ok(PublishedPost {
            platform_post_id: tweet_id,
            published_at: Utc::now(),
            draft_format: draft.chosen_format,
            twitter_text: draft.twitter_post.clone(),
        })
    }

    async fn upload_media(&self, image: &GeneratedImage) -> Result<String, PipelineError> {
        let bytes = tokio::fs::read(&image.local_path)
            .await
            .map_err(|e| PipelineError::external("publisher", e))?;

        // Multipart bodies are excluded from the OAuth1 signature; only the
        // oauth_* parameters are signed for this request.
        let authorization = oauth1_header(&self.cfg, "POST", MEDIA_UPLOAD_URL, &[]);
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("cartoon.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| PipelineError::external("publisher", e))?;
        let form = reqwest::multipart::Form::new().part("media", part);

        let request = self
            .http
            .post(MEDIA_UPLOAD_URL)
            .header("Authorization", authorization)
            .multipart(form)
            .send();
        let response = timeout(PUBLISH_TIMEOUT, request)
            .await
            .map_err(|_| PipelineError::external("publisher", "media upload timed out"))?
            .map_err(|e| PipelineError::external("publisher", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ExternalService {
                service: "publisher",
                message: format!("media upload status {}: {}", status, body),
            });
        }

        let upload: MediaUploadResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::external("publisher", e))?;
        Ok(upload.media_id_string)
    }

    async fn create_tweet(&self, text: &str, media_id: &str) -> Result<String, PipelineError> {
        self.post_tweet(json!({
            "text": text,
            "media": { "media_ids": [media_id] },
        }))
        .await
    }

    /// Quote-tweets an existing post. Used by the standalone engagement tool,
    /// not the approval pipeline.
    pub async fn quote_tweet(
        &self,
        text: &str,
        quoted_tweet_id: &str,
    ) -> Result<String, PipelineError> {
        self.post_tweet(json!({
            "text": text,
            "quote_tweet_id": quoted_tweet_id,
        }))
        .await
    }

    async fn post_tweet(&self, payload: serde_json::Value) -> Result<String, PipelineError> {
        let authorization = oauth1_header(&self.cfg, "POST", CREATE_TWEET_URL, &[]);

        let request = self
            .http
            .post(CREATE_TWEET_URL)
            .header("Authorization", authorization)
            .json(&payload)
            .send();
        let response = timeout(PUBLISH_TIMEOUT, request)
            .await
            .map_err(|_| PipelineError::external("publisher", "tweet creation timed out"))?
            .map_err(|e| PipelineError::external("publisher", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ExternalService {
                service: "publisher",
                message: format!("tweet creation status {}: {}", status, body),
            });
        }

        let created: CreateTweetResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::external("publisher", e))?;
        Ok(created.data.id)
    }
}

/// RFC 3986 percent encoding over UTF-8 bytes; only unreserved characters
/// pass through.
fn percent_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}

/// Builds the OAuth1 signature base string from the request method, base
/// URL, and the full (oauth + body) parameter set.
fn signature_base(method: &str, url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

fn sign_base(base: &str, consumer_secret: &str, token_secret: &str) -> String {
    let signing_key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, signing_key.as_bytes());
    let tag = hmac::sign(&key, base.as_bytes());
    BASE64.encode(tag.as_ref())
}

fn oauth1_header(
    cfg: &TwitterConfig,
    method: &str,
    url: &str,
    body_params: &[(&str, &str)],
) -> String {
    let nonce: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let timestamp = Utc::now().timestamp().to_string();
    build_oauth1_header(cfg, method, url, body_params, &nonce, &timestamp)
}

fn build_oauth1_header(
    cfg: &TwitterConfig,
    method: &str,
    url: &str,
    body_params: &[(&str, &str)],
    nonce: &str,
    timestamp: &str,
) -> String {
    let oauth_params: Vec<(String, String)> = vec![
        ("oauth_consumer_key".to_string(), cfg.consumer_key.clone()),
        ("oauth_nonce".to_string(), nonce.to_string()),
        ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
        ("oauth_timestamp".to_string(), timestamp.to_string()),
        ("oauth_token".to_string(), cfg.access_token.clone()),
        ("oauth_version".to_string(), "1.0".to_string()),
    ];

    let mut all_params = oauth_params.clone();
    all_params.extend(
        body_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );

    let base = signature_base(method, url, &all_params);
    let signature = sign_base(&base, &cfg.consumer_secret, &cfg.access_token_secret);

    let mut header_params = oauth_params;
    header_params.push(("oauth_signature".to_string(), signature));
    header_params.sort();

    let fields = header_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {}", fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference request from the OAuth1 signing documentation.
    fn reference_config() -> TwitterConfig {
        TwitterConfig {
            consumer_key: "xvz1evFS4wEEPTGEFPHBog".to_string(),
            consumer_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".to_string(),
            access_token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".to_string(),
            access_token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".to_string(),
        }
    }

    #[test]
    fn test_percent_encode_reserved_characters() {
        assert_eq!(
            percent_encode("Ladies + Gentlemen"),
            "Ladies%20%2B%20Gentlemen"
        );
        assert_eq!(
            percent_encode("An encoded string!"),
            "An%20encoded%20string%21"
        );
        assert_eq!(
            percent_encode("Dogs, Cats & Mice"),
            "Dogs%2C%20Cats%20%26%20Mice"
        );
        assert_eq!(percent_encode("unreserved.-_~"), "unreserved.-_~");
    }

    #[test]
    fn test_signature_matches_reference_vector() {
        let cfg = reference_config();
        let body_params: Vec<(String, String)> = vec![
            ("include_entities".to_string(), "true".to_string()),
            (
                "status".to_string(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".to_string(),
            ),
            ("oauth_consumer_key".to_string(), cfg.consumer_key.clone()),
            (
                "oauth_nonce".to_string(),
                "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg".to_string(),
            ),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), "1318622958".to_string()),
            ("oauth_token".to_string(), cfg.access_token.clone()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];

        let base = signature_base(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &body_params,
        );
        assert!(base.starts_with(
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&include_entities%3Dtrue"
        ));
        assert!(base.contains("oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg"));

        let signature = sign_base(&base, &cfg.consumer_secret, &cfg.access_token_secret);
        assert_eq!(signature, "tnnArxj06cWHq44gCs1OSKk/jLY=");
    }

    #[test]
    fn test_header_contains_signature_and_all_oauth_fields() {
        let cfg = reference_config();
        let header = build_oauth1_header(
            &cfg,
            "POST",
            "https://api.x.com/2/tweets",
            &[],
            "abcdef0123456789",
            "1318622958",
        );
        assert!(header.starts_with("OAuth "));
        for field in [
            "oauth_consumer_key=",
            "oauth_nonce=",
            "oauth_signature=",
            "oauth_signature_method=\"HMAC-SHA1\"",
            "oauth_timestamp=\"1318622958\"",
            "oauth_token=",
            "oauth_version=\"1.0\"",
        ] {
            assert!(header.contains(field), "missing {field} in {header}");
        }
    }
}
