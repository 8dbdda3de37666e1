use std::env;
use std::path::PathBuf;
use std::time::Duration;

use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use ollama_rs::Ollama;

use crate::error::PipelineError;
use crate::LLMClient;

/// Retrieves an environment variable and splits it into a vector of strings
/// based on a delimiter.
pub fn get_env_var_as_vec(var: &str, delimiter: char) -> Vec<String> {
    env::var(var)
        .unwrap_or_default()
        .split(delimiter)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Clone, Debug)]
pub struct TwitterConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

#[derive(Clone, Debug)]
pub struct ImageConfig {
    pub api_key: String,
    pub endpoint: String,
}

/// Optional Perplexity-style search provider for candidate discovery.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Which reasoning backend to talk to, captured once at startup.
#[derive(Clone, Debug)]
pub enum LLMBackend {
    OpenAI {
        api_key: String,
        base_url: Option<String>,
    },
    Ollama {
        host: String,
        port: u16,
    },
}

/// All runtime configuration, constructed once at process start and passed by
/// reference into each stage. Nothing reads the environment after this.
#[derive(Clone, Debug)]
pub struct Config {
    pub feed_urls: Vec<String>,
    pub search: Option<SearchConfig>,
    pub llm_backend: LLMBackend,
    pub model: String,
    pub temperature: f32,
    pub draft_temperature: f32,
    pub telegram: TelegramConfig,
    pub twitter: TwitterConfig,
    pub image: ImageConfig,
    pub drafts_dir: PathBuf,
    pub database_path: String,
    pub review_timeout: Duration,
    pub max_regenerations: u32,
    pub verification_floor: f64,
}

impl Config {
    /// Reads every setting from the environment, reporting all missing
    /// required keys at once rather than failing on the first.
    pub fn from_env() -> Result<Config, PipelineError> {
        let mut missing: Vec<&str> = Vec::new();

        let mut require = |var: &'static str| -> String {
            match env::var(var) {
                Ok(v) if !v.trim().is_empty() && !v.contains("your_") => v,
                _ => {
                    missing.push(var);
                    String::new()
                }
            }
        };

        let telegram = TelegramConfig {
            bot_token: require("TELEGRAM_BOT_TOKEN"),
            chat_id: require("TELEGRAM_CHAT_ID"),
        };
        let twitter = TwitterConfig {
            consumer_key: require("TWITTER_CONSUMER_KEY"),
            consumer_secret: require("TWITTER_CONSUMER_SECRET"),
            access_token: require("TWITTER_ACCESS_TOKEN"),
            access_token_secret: require("TWITTER_ACCESS_TOKEN_SECRET"),
        };
        let image = ImageConfig {
            api_key: require("FAL_KEY"),
            endpoint: env_or("IMAGE_ENDPOINT", "https://fal.run/fal-ai/flux-pro/v1.1"),
        };

        let feed_urls = get_env_var_as_vec("FEED_URLS", ';');
        let search = env::var("PERPLEXITY_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty() && !k.contains("your_"))
            .map(|api_key| SearchConfig {
                api_key,
                base_url: env_or("PERPLEXITY_BASE_URL", "https://api.perplexity.ai"),
                model: env_or("PERPLEXITY_MODEL", "sonar-pro"),
            });
        if feed_urls.is_empty() && search.is_none() {
            missing.push("FEED_URLS or PERPLEXITY_API_KEY");
        }

        if !missing.is_empty() {
            return Err(PipelineError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let llm_backend = match env::var("OPENAI_API_KEY") {
            Ok(api_key) if !api_key.trim().is_empty() => LLMBackend::OpenAI {
                api_key,
                base_url: env::var("OPENAI_BASE_URL").ok(),
            },
            _ => LLMBackend::Ollama {
                host: env_or("OLLAMA_HOST", "localhost"),
                port: env_or("OLLAMA_PORT", "11434").parse().unwrap_or(11434),
            },
        };

        Ok(Config {
            feed_urls,
            search,
            llm_backend,
            model: env_or("LLM_MODEL", "gpt-4o"),
            temperature: env_or("LLM_TEMPERATURE", "0.3").parse().unwrap_or(0.3),
            draft_temperature: env_or("DRAFT_TEMPERATURE", "0.85").parse().unwrap_or(0.85),
            telegram,
            twitter,
            image,
            drafts_dir: PathBuf::from(env_or("DRAFTS_DIR", "drafts")),
            database_path: env_or("DATABASE_PATH", "sawal.db"),
            review_timeout: Duration::from_secs(
                env_or("REVIEW_TIMEOUT_SECONDS", "1800").parse().unwrap_or(1800),
            ),
            max_regenerations: env_or("MAX_REGENERATIONS", "3").parse().unwrap_or(3),
            verification_floor: env_or("VERIFICATION_FLOOR", "4.0").parse().unwrap_or(4.0),
        })
    }

    /// Builds the reasoning client from the backend captured at startup: an
    /// OpenAI-compatible endpoint (OPENAI_BASE_URL reroutes to compatible
    /// providers) or a local Ollama instance.
    pub fn build_llm_client(&self) -> LLMClient {
        match &self.llm_backend {
            LLMBackend::OpenAI { api_key, base_url } => {
                let mut openai_config = OpenAIConfig::new().with_api_key(api_key.clone());
                if let Some(base_url) = base_url {
                    openai_config = openai_config.with_api_base(base_url.clone());
                }
                LLMClient::OpenAI(OpenAIClient::with_config(openai_config))
            }
            LLMBackend::Ollama { host, port } => {
                LLMClient::Ollama(Ollama::new(host.clone(), *port))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_var_as_vec_splits_and_trims() {
        env::set_var("SAWAL_TEST_URLS", " a;b ; ;c");
        let urls = get_env_var_as_vec("SAWAL_TEST_URLS", ';');
        assert_eq!(urls, vec!["a", "b", "c"]);
        env::remove_var("SAWAL_TEST_URLS");
    }

    #[test]
    fn test_missing_keys_are_reported_together() {
        // Single test so the process environment is only mutated from one
        // thread. A scrubbed environment must name every absent credential,
        // not just the first one encountered, and placeholder values left
        // over from a .env template count as missing.
        for var in [
            "TELEGRAM_BOT_TOKEN",
            "TELEGRAM_CHAT_ID",
            "TWITTER_CONSUMER_KEY",
            "TWITTER_CONSUMER_SECRET",
            "TWITTER_ACCESS_TOKEN",
            "TWITTER_ACCESS_TOKEN_SECRET",
            "FAL_KEY",
            "FEED_URLS",
            "PERPLEXITY_API_KEY",
        ] {
            env::remove_var(var);
        }
        let err = Config::from_env().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("TELEGRAM_BOT_TOKEN"));
        assert!(message.contains("TWITTER_ACCESS_TOKEN_SECRET"));
        assert!(message.contains("FAL_KEY"));

        env::set_var("TELEGRAM_BOT_TOKEN", "your_telegram_bot_token_here");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
        env::remove_var("TELEGRAM_BOT_TOKEN");
    }
}
