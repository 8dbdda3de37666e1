pub mod artifact;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod image;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod publish;
pub mod scrape;
pub mod stages;
pub mod telegram;
pub mod util;

use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use ollama_rs::Ollama;

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_DB: &str = "db_query";

#[derive(Clone, Debug)]
pub enum LLMClient {
    Ollama(Ollama),
    OpenAI(OpenAIClient<OpenAIConfig>),
}

/// Everything needed to issue one reasoning call. Cloned per stage so the
/// drafter can run a different temperature than the verifier.
#[derive(Clone)]
pub struct LLMParams {
    pub llm_client: LLMClient,
    pub model: String,
    pub temperature: f32,
    pub require_json: bool,
}
