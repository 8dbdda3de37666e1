use std::time::Duration;

use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use ollama_rs::generation::parameters::FormatType;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::{LLMClient, LLMParams, TARGET_LLM_REQUEST};

const LLM_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RETRIES: usize = 3;

/// Issues one reasoning call with retries, a per-attempt timeout, and
/// exponential backoff. `stage` only labels log lines.
pub async fn generate_response(
    system: &str,
    prompt: &str,
    params: &LLMParams,
    stage: &'static str,
) -> Result<String, PipelineError> {
    let mut backoff = 2;
    let mut last_error = String::new();

    debug!(target: TARGET_LLM_REQUEST, "[{}]: starting LLM request ({} chars)", stage, prompt.len());

    for retry_count in 0..MAX_RETRIES {
        match timeout(LLM_TIMEOUT, generate_once(system, prompt, params)).await {
            Ok(Ok(response)) => {
                let response = response.trim().to_string();
                if !response.is_empty() {
                    debug!(target: TARGET_LLM_REQUEST, "[{}]: LLM response received ({} chars)", stage, response.len());
                    return Ok(response);
                }
                last_error = "empty completion".to_string();
                warn!(target: TARGET_LLM_REQUEST, "[{}]: empty completion", stage);
            }
            Ok(Err(e)) => {
                last_error = e;
                warn!(target: TARGET_LLM_REQUEST, "[{}]: error generating response: {}", stage, last_error);
            }
            Err(_) => {
                last_error = format!("timed out after {}s", LLM_TIMEOUT.as_secs());
                warn!(target: TARGET_LLM_REQUEST, "[{}]: LLM request timed out", stage);
            }
        }

        if retry_count < MAX_RETRIES - 1 {
            info!(target: TARGET_LLM_REQUEST, "[{}]: retrying LLM request... ({}/{})", stage, retry_count + 1, MAX_RETRIES);
            sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }

    error!(target: TARGET_LLM_REQUEST, "[{}]: failed to generate response after {} retries", stage, MAX_RETRIES);
    Err(PipelineError::ExternalService {
        service: "reasoning",
        message: last_error,
    })
}

async fn generate_once(
    system: &str,
    prompt: &str,
    params: &LLMParams,
) -> Result<String, String> {
    match &params.llm_client {
        LLMClient::Ollama(ollama) => {
            let mut request = GenerationRequest::new(params.model.clone(), prompt.to_string());
            request.system = Some(system.to_string().into());
            request.options = Some(GenerationOptions::default().temperature(params.temperature));
            if params.require_json {
                request.format = Some(FormatType::Json);
            }
            ollama
                .generate(request)
                .await
                .map(|response| response.response)
                .map_err(|e| e.to_string())
        }
        LLMClient::OpenAI(client) => {
            let system_message = ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| e.to_string())?;
            let user_message = ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| e.to_string())?;

            let mut builder = CreateChatCompletionRequestArgs::default();
            builder
                .model(&params.model)
                .temperature(params.temperature)
                .messages([system_message.into(), user_message.into()]);
            if params.require_json {
                builder.response_format(ResponseFormat::JsonObject);
            }
            let request = builder.build().map_err(|e| e.to_string())?;

            let response = client.chat().create(request).await.map_err(|e| e.to_string())?;
            response
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
                .ok_or_else(|| "completion had no content".to_string())
        }
    }
}
