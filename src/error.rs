use uuid::Uuid;

/// Stage-level failure taxonomy. Every variant is caught at the orchestrator
/// boundary and mapped onto exactly one terminal run state; nothing here is
/// allowed to escape and leave a run ambiguous.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An upstream provider (search, reasoning, image, messaging, publishing)
    /// returned an error or timed out.
    #[error("{service} request failed: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },

    /// A structured reasoning response did not match the expected shape.
    /// Non-retryable within the same run: malformed data must not flow
    /// downstream.
    #[error("schema validation failed in {stage}: {message}")]
    SchemaValidation {
        stage: &'static str,
        message: String,
    },

    /// Nobody answered inside the review window. Maps to TimedOut, not
    /// Failed: nothing actually went wrong.
    #[error("no review decision within the wait window")]
    ReviewTimeout,

    /// A second decision arrived for an already-resolved token. Logged and
    /// ignored, never surfaced as a run failure.
    #[error("decision token {token} already resolved")]
    DuplicateDecision { token: Uuid },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn external(service: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::ExternalService {
            service,
            message: err.to_string(),
        }
    }

    pub fn schema(stage: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::SchemaValidation {
            stage,
            message: err.to_string(),
        }
    }
}
