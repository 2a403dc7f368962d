use std::time::Duration;

pub const DEFAULT_IDENTIFICATION_PROMPT: &str =
    "Identify this product and describe its key visual features.";

/// Tunables injected into the orchestrator at startup
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of similar products the retrieval stage asks the index for
    pub top_k: usize,
    /// Upper bound on a single stage, retries included
    pub stage_timeout: Duration,
    pub identification_prompt: String,
    /// Extra attempts allowed for the identification inference call
    pub identification_retries: u32,
    /// Events buffered between the pipeline task and the HTTP response
    pub event_buffer: usize,
    /// Cap on the number of text chunks accepted from one describe call
    pub max_description_chunks: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            stage_timeout: Duration::from_secs(30),
            identification_prompt: DEFAULT_IDENTIFICATION_PROMPT.to_string(),
            identification_retries: 1,
            event_buffer: 16,
            max_description_chunks: 1024,
        }
    }
}
