use super::Stage;
use crate::config::PipelineConfig;
use crate::context::{
    AgentOutput, IdentificationSource, PipelineRequest, StageContext, StageData, StageName,
};
use crate::error::{InferenceError, Result, StageError};
use crate::inference::{collect_text, Availability, InferenceCapability};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_TITLE_CHARS: usize = 120;

/// Works out what product the user is asking about, from the image when one
/// was uploaded and from the query text otherwise.
pub struct IdentificationStage {
    inference: Arc<dyn InferenceCapability>,
    prompt: String,
    retries: u32,
    max_chunks: usize,
}

impl IdentificationStage {
    pub fn new(inference: Arc<dyn InferenceCapability>, config: &PipelineConfig) -> Self {
        Self {
            inference,
            prompt: config.identification_prompt.clone(),
            retries: config.identification_retries,
            max_chunks: config.max_description_chunks,
        }
    }

    async fn describe_once(&self, image: &[u8]) -> std::result::Result<String, InferenceError> {
        let chunks = self.inference.describe(image, &self.prompt).await?;
        let text = collect_text(chunks, self.max_chunks).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(InferenceError::InvalidResponse("empty description".to_string()));
        }
        Ok(text.to_string())
    }

    async fn describe_with_retry(&self, image: &[u8]) -> Result<String> {
        if let Availability::Unavailable(reason) = self.inference.availability() {
            return Err(InferenceError::Unavailable(reason).into());
        }

        let mut attempt = 0;
        loop {
            match self.describe_once(image).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(stage = %StageName::Identification, attempt, error = %e, "Inference failed, retrying");
                }
                Err(e) => return Err(StageError::InferenceUnavailable(e)),
            }
        }
    }
}

fn title_from_description(description: &str) -> String {
    let first_line = description
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(description);
    first_line.chars().take(MAX_TITLE_CHARS).collect()
}

#[async_trait]
impl Stage for IdentificationStage {
    fn name(&self) -> StageName {
        StageName::Identification
    }

    async fn run(&self, _ctx: &StageContext, request: &PipelineRequest) -> Result<AgentOutput> {
        if let Some(image) = &request.image {
            let description = self.describe_with_retry(image).await?;
            let title = title_from_description(&description);
            debug!(title = %title, "Identified product from image");
            return Ok(AgentOutput::new(
                format!("Identified the product from the image: {title}"),
                StageData::Identification {
                    title,
                    visual_summary: description,
                    source: IdentificationSource::Image,
                },
            ));
        }

        let query = request.query.trim();
        if query.is_empty() {
            return Err(StageError::MissingPrerequisite {
                stage: StageName::Identification,
                field: "user_query",
            });
        }

        Ok(AgentOutput::new(
            format!("Identified the product from the query: {query}"),
            StageData::Identification {
                title: query.to_string(),
                visual_summary: "No image was provided; the product was identified from the query text."
                    .to_string(),
                source: IdentificationSource::Text,
            },
        ))
    }

    fn apply(&self, ctx: &mut StageContext, output: &AgentOutput) {
        if let StageData::Identification {
            title,
            visual_summary,
            ..
        } = &output.data
        {
            ctx.identified_product.title = Some(title.clone());
            ctx.identified_product.visual_summary = Some(visual_summary.clone());
        }
    }
}
