use super::{require_title, Stage};
use crate::context::{AgentOutput, PipelineRequest, StageContext, StageData, StageName};
use crate::error::Result;
use crate::inference::InferenceCapability;
use async_trait::async_trait;
use shopwise_core::{SearchResult, SimilarityIndex, Vector};
use std::sync::Arc;
use tracing::{debug, warn};

/// Finds corpus products similar to the identified one.
///
/// Degrades instead of failing when the index is absent or the embedding
/// call fails; the reason travels in the output so consumers can see it.
pub struct RetrievalStage {
    index: Option<Arc<SimilarityIndex>>,
    inference: Arc<dyn InferenceCapability>,
    top_k: usize,
}

impl RetrievalStage {
    pub fn new(
        index: Option<Arc<SimilarityIndex>>,
        inference: Arc<dyn InferenceCapability>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            inference,
            top_k,
        }
    }

    /// Embed the request, preferring the image. Returns the vector and, when
    /// the image path failed, the reason for falling back to text.
    async fn query_vector(
        &self,
        request: &PipelineRequest,
        text: &str,
    ) -> std::result::Result<(Vector, Option<String>), String> {
        let mut fallback = None;
        if let Some(image) = &request.image {
            match self.inference.embed_image(image).await {
                Ok(vector) => return Ok((vector, None)),
                Err(e) => {
                    warn!(stage = %StageName::Retrieval, error = %e, "Image embedding failed, falling back to text");
                    fallback = Some(format!("image embedding failed ({e}); searched by text instead"));
                }
            }
        }
        match self.inference.embed_text(text).await {
            Ok(vector) => Ok((vector, fallback)),
            Err(e) => Err(format!("query embedding failed: {e}")),
        }
    }
}

fn degraded(query: &str, reason: String) -> AgentOutput {
    warn!(stage = %StageName::Retrieval, reason = %reason, "Retrieval degraded");
    AgentOutput::new(
        format!("Similar products are unavailable for '{query}': {reason}."),
        StageData::Retrieval {
            top_products: Vec::new(),
            degraded: Some(reason),
        },
    )
}

pub fn summarize(query: &str, results: &[SearchResult]) -> String {
    match results.first() {
        Some(best) => format!(
            "Based on your query '{query}', I found several relevant products. For example, '{}' seems like a good match. You can see it at this URL: {}",
            best.entry.title, best.entry.image_url
        ),
        None => format!(
            "I couldn't find any products matching your query '{query}'. Please try a different search."
        ),
    }
}

#[async_trait]
impl Stage for RetrievalStage {
    fn name(&self) -> StageName {
        StageName::Retrieval
    }

    async fn run(&self, ctx: &StageContext, request: &PipelineRequest) -> Result<AgentOutput> {
        let title = require_title(ctx, StageName::Retrieval)?;
        let query = request.query.trim();

        let Some(index) = &self.index else {
            return Ok(degraded(query, "similarity index is not loaded".to_string()));
        };

        let text = if query.is_empty() || title == query {
            title.to_string()
        } else {
            format!("{title} {query}")
        };

        let (vector, fallback) = match self.query_vector(request, &text).await {
            Ok(found) => found,
            Err(reason) => return Ok(degraded(query, reason)),
        };

        let results = match index.search(vector.as_slice(), self.top_k) {
            Ok(results) => results,
            Err(e) => return Ok(degraded(query, e.to_string())),
        };
        debug!(hits = results.len(), "Retrieved similar products");

        let shown_query = if query.is_empty() { title } else { query };
        Ok(AgentOutput::new(
            summarize(shown_query, &results),
            StageData::Retrieval {
                top_products: results,
                degraded: fallback,
            },
        ))
    }

    fn apply(&self, ctx: &mut StageContext, output: &AgentOutput) {
        if ctx.identified_product.image_url.is_some() {
            return;
        }
        if let StageData::Retrieval { top_products, .. } = &output.data {
            ctx.identified_product.image_url = top_products
                .first()
                .map(|hit| hit.entry.image_url.clone())
                .filter(|url| !url.is_empty());
        }
    }
}
