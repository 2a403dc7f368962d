//! Per-request shared state threaded through the pipeline stages.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use shopwise_core::SearchResult;
use std::fmt;

/// The closed set of pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Identification,
    Retrieval,
    Value,
    Budget,
    Synthesis,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Identification => "identification",
            StageName::Retrieval => "retrieval",
            StageName::Value => "value",
            StageName::Budget => "budget",
            StageName::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of one recommendation request
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub query: String,
    pub price: f64,
    pub budget: f64,
    pub image: Option<Bytes>,
}

impl PipelineRequest {
    pub fn text(query: impl Into<String>, price: f64, budget: f64) -> Self {
        Self {
            query: query.into(),
            price,
            budget,
            image: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<Bytes>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// The product the stages are converging on; every field starts empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdentifiedProduct {
    pub title: Option<String>,
    pub identified_price: Option<f64>,
    pub image_url: Option<String>,
    pub visual_summary: Option<String>,
    pub value_assessment: Option<String>,
}

impl IdentifiedProduct {
    pub fn is_empty(&self) -> bool {
        *self == IdentifiedProduct::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentificationSource {
    Image,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBracket {
    Affordable,
    Moderate,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetVerdict {
    WithinBudget,
    SlightlyOver,
    SignificantlyOver,
}

/// Typed contribution of each stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageData {
    Identification {
        title: String,
        visual_summary: String,
        source: IdentificationSource,
    },
    Retrieval {
        top_products: Vec<SearchResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        degraded: Option<String>,
    },
    Value {
        assessment: String,
        score: u8,
        price_bracket: PriceBracket,
    },
    Budget {
        verdict: BudgetVerdict,
        price: f64,
        budget: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentOutput {
    pub message: String,
    pub data: StageData,
}

impl AgentOutput {
    pub fn new(message: impl Into<String>, data: StageData) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// Stage outputs keyed by stage name, kept in completion order.
#[derive(Debug, Clone, Default)]
pub struct AgentOutputs {
    entries: Vec<(StageName, AgentOutput)>,
}

impl AgentOutputs {
    /// Record a stage's output. A stage writes once per request; a second
    /// write replaces the first in place.
    pub fn insert(&mut self, stage: StageName, output: AgentOutput) {
        match self.entries.iter_mut().find(|(name, _)| *name == stage) {
            Some(slot) => slot.1 = output,
            None => self.entries.push((stage, output)),
        }
    }

    pub fn get(&self, stage: StageName) -> Option<&AgentOutput> {
        self.entries
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, output)| output)
    }

    pub fn contains(&self, stage: StageName) -> bool {
        self.get(stage).is_some()
    }

    pub fn stages(&self) -> impl Iterator<Item = StageName> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for AgentOutputs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, output) in &self.entries {
            map.serialize_entry(name.as_str(), output)?;
        }
        map.end()
    }
}

/// The shared whiteboard of one request.
///
/// Created by the orchestrator, handed to each stage read-only while it
/// runs, and written back between stages. Never shared across requests.
#[derive(Debug, Clone, Serialize)]
pub struct StageContext {
    pub session_id: String,
    pub user_query: String,
    pub user_budget: f64,
    pub identified_product: IdentifiedProduct,
    pub agent_outputs: AgentOutputs,
    pub final_recommendation: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl StageContext {
    pub fn new(request: &PipelineRequest) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_query: request.query.clone(),
            user_budget: request.budget,
            identified_product: IdentifiedProduct::default(),
            agent_outputs: AgentOutputs::default(),
            final_recommendation: None,
            started_at: Utc::now(),
        }
    }

    pub fn output(&self, stage: StageName) -> Option<&AgentOutput> {
        self.agent_outputs.get(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget_output() -> AgentOutput {
        AgentOutput::new(
            "ok",
            StageData::Budget {
                verdict: BudgetVerdict::WithinBudget,
                price: 1.0,
                budget: 2.0,
            },
        )
    }

    #[test]
    fn test_new_context_starts_empty() {
        let ctx = StageContext::new(&PipelineRequest::text("kettle", 30.0, 50.0));
        assert!(ctx.identified_product.is_empty());
        assert!(ctx.agent_outputs.is_empty());
        assert!(ctx.final_recommendation.is_none());
        assert_eq!(ctx.user_budget, 50.0);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let request = PipelineRequest::text("kettle", 30.0, 50.0);
        assert_ne!(StageContext::new(&request).session_id, StageContext::new(&request).session_id);
    }

    #[test]
    fn test_agent_outputs_serialize_in_completion_order() {
        let mut outputs = AgentOutputs::default();
        outputs.insert(StageName::Budget, budget_output());
        outputs.insert(
            StageName::Retrieval,
            AgentOutput::new("none", StageData::Retrieval { top_products: vec![], degraded: None }),
        );

        let json = serde_json::to_string(&outputs).unwrap();
        let budget_at = json.find("\"budget\"").unwrap();
        let retrieval_at = json.find("\"retrieval\"").unwrap();
        assert!(budget_at < retrieval_at);
    }

    #[test]
    fn test_agent_outputs_replace_in_place() {
        let mut outputs = AgentOutputs::default();
        outputs.insert(StageName::Budget, budget_output());
        outputs.insert(StageName::Budget, AgentOutput::new("again", budget_output().data));
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs.get(StageName::Budget).unwrap().message, "again");
    }

    #[test]
    fn test_stage_data_is_tagged() {
        let value = serde_json::to_value(budget_output()).unwrap();
        assert_eq!(value["data"]["kind"], "budget");
        assert_eq!(value["data"]["verdict"], "within_budget");
    }
}
