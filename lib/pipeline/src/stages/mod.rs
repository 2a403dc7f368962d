//! The analysis stages, run in a fixed order by the orchestrator.

mod budget;
mod identification;
mod retrieval;
mod synthesis;
mod value;

pub use budget::{check_budget, BudgetStage};
pub use identification::IdentificationStage;
pub use retrieval::{summarize, RetrievalStage};
pub use synthesis::synthesize;
pub use value::{assess_value, ValueAssessment, ValueStage};

use crate::context::{AgentOutput, PipelineRequest, StageContext, StageName};
use crate::error::{Result, StageError};
use async_trait::async_trait;

/// One unit of pipeline work.
///
/// `run` sees the context read-only and returns the stage's typed output;
/// the orchestrator then calls `apply` and records the output, so a stage
/// that times out or is cancelled leaves the context untouched.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    async fn run(&self, ctx: &StageContext, request: &PipelineRequest) -> Result<AgentOutput>;

    /// Copy fields of `output` into the shared product record
    fn apply(&self, _ctx: &mut StageContext, _output: &AgentOutput) {}
}

pub(crate) fn output_field(stage: StageName) -> &'static str {
    match stage {
        StageName::Identification => "agent_outputs.identification",
        StageName::Retrieval => "agent_outputs.retrieval",
        StageName::Value => "agent_outputs.value",
        StageName::Budget => "agent_outputs.budget",
        StageName::Synthesis => "final_recommendation",
    }
}

/// Fetch an upstream stage's output or fail with `MissingPrerequisite`
pub(crate) fn require_output(
    ctx: &StageContext,
    stage: StageName,
    upstream: StageName,
) -> Result<&AgentOutput> {
    ctx.output(upstream).ok_or(StageError::MissingPrerequisite {
        stage,
        field: output_field(upstream),
    })
}

pub(crate) fn require_title(ctx: &StageContext, stage: StageName) -> Result<&str> {
    ctx.identified_product
        .title
        .as_deref()
        .ok_or(StageError::MissingPrerequisite {
            stage,
            field: "identified_product.title",
        })
}
