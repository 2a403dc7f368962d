use super::require_output;
use crate::context::{BudgetVerdict, StageContext, StageData, StageName};
use crate::error::Result;

/// Combine every stage's output into the final recommendation text.
pub fn synthesize(ctx: &StageContext) -> Result<String> {
    let identification = require_output(ctx, StageName::Synthesis, StageName::Identification)?;
    let retrieval = require_output(ctx, StageName::Synthesis, StageName::Retrieval)?;
    let value = require_output(ctx, StageName::Synthesis, StageName::Value)?;
    let budget = require_output(ctx, StageName::Synthesis, StageName::Budget)?;

    let insights = ctx
        .identified_product
        .visual_summary
        .as_deref()
        .unwrap_or(identification.message.as_str());

    let closing = match budget.data {
        StageData::Budget {
            verdict: BudgetVerdict::WithinBudget,
            ..
        } => "This product appears to be a strong match for your needs.",
        StageData::Budget {
            verdict: BudgetVerdict::SlightlyOver,
            ..
        } => "This product could be a good match if you can stretch your budget slightly.",
        _ => "You may want to compare it with the similar products above before committing.",
    };

    Ok(format!(
        "Based on our comprehensive analysis, here is our recommendation:\n\n\
         Product Insights: {insights}\n\n\
         Review Summary: {}\n\n\
         Value Assessment: {}\n\n\
         Budget Check: {}\n\n\
         {closing}",
        retrieval.message, value.message, budget.message
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AgentOutput, IdentificationSource, PipelineRequest, PriceBracket};
    use crate::error::StageError;

    fn full_context(verdict: BudgetVerdict) -> StageContext {
        let mut ctx = StageContext::new(&PipelineRequest::text("kettle", 40.0, 50.0));
        ctx.identified_product.visual_summary = Some("A brushed steel kettle.".to_string());
        ctx.agent_outputs.insert(
            StageName::Identification,
            AgentOutput::new(
                "Identified",
                StageData::Identification {
                    title: "kettle".to_string(),
                    visual_summary: "A brushed steel kettle.".to_string(),
                    source: IdentificationSource::Text,
                },
            ),
        );
        ctx.agent_outputs.insert(
            StageName::Retrieval,
            AgentOutput::new("Found kettles.", StageData::Retrieval { top_products: vec![], degraded: None }),
        );
        ctx.agent_outputs.insert(
            StageName::Value,
            AgentOutput::new(
                "Good value.",
                StageData::Value {
                    assessment: "Good value.".to_string(),
                    score: 2,
                    price_bracket: PriceBracket::Affordable,
                },
            ),
        );
        ctx.agent_outputs.insert(
            StageName::Budget,
            AgentOutput::new("Within budget.", StageData::Budget { verdict, price: 40.0, budget: 50.0 }),
        );
        ctx
    }

    #[test]
    fn test_synthesis_includes_every_stage() {
        let text = synthesize(&full_context(BudgetVerdict::WithinBudget)).unwrap();
        assert!(text.starts_with("Based on our comprehensive analysis"));
        assert!(text.contains("Product Insights: A brushed steel kettle."));
        assert!(text.contains("Review Summary: Found kettles."));
        assert!(text.contains("Value Assessment: Good value."));
        assert!(text.contains("Budget Check: Within budget."));
        assert!(text.ends_with("strong match for your needs."));
    }

    #[test]
    fn test_closing_follows_budget_verdict() {
        let text = synthesize(&full_context(BudgetVerdict::SignificantlyOver)).unwrap();
        assert!(!text.contains("strong match"));
    }

    #[test]
    fn test_missing_budget_output() {
        let ctx = StageContext::new(&PipelineRequest::text("kettle", 40.0, 50.0));
        assert!(matches!(
            synthesize(&ctx),
            Err(StageError::MissingPrerequisite { stage: StageName::Synthesis, .. })
        ));
    }
}
