use super::{require_output, Stage};
use crate::context::{AgentOutput, BudgetVerdict, PipelineRequest, StageContext, StageData, StageName};
use crate::error::Result;
use async_trait::async_trait;

/// Tolerated overshoot before a price counts as significantly over budget
const SLIGHTLY_OVER_FACTOR: f64 = 1.2;

/// Compare `price` against `budget`, returning the verdict and its advice.
pub fn check_budget(price: f64, budget: f64) -> (BudgetVerdict, String) {
    if price <= budget {
        (
            BudgetVerdict::WithinBudget,
            format!("This item is within your budget of ${budget:.2}."),
        )
    } else if price <= budget * SLIGHTLY_OVER_FACTOR {
        (
            BudgetVerdict::SlightlyOver,
            format!("This item is slightly over your budget of ${budget:.2}, but might be worth considering."),
        )
    } else {
        (
            BudgetVerdict::SignificantlyOver,
            format!("This item is significantly over your budget of ${budget:.2}."),
        )
    }
}

pub struct BudgetStage;

#[async_trait]
impl Stage for BudgetStage {
    fn name(&self) -> StageName {
        StageName::Budget
    }

    async fn run(&self, ctx: &StageContext, request: &PipelineRequest) -> Result<AgentOutput> {
        require_output(ctx, StageName::Budget, StageName::Value)?;

        let (verdict, advice) = check_budget(request.price, ctx.user_budget);
        Ok(AgentOutput::new(
            advice,
            StageData::Budget {
                verdict,
                price: request.price,
                budget: ctx.user_budget,
            },
        ))
    }

    fn apply(&self, ctx: &mut StageContext, output: &AgentOutput) {
        if let StageData::Budget { price, .. } = &output.data {
            ctx.identified_product.identified_price = Some(*price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_budget() {
        let (verdict, advice) = check_budget(40.0, 50.0);
        assert_eq!(verdict, BudgetVerdict::WithinBudget);
        assert_eq!(advice, "This item is within your budget of $50.00.");
        assert_eq!(check_budget(50.0, 50.0).0, BudgetVerdict::WithinBudget);
    }

    #[test]
    fn test_slightly_over_budget() {
        let (verdict, advice) = check_budget(55.0, 50.0);
        assert_eq!(verdict, BudgetVerdict::SlightlyOver);
        assert_eq!(
            advice,
            "This item is slightly over your budget of $50.00, but might be worth considering."
        );
        assert_eq!(check_budget(59.0, 50.0).0, BudgetVerdict::SlightlyOver);
    }

    #[test]
    fn test_twenty_percent_over_is_still_slightly_over() {
        assert_eq!(check_budget(60.0, 50.0).0, BudgetVerdict::SlightlyOver);
        assert_eq!(check_budget(240.0, 200.0).0, BudgetVerdict::SlightlyOver);
        assert_eq!(check_budget(60.01, 50.0).0, BudgetVerdict::SignificantlyOver);
    }

    #[test]
    fn test_significantly_over_budget() {
        let (verdict, advice) = check_budget(70.0, 50.0);
        assert_eq!(verdict, BudgetVerdict::SignificantlyOver);
        assert_eq!(advice, "This item is significantly over your budget of $50.00.");
    }
}
